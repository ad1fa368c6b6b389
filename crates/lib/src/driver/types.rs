use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::platform::Platform;

/// One externally executed step of a native build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
  Configuring,
  Compiling,
  Installing,
}

impl Stage {
  pub fn as_str(&self) -> &'static str {
    match self {
      Stage::Configuring => "Configuring",
      Stage::Compiling => "Compiling",
      Stage::Installing => "Installing",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Driver state machine.
///
/// `Idle -> Configuring -> Compiling -> Installing -> Succeeded`; any running
/// stage may move to `Failed`. No stage starts unless the previous one
/// succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
  Idle,
  Running(Stage),
  Succeeded,
  Failed { stage: Stage, exit_code: Option<i32> },
}

impl BuildState {
  /// The state after the current one completes successfully.
  ///
  /// `install` controls whether `Compiling` is followed by `Installing`.
  pub fn advance(self, install: bool) -> BuildState {
    match self {
      BuildState::Idle => BuildState::Running(Stage::Configuring),
      BuildState::Running(Stage::Configuring) => BuildState::Running(Stage::Compiling),
      BuildState::Running(Stage::Compiling) if install => BuildState::Running(Stage::Installing),
      BuildState::Running(Stage::Compiling) | BuildState::Running(Stage::Installing) => BuildState::Succeeded,
      terminal => terminal,
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, BuildState::Succeeded | BuildState::Failed { .. })
  }
}

/// Terminal outcome of a driver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BuildStatus {
  Succeeded,
  Failed { stage: Stage, exit_code: Option<i32> },
}

/// What the driver produced. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
  pub status: BuildStatus,
  /// Tree the stager reads from: the install prefix, or the source tree when
  /// the install step is disabled. Left in place after a failure.
  pub produced_artifact_root: PathBuf,
}

impl BuildResult {
  pub fn is_success(&self) -> bool {
    self.status == BuildStatus::Succeeded
  }
}

#[derive(Debug, Error)]
pub enum DriverError {
  #[error("unsupported platform {0}: no native build support")]
  UnsupportedPlatform(Platform),

  #[error("could not run {program} while {stage}: {source}")]
  Spawn {
    stage: Stage,
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("cannot enter source directory {path}: {source}")]
  Workdir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// How the external build tools are invoked.
#[derive(Debug, Clone)]
pub struct DriverConfig {
  /// Shell used to run the configure script.
  pub shell: String,
  /// Configure script, relative to the source root.
  pub configure_script: String,
  pub make: String,
  /// Parallel jobs passed to make as `-j<N>`.
  pub jobs: usize,
  /// Run `make install` into `install_prefix` after compiling.
  pub install: bool,
  /// Install prefix; defaults to `<source_root>/_install`.
  pub install_prefix: Option<PathBuf>,
}

impl Default for DriverConfig {
  fn default() -> Self {
    Self {
      shell: "sh".to_string(),
      configure_script: "./configure".to_string(),
      make: "make".to_string(),
      jobs: num_cpus(),
      install: true,
      install_prefix: None,
    }
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
