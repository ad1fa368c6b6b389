//! Build driver.
//!
//! Runs configure, compile, and install as a strictly sequential, fail-fast
//! pipeline. The process working directory is switched to the source root
//! for the duration of the three stages only, and plan variables are handed
//! to the child processes without touching this process's environment.
//!
//! Only one build may run per process: working-directory changes are
//! process-global, so every run holds [`BUILD_LOCK`].

mod types;
pub mod workdir;

pub use types::*;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::environment::EnvironmentPlan;
use crate::exec::Executor;
use workdir::WorkdirGuard;

/// Serializes driver runs within this process.
pub static BUILD_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub struct BuildDriver<E> {
  executor: E,
  config: DriverConfig,
}

impl<E: Executor> BuildDriver<E> {
  pub fn new(executor: E, config: DriverConfig) -> Self {
    Self { executor, config }
  }

  pub fn executor(&self) -> &E {
    &self.executor
  }

  pub fn config(&self) -> &DriverConfig {
    &self.config
  }

  /// Run the external build in `source_root`.
  ///
  /// A non-zero exit from any stage yields `BuildStatus::Failed` with that
  /// stage and the raw exit code (none when killed by a signal); later
  /// stages never start. A stage whose program cannot be started at all is
  /// a [`DriverError::Spawn`]. Nothing is
  /// retried and the partially built tree is left in place.
  pub async fn run(
    &self,
    source_root: &Path,
    plan: &EnvironmentPlan,
    configure_extra_flags: &[String],
  ) -> Result<BuildResult, DriverError> {
    if !plan.platform.is_posix() {
      return Err(DriverError::UnsupportedPlatform(plan.platform));
    }

    let _lock = BUILD_LOCK.lock().await;

    let guard = WorkdirGuard::enter(source_root).map_err(|source| DriverError::Workdir {
      path: source_root.to_path_buf(),
      source,
    })?;
    // Commands get an absolute cwd even though the process cwd is scoped.
    let cwd = std::env::current_dir().unwrap_or_else(|_| source_root.to_path_buf());

    let prefix = self.install_prefix(&cwd);
    let artifact_root = if self.config.install { prefix.clone() } else { cwd.clone() };

    let mut state = BuildState::Idle.advance(self.config.install);
    while let BuildState::Running(stage) = state {
      let (program, args) = self.command_for(stage, plan, configure_extra_flags, &prefix);
      info!(stage = %stage, program = %program, "starting build stage");

      state = match self.executor.exec(&program, &args, &cwd, &plan.vars).await {
        Ok(output) if output.success() => {
          debug!(stage = %stage, "build stage finished");
          state.advance(self.config.install)
        }
        Ok(output) => {
          warn!(stage = %stage, exit_code = ?output.exit_code, "build stage failed");
          if !output.stderr.is_empty() {
            debug!(stage = %stage, stderr = %output.stderr, "stage stderr");
          }
          BuildState::Failed {
            stage,
            exit_code: output.exit_code,
          }
        }
        Err(source) => {
          error!(stage = %stage, program = %program, error = %source, "build stage could not be started");
          return Err(DriverError::Spawn { stage, program, source });
        }
      };
    }

    drop(guard);

    let status = match state {
      BuildState::Failed { stage, exit_code } => {
        info!(stage = %stage, tree = %cwd.display(), "leaving partial build tree for diagnostics");
        BuildStatus::Failed { stage, exit_code }
      }
      _ => BuildStatus::Succeeded,
    };

    Ok(BuildResult {
      status,
      produced_artifact_root: artifact_root,
    })
  }

  fn install_prefix(&self, source_root: &Path) -> PathBuf {
    self
      .config
      .install_prefix
      .clone()
      .unwrap_or_else(|| source_root.join("_install"))
  }

  fn command_for(
    &self,
    stage: Stage,
    plan: &EnvironmentPlan,
    configure_extra_flags: &[String],
    prefix: &Path,
  ) -> (String, Vec<String>) {
    match stage {
      Stage::Configuring => {
        let mut args = vec![self.config.configure_script.clone()];
        args.extend(plan.configure_flags.iter().cloned());
        args.extend(configure_extra_flags.iter().cloned());
        if self.config.install {
          args.push(format!("--prefix={}", prefix.display()));
        }
        (self.config.shell.clone(), args)
      }
      Stage::Compiling => (self.config.make.clone(), vec![format!("-j{}", self.config.jobs.max(1))]),
      Stage::Installing => (self.config.make.clone(), vec!["install".to_string()]),
    }
  }
}
