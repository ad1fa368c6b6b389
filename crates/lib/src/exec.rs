//! Process-exec collaborator.
//!
//! Every external build invocation goes through [`Executor`], so the driver
//! can be exercised with a mock in tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::consts::SOURCE_DATE_EPOCH;

/// Captured result of one external process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
  /// `None` when the process was terminated by a signal.
  pub exit_code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl ExecOutput {
  pub fn success(&self) -> bool {
    self.exit_code == Some(0)
  }
}

/// Spawns one external process and waits for it to finish.
pub trait Executor {
  fn exec(
    &self,
    program: &str,
    args: &[String],
    cwd: &Path,
    env: &BTreeMap<String, String>,
  ) -> impl Future<Output = std::io::Result<ExecOutput>> + Send;
}

/// Runs commands as real child processes.
///
/// The child inherits the parent's environment with `env` layered on top;
/// the orchestrator's own environment is never modified.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
  async fn exec(
    &self,
    program: &str,
    args: &[String],
    cwd: &Path,
    env: &BTreeMap<String, String>,
  ) -> std::io::Result<ExecOutput> {
    info!(program = %program, args = ?args, "executing command");

    let mut command = Command::new(program);
    command
      .args(args)
      .current_dir(cwd)
      .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH)
      .envs(env)
      .kill_on_drop(true);

    debug!(working_dir = ?cwd, "spawning process");

    let output = command.output().await?;
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    for line in stdout.lines() {
      debug!(target: "nativepack::build_output", "{}", line);
    }
    for line in stderr.lines() {
      debug!(target: "nativepack::build_output", stream = "stderr", "{}", line);
    }

    Ok(ExecOutput {
      exit_code: output.status.code(),
      stdout,
      stderr,
    })
  }
}
