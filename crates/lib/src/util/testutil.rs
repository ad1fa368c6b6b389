//! Test utilities for nativepack-lib.
//!
//! Cross-platform shell helpers plus a recording [`Executor`] for driving
//! builds without spawning real toolchains.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::exec::{ExecOutput, Executor};

/// Returns the shell command and args to echo an environment variable.
#[cfg(unix)]
pub fn shell_echo_env(var: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), format!("echo \"${}\"", var)])
}

#[cfg(windows)]
pub fn shell_echo_env(var: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), format!("echo %{}%", var)])
}

/// Returns the shell command and args to execute a shell script.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), script.to_string()])
}

/// One invocation seen by [`RecordingExecutor`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: PathBuf,
  pub env: BTreeMap<String, String>,
  /// The process working directory at the time of the call.
  pub process_cwd: PathBuf,
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
  Succeed,
  ExitAt { call: usize, code: i32 },
  InterruptAt { call: usize },
  SpawnErrorAt { call: usize },
  HangAt { call: usize },
}

/// Executor spy: records every call and answers according to a script.
#[derive(Debug)]
pub struct RecordingExecutor {
  behavior: Behavior,
  calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingExecutor {
  pub fn succeeding() -> Self {
    Self::with(Behavior::Succeed)
  }

  /// Call number `call` (zero-based) exits with `code`.
  pub fn failing_at(call: usize, code: i32) -> Self {
    Self::with(Behavior::ExitAt { call, code })
  }

  /// Call number `call` is killed by a signal and has no exit code.
  pub fn interrupted_at(call: usize) -> Self {
    Self::with(Behavior::InterruptAt { call })
  }

  /// Call number `call` cannot be started at all.
  pub fn spawn_error_at(call: usize) -> Self {
    Self::with(Behavior::SpawnErrorAt { call })
  }

  /// Call number `call` never completes.
  pub fn hanging_at(call: usize) -> Self {
    Self::with(Behavior::HangAt { call })
  }

  fn with(behavior: Behavior) -> Self {
    Self {
      behavior,
      calls: Mutex::new(Vec::new()),
    }
  }

  pub fn calls(&self) -> Vec<RecordedCall> {
    self.calls.lock().unwrap().clone()
  }
}

impl Executor for RecordingExecutor {
  async fn exec(
    &self,
    program: &str,
    args: &[String],
    cwd: &Path,
    env: &BTreeMap<String, String>,
  ) -> io::Result<ExecOutput> {
    let index = {
      let mut calls = self.calls.lock().unwrap();
      calls.push(RecordedCall {
        program: program.to_string(),
        args: args.to_vec(),
        cwd: cwd.to_path_buf(),
        env: env.clone(),
        process_cwd: std::env::current_dir()?,
      });
      calls.len() - 1
    };

    match self.behavior {
      Behavior::ExitAt { call, code } if call == index => Ok(ExecOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: "error: simulated failure".to_string(),
      }),
      Behavior::InterruptAt { call } if call == index => Ok(ExecOutput {
        exit_code: None,
        stdout: String::new(),
        stderr: "Terminated".to_string(),
      }),
      Behavior::SpawnErrorAt { call } if call == index => {
        Err(io::Error::new(io::ErrorKind::NotFound, "simulated missing program"))
      }
      Behavior::HangAt { call } if call == index => std::future::pending().await,
      _ => Ok(ExecOutput {
        exit_code: Some(0),
        ..Default::default()
      }),
    }
  }
}
