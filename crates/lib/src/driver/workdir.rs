//! Scoped working-directory changes.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

/// Changes the process working directory and restores the previous one when
/// dropped. Restoration also happens on early returns, panics, and when the
/// owning future is dropped mid-build.
#[derive(Debug)]
pub struct WorkdirGuard {
  previous: PathBuf,
}

impl WorkdirGuard {
  pub fn enter(dir: &Path) -> io::Result<Self> {
    let previous = std::env::current_dir()?;
    std::env::set_current_dir(dir)?;
    debug!(from = %previous.display(), to = %dir.display(), "entered build directory");
    Ok(Self { previous })
  }

  pub fn previous(&self) -> &Path {
    &self.previous
  }
}

impl Drop for WorkdirGuard {
  fn drop(&mut self) {
    if let Err(e) = std::env::set_current_dir(&self.previous) {
      error!(path = %self.previous.display(), error = %e, "failed to restore working directory");
    } else {
      debug!(to = %self.previous.display(), "restored working directory");
    }
  }
}
