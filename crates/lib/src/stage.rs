//! Package stager.
//!
//! Copies only the files a [`PackageLayout`] declares from a build tree into
//! a clean package directory. Header rules normally keep their relative
//! paths (clients include them as `<lib/header.h>`); binary rules flatten
//! into one directory (they are linked by bare name).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::recipe::{LayoutEntry, PackageLayout};

#[derive(Debug, Error)]
pub enum StageError {
  #[error("staging failed at {path}: {source}")]
  StageIo {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid layout pattern '{pattern}': {message}")]
  Pattern { pattern: String, message: String },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StageError + '_ {
  move |source| StageError::StageIo {
    path: path.to_path_buf(),
    source,
  }
}

/// Files staged for one layout rule, relative to the package root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedEntry {
  pub pattern: String,
  pub destination: String,
  pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedPackage {
  pub root: PathBuf,
  /// One entry per layout rule, in declaration order.
  pub entries: Vec<StagedEntry>,
}

impl StagedPackage {
  pub fn files_for(&self, pattern: &str) -> Option<&[PathBuf]> {
    self
      .entries
      .iter()
      .find(|e| e.pattern == pattern)
      .map(|e| e.files.as_slice())
  }

  pub fn file_count(&self) -> usize {
    self.entries.iter().map(|e| e.files.len()).sum()
  }
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
  case_sensitive: true,
  require_literal_separator: true,
  require_literal_leading_dot: false,
};

/// Stage `build_tree` into `dest` according to `layout`.
///
/// Rules matching nothing produce an empty list (static and shared outputs
/// are mutually exclusive per build). Only real filesystem failures error.
pub fn stage(build_tree: &Path, layout: &PackageLayout, dest: &Path) -> Result<StagedPackage, StageError> {
  fs::create_dir_all(dest).map_err(io_err(dest))?;

  let mut entries = Vec::with_capacity(layout.entries().len());
  for rule in layout.entries() {
    let files = stage_rule(build_tree, rule, dest)?;
    debug!(pattern = %rule.pattern, count = files.len(), "staged layout rule");
    entries.push(StagedEntry {
      pattern: rule.pattern.clone(),
      destination: rule.destination.clone(),
      files,
    });
  }

  let package = StagedPackage {
    root: dest.to_path_buf(),
    entries,
  };
  info!(root = %dest.display(), files = package.file_count(), "staged package");
  Ok(package)
}

fn stage_rule(build_tree: &Path, rule: &LayoutEntry, dest: &Path) -> Result<Vec<PathBuf>, StageError> {
  let pattern = Pattern::new(&rule.pattern).map_err(|e| StageError::Pattern {
    pattern: rule.pattern.clone(),
    message: e.to_string(),
  })?;
  let match_path = rule.pattern.contains('/');

  let search_root = match &rule.source {
    Some(sub) => build_tree.join(sub),
    None => build_tree.to_path_buf(),
  };
  if !search_root.is_dir() {
    debug!(root = %search_root.display(), pattern = %rule.pattern, "search root missing, nothing to stage");
    return Ok(Vec::new());
  }

  let walker = WalkDir::new(&search_root)
    .follow_links(false)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| !e.path().starts_with(dest));

  let mut staged = Vec::new();
  for entry in walker {
    let entry = entry.map_err(|e| {
      let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| search_root.clone());
      let source = e
        .into_io_error()
        .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
      StageError::StageIo { path, source }
    })?;

    if entry.file_type().is_dir() {
      continue;
    }

    let Ok(rel) = entry.path().strip_prefix(&search_root) else {
      continue;
    };
    let matched = if match_path {
      pattern.matches_with(&rel.to_string_lossy().replace('\\', "/"), MATCH_OPTIONS)
    } else {
      pattern.matches_with(&entry.file_name().to_string_lossy(), MATCH_OPTIONS)
    };
    if !matched {
      continue;
    }

    let rel_dest = if rule.keep_path {
      Path::new(&rule.destination).join(rel)
    } else {
      Path::new(&rule.destination).join(entry.file_name())
    };
    let target = dest.join(&rel_dest);

    if target.symlink_metadata().is_ok() {
      warn!(path = %target.display(), "staged file already exists, overwriting");
      fs::remove_file(&target).map_err(io_err(&target))?;
    }
    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    copy_entry(entry.path(), entry.file_type().is_symlink(), &target)?;
    staged.push(rel_dest);
  }

  Ok(staged)
}

/// Relative symlinks (e.g. `libfoo.so -> libfoo.so.3`) are recreated as links;
/// anything else is copied by content.
fn copy_entry(src: &Path, is_symlink: bool, target: &Path) -> Result<(), StageError> {
  #[cfg(unix)]
  {
    if is_symlink {
      let link = fs::read_link(src).map_err(io_err(src))?;
      if link.is_relative() {
        return std::os::unix::fs::symlink(&link, target).map_err(io_err(target));
      }
    }
  }
  #[cfg(not(unix))]
  let _ = is_symlink;

  fs::copy(src, target).map_err(io_err(target))?;
  Ok(())
}
