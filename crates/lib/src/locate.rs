//! Artifact locator.
//!
//! Resolves each declared dependency to the include and library directory
//! that belong to it. Candidate paths are scanned in declaration order and
//! the first match wins; there is no backtracking.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::manifest::{Dependency, DependencyManifest};
use crate::recipe::Requirement;

/// How a candidate path is tested against a dependency name.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
  /// Some path segment equals the name exactly (case-sensitive).
  #[default]
  Segment,
  /// The name appears anywhere in the path. Kept for nonstandard install
  /// layouts; `gpg` matches `libgpg-error` under this policy.
  Substring,
}

impl MatchPolicy {
  pub fn matches(&self, path: &Path, name: &str) -> bool {
    match self {
      MatchPolicy::Segment => path.components().any(|c| c.as_os_str() == name),
      MatchPolicy::Substring => path.to_string_lossy().contains(name),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
  Include,
  Lib,
}

impl fmt::Display for PathKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PathKind::Include => write!(f, "include"),
      PathKind::Lib => write!(f, "library"),
    }
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocateError {
  #[error("dependency '{name}' is not present in the dependency manifest")]
  NotInManifest { name: String },

  #[error("dependency '{name}' not found: no {kind} path matches its name")]
  DependencyNotFound { name: String, kind: PathKind },
}

/// A dependency with its include and library directories resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatedDependency {
  pub name: String,
  pub version: String,
  pub include_dir: PathBuf,
  pub lib_dir: PathBuf,
  pub libs: BTreeSet<String>,
}

impl LocatedDependency {
  /// The install prefix: the library directory without its trailing `lib`.
  pub fn install_prefix(&self) -> PathBuf {
    match (self.lib_dir.file_name(), self.lib_dir.parent()) {
      (Some(last), Some(parent)) if last == "lib" || last == "lib64" => parent.to_path_buf(),
      _ => self.lib_dir.clone(),
    }
  }
}

/// Located dependencies keyed by name.
pub type Located = BTreeMap<String, LocatedDependency>;

/// Locate every dependency; all of them are required.
pub fn locate(dependencies: &[Dependency], policy: MatchPolicy) -> Result<Located, LocateError> {
  let mut located = Located::new();
  for dep in dependencies {
    let found = locate_one(dep, policy)?;
    located.insert(found.name.clone(), found);
  }
  Ok(located)
}

/// Locate the dependencies a recipe requires.
///
/// Optional requirements that cannot be found are skipped; required ones
/// fail the whole build.
pub fn locate_requirements(
  manifest: &DependencyManifest,
  requirements: &[Requirement],
  policy: MatchPolicy,
) -> Result<Located, LocateError> {
  let mut located = Located::new();

  for req in requirements {
    let Some(dep) = manifest.get(&req.name) else {
      if req.required {
        return Err(LocateError::NotInManifest { name: req.name.clone() });
      }
      warn!(dependency = %req.name, "optional dependency missing from manifest, skipping");
      continue;
    };

    match locate_one(dep, policy) {
      Ok(found) => {
        located.insert(found.name.clone(), found);
      }
      Err(err) if !req.required => {
        warn!(dependency = %req.name, error = %err, "optional dependency not located, skipping");
      }
      Err(err) => return Err(err),
    }
  }

  Ok(located)
}

fn locate_one(dep: &Dependency, policy: MatchPolicy) -> Result<LocatedDependency, LocateError> {
  let include_dir = first_match(&dep.include_paths, &dep.name, policy).ok_or_else(|| {
    LocateError::DependencyNotFound {
      name: dep.name.clone(),
      kind: PathKind::Include,
    }
  })?;
  let lib_dir = first_match(&dep.lib_paths, &dep.name, policy).ok_or_else(|| LocateError::DependencyNotFound {
    name: dep.name.clone(),
    kind: PathKind::Lib,
  })?;

  debug!(
    dependency = %dep.name,
    include = %include_dir.display(),
    lib = %lib_dir.display(),
    "located dependency"
  );

  Ok(LocatedDependency {
    name: dep.name.clone(),
    version: dep.version.clone(),
    include_dir,
    lib_dir,
    libs: dep.libs.clone(),
  })
}

fn first_match(candidates: &[PathBuf], name: &str, policy: MatchPolicy) -> Option<PathBuf> {
  candidates
    .iter()
    .find(|path| policy.matches(path, name))
    .map(|path| make_absolute(path))
}

fn make_absolute(path: &Path) -> PathBuf {
  let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
  dunce::simplified(&absolute).to_path_buf()
}
