//! Manifest types for nativepack.
//!
//! A dependency manifest is a JSON document produced by whatever package
//! manager resolved the build's requirements:
//!
//! ```json
//! {
//!   "dependencies": [
//!     {
//!       "name": "nettle",
//!       "version": "3.4",
//!       "include_paths": ["/opt/nettle/include"],
//!       "lib_paths": ["/opt/nettle/lib"],
//!       "libs": ["hogweed", "nettle"]
//!     }
//!   ]
//! }
//! ```
//!
//! The manifest is immutable for the duration of one build.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a dependency manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse manifest {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("dependency '{0}' is declared more than once")]
  Duplicate(String),
}

/// An installed sibling library the build links against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dependency {
  pub name: String,
  #[serde(default)]
  pub version: String,
  /// Candidate header directories, in declaration order.
  #[serde(default)]
  pub include_paths: Vec<PathBuf>,
  /// Candidate library directories, in declaration order.
  #[serde(default)]
  pub lib_paths: Vec<PathBuf>,
  /// Library names this dependency exposes for linking (`-l<name>`).
  #[serde(default)]
  pub libs: BTreeSet<String>,
}

impl Dependency {
  pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      version: version.into(),
      include_paths: Vec::new(),
      lib_paths: Vec::new(),
      libs: BTreeSet::new(),
    }
  }

  /// Convenience for the common `<prefix>/include` + `<prefix>/lib` layout.
  pub fn with_prefix(mut self, prefix: impl AsRef<Path>) -> Self {
    let prefix = prefix.as_ref();
    self.include_paths.push(prefix.join("include"));
    self.lib_paths.push(prefix.join("lib"));
    self
  }

  pub fn with_lib(mut self, lib: impl Into<String>) -> Self {
    self.libs.insert(lib.into());
    self
  }
}

/// The full set of dependencies available to one build.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyManifest {
  #[serde(default)]
  pub dependencies: Vec<Dependency>,
}

impl DependencyManifest {
  pub fn new(dependencies: Vec<Dependency>) -> Result<Self, ManifestError> {
    let manifest = Self { dependencies };
    manifest.validate()?;
    Ok(manifest)
  }

  pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let manifest: Self = serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    manifest.validate()?;
    Ok(manifest)
  }

  pub fn get(&self, name: &str) -> Option<&Dependency> {
    self.dependencies.iter().find(|d| d.name == name)
  }

  fn validate(&self) -> Result<(), ManifestError> {
    let mut seen = BTreeSet::new();
    for dep in &self.dependencies {
      if !seen.insert(dep.name.as_str()) {
        return Err(ManifestError::Duplicate(dep.name.clone()));
      }
    }
    Ok(())
  }
}
