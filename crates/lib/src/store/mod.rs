//! Content-addressed package store.
//!
//! ```text
//! store/
//! ├── .lock                               # StoreLock
//! ├── pkg/
//! │   └── <name>-<version>-<hash>/        # committed packages, never modified
//! │       └── .nativepack-complete        # PackageMarker (JSON)
//! └── tmp/                                # staging areas, renamed into pkg/
//! ```
//!
//! The marker also records the link names of the libraries under `lib/`
//! (`gnutls` for `libgnutls.a`), so consumers know what to pass to `-l`.
//!
//! `<hash>` is the first 20 hex characters of the staged tree's digest, so a
//! rebuild producing identical files lands on the same path.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::consts::PACKAGE_COMPLETE_MARKER;
use crate::platform::paths::store_dir;
use crate::util::hash::{ContentHash, HashError, ObjectHash, hash_directory};

const PKG_DIR: &str = "pkg";
const TMP_DIR: &str = "tmp";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("store I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error("invalid package marker at {path}: {message}")]
  Marker { path: PathBuf, message: String },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
  move |source| StoreError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Contents of the completion marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMarker {
  pub version: u32,
  pub name: String,
  pub package_version: String,
  pub output_hash: ContentHash,
  #[serde(default)]
  pub libs: Vec<String>,
}

/// A committed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRecord {
  pub name: String,
  pub version: String,
  pub path: PathBuf,
  pub hash: ObjectHash,
  /// Link names of the libraries in `lib/`, sorted.
  pub libs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Store {
  root: PathBuf,
}

impl Store {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Store at `NATIVEPACK_STORE`, or the per-user default.
  pub fn from_env() -> Self {
    Self::new(store_dir())
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn package_path(&self, name: &str, version: &str, hash: &ObjectHash) -> PathBuf {
    self.root.join(PKG_DIR).join(format!("{name}-{version}-{hash}"))
  }

  /// Fresh directory on the store's filesystem to stage a package into.
  pub fn staging_area(&self) -> Result<TempDir, StoreError> {
    let tmp = self.root.join(TMP_DIR);
    fs::create_dir_all(&tmp).map_err(io_err(&tmp))?;
    tempfile::Builder::new()
      .prefix("stage-")
      .tempdir_in(&tmp)
      .map_err(io_err(&tmp))
  }

  /// Move a staged tree into the store under its content hash.
  ///
  /// Committing content that is already present leaves the existing package
  /// untouched. `staged` must live on the store's filesystem (see
  /// [`Store::staging_area`]).
  pub fn commit(&self, staged: &Path, name: &str, version: &str) -> Result<PackageRecord, StoreError> {
    let output_hash = hash_directory(staged, &[PACKAGE_COMPLETE_MARKER])?;
    let hash = output_hash.object_hash();
    let libs = collect_libs(staged)?;
    let dest = self.package_path(name, version, &hash);
    let record = PackageRecord {
      name: name.to_string(),
      version: version.to_string(),
      path: dest.clone(),
      hash,
      libs: libs.clone(),
    };

    if dest.exists() {
      if verify(&dest) {
        info!(path = %dest.display(), "package already in store");
        return Ok(record);
      }
      warn!(path = %dest.display(), "replacing incomplete package");
      fs::remove_dir_all(&dest).map_err(io_err(&dest))?;
    }

    let marker = PackageMarker {
      version: 1,
      name: name.to_string(),
      package_version: version.to_string(),
      output_hash,
      libs,
    };
    write_marker(staged, &marker)?;

    let parent = self.root.join(PKG_DIR);
    fs::create_dir_all(&parent).map_err(io_err(&parent))?;
    fs::rename(staged, &dest).map_err(io_err(&dest))?;

    info!(name, version, path = %dest.display(), "package committed");
    Ok(record)
  }

  /// Every complete package, sorted by directory name. Incomplete entries
  /// are skipped.
  pub fn list(&self) -> Result<Vec<PackageRecord>, StoreError> {
    let pkg = self.root.join(PKG_DIR);
    if !pkg.exists() {
      return Ok(Vec::new());
    }

    let mut dirs: Vec<PathBuf> = fs::read_dir(&pkg)
      .map_err(io_err(&pkg))?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| path.is_dir())
      .collect();
    dirs.sort();

    let mut records = Vec::new();
    for dir in dirs {
      match read_marker(&dir) {
        Ok(Some(marker)) => records.push(PackageRecord {
          hash: marker.output_hash.object_hash(),
          name: marker.name,
          version: marker.package_version,
          path: dir,
          libs: marker.libs,
        }),
        Ok(None) => debug!(path = %dir.display(), "skipping package without marker"),
        Err(e) => warn!(path = %dir.display(), error = %e, "skipping package with unreadable marker"),
      }
    }
    Ok(records)
  }
}

fn write_marker(dir: &Path, marker: &PackageMarker) -> Result<(), StoreError> {
  let path = dir.join(PACKAGE_COMPLETE_MARKER);
  let content = serde_json::to_string(marker).map_err(|e| StoreError::Marker {
    path: path.clone(),
    message: e.to_string(),
  })?;
  fs::write(&path, format!("{content}\n")).map_err(io_err(&path))
}

/// Marker of the package at `dir`; `None` when it was never completed.
pub fn read_marker(dir: &Path) -> Result<Option<PackageMarker>, StoreError> {
  let path = dir.join(PACKAGE_COMPLETE_MARKER);
  if !path.exists() {
    return Ok(None);
  }
  let content = fs::read_to_string(&path).map_err(io_err(&path))?;
  let marker: PackageMarker = serde_json::from_str(&content).map_err(|e| StoreError::Marker {
    path: path.clone(),
    message: e.to_string(),
  })?;
  if !marker.output_hash.is_well_formed() {
    return Err(StoreError::Marker {
      path,
      message: format!("malformed output hash '{}'", marker.output_hash),
    });
  }
  Ok(Some(marker))
}

/// Link names of the libraries directly under `<package_root>/lib`, sorted
/// and without duplicates. A missing `lib/` yields an empty list.
pub fn collect_libs(package_root: &Path) -> Result<Vec<String>, StoreError> {
  let lib_dir = package_root.join("lib");
  if !lib_dir.is_dir() {
    return Ok(Vec::new());
  }

  let mut names = BTreeSet::new();
  for entry in fs::read_dir(&lib_dir).map_err(io_err(&lib_dir))? {
    let entry = entry.map_err(io_err(&lib_dir))?;
    let path = entry.path();
    if entry.file_type().map_err(io_err(&path))?.is_dir() {
      continue;
    }
    if let Some(name) = link_name(&entry.file_name().to_string_lossy()) {
      names.insert(name);
    }
  }
  Ok(names.into_iter().collect())
}

/// `libfoo.a`, `libfoo.so`, `libfoo.so.3`, `libfoo.dylib`, `libfoo.3.dylib`
/// and `foo.lib` all link as `foo`.
fn link_name(file_name: &str) -> Option<String> {
  let name = if let Some(stem) = file_name.strip_suffix(".lib") {
    stem
  } else {
    let stem = file_name.strip_prefix("lib")?;
    if let Some(base) = stem.strip_suffix(".a") {
      base
    } else if let Some(versioned) = stem.strip_suffix(".dylib") {
      versioned.split('.').next().unwrap_or(versioned)
    } else {
      let idx = stem.find(".so")?;
      let rest = &stem[idx + 3..];
      if !rest.is_empty() && !rest.starts_with('.') {
        return None;
      }
      &stem[..idx]
    }
  };
  (!name.is_empty()).then(|| name.to_string())
}

/// Whether the package at `dir` is complete and unmodified.
pub fn verify(dir: &Path) -> bool {
  let marker = match read_marker(dir) {
    Ok(Some(marker)) => marker,
    Ok(None) => return false,
    Err(e) => {
      warn!(path = %dir.display(), error = %e, "unreadable package marker");
      return false;
    }
  };

  match hash_directory(dir, &[PACKAGE_COMPLETE_MARKER]) {
    Ok(current) if current == marker.output_hash => true,
    Ok(current) => {
      warn!(
        path = %dir.display(),
        expected = %marker.output_hash,
        actual = %current,
        "package contents changed since commit"
      );
      false
    }
    Err(e) => {
      warn!(path = %dir.display(), error = %e, "failed to hash package");
      false
    }
  }
}
