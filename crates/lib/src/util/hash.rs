//! SHA-256 helpers for archive verification and store addressing.
//!
//! - `ContentHash`: full 64-character digest, used for source archives and
//!   package completion markers
//! - `ObjectHash`: the 20-character prefix that appears in store paths

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::consts::OBJ_HASH_PREFIX_LEN;

/// Truncated digest naming a package directory in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Full lowercase-hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// The store-path prefix. Digests shorter than the prefix are kept whole.
  pub fn object_hash(&self) -> ObjectHash {
    ObjectHash(self.0.get(..OBJ_HASH_PREFIX_LEN).unwrap_or(&self.0).to_string())
  }

  /// Whether this is a complete 64-character hex SHA-256 digest.
  pub fn is_well_formed(&self) -> bool {
    self.0.len() == 64 && self.0.bytes().all(|b| b.is_ascii_hexdigit())
  }

  /// Case-insensitive comparison against a hex digest taken from user input.
  pub fn matches(&self, expected: &str) -> bool {
    self.0.eq_ignore_ascii_case(expected.trim())
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
  #[error("failed to walk {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Digest of a directory tree.
///
/// Covers relative paths, file contents and symlink targets; timestamps and
/// permissions are ignored. Top-level names listed in `exclude` are skipped.
pub fn hash_directory(root: &Path, exclude: &[&str]) -> Result<ContentHash, HashError> {
  let mut hasher = Sha256::new();

  let walker = WalkDir::new(root)
    .sort_by_file_name()
    .follow_links(false)
    .into_iter()
    .filter_entry(|e| {
      e.depth() != 1 || e.file_name().to_str().map(|name| !exclude.contains(&name)).unwrap_or(true)
    });

  for entry in walker {
    let entry = entry.map_err(|source| HashError::Walk {
      path: root.to_path_buf(),
      source,
    })?;
    if entry.depth() == 0 {
      continue;
    }

    let path = entry.path();
    let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/");
    let file_type = entry.file_type();

    let line = if file_type.is_symlink() {
      let target = fs::read_link(path).map_err(|source| HashError::Read {
        path: path.to_path_buf(),
        source,
      })?;
      format!("L:{rel}:{}", hash_bytes(target.to_string_lossy().as_bytes()))
    } else if file_type.is_dir() {
      format!("D:{rel}")
    } else if file_type.is_file() {
      format!("F:{rel}:{}", hash_file(path)?)
    } else {
      continue;
    };

    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let read_err = |source| HashError::Read {
    path: path.to_path_buf(),
    source,
  };
  let mut file = fs::File::open(path).map_err(read_err)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];
  loop {
    let n = file.read(&mut buffer).map_err(read_err)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}
