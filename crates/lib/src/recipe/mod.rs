//! Build recipes.
//!
//! A recipe is the JSON description of one native library build: where its
//! sources come from, which sibling libraries it needs, its configure
//! toggles, and how its artifacts are packaged.

pub mod options;
mod types;

pub use options::{BuildOptions, OptionsError};
pub use types::*;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecipeError {
  #[error("failed to read recipe {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse recipe {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("recipe field '{0}' must not be empty")]
  Empty(&'static str),

  #[error("requirement '{0}' is declared more than once")]
  DuplicateRequirement(String),

  #[error("invalid layout pattern '{pattern}': {message}")]
  Pattern { pattern: String, message: String },

  #[error("sha256 must be 64 lowercase hex characters, got '{0}'")]
  Checksum(String),
}

impl Recipe {
  pub fn from_path(path: &Path) -> Result<Self, RecipeError> {
    let content = std::fs::read_to_string(path).map_err(|source| RecipeError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let recipe: Recipe = serde_json::from_str(&content).map_err(|source| RecipeError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    recipe.validate()?;
    Ok(recipe)
  }

  pub fn validate(&self) -> Result<(), RecipeError> {
    if self.name.trim().is_empty() {
      return Err(RecipeError::Empty("name"));
    }
    if self.version.trim().is_empty() {
      return Err(RecipeError::Empty("version"));
    }
    if self.source.url.trim().is_empty() {
      return Err(RecipeError::Empty("source.url"));
    }
    let sha = &self.source.sha256;
    if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
      return Err(RecipeError::Checksum(sha.clone()));
    }

    let mut seen = BTreeSet::new();
    for req in &self.requires {
      if !seen.insert(req.name.as_str()) {
        return Err(RecipeError::DuplicateRequirement(req.name.clone()));
      }
    }

    let patterns = self
      .layout
      .entries()
      .iter()
      .map(|e| e.pattern.as_str())
      .chain(self.licenses.iter().map(String::as_str));
    for pattern in patterns {
      glob::Pattern::new(pattern).map_err(|e| RecipeError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
      })?;
    }

    Ok(())
  }
}
