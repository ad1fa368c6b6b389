use std::fmt;

use serde::{Deserialize, Serialize};

use crate::recipe::options::BuildOptions;

/// Where the library's source archive comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Source {
  pub url: String,
  /// Expected SHA-256 of the archive (lowercase hex).
  pub sha256: String,
}

/// A secondary library installed under the same prefix as its primary
/// dependency (e.g. `hogweed` next to `nettle`). It reuses the primary's
/// located directories instead of being located itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Companion {
  pub flags_prefix: String,
  pub lib: String,
}

/// A dependency the recipe needs, and how it surfaces in the configure environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Requirement {
  pub name: String,
  #[serde(default = "default_true")]
  pub required: bool,
  /// Emits `<PREFIX>_CFLAGS` / `<PREFIX>_LIBS` when set.
  #[serde(default)]
  pub flags_prefix: Option<String>,
  /// Link name for `-l`; defaults to the dependency name.
  #[serde(default)]
  pub lib: Option<String>,
  #[serde(default)]
  pub companions: Vec<Companion>,
  /// Emits `<arg>=<install prefix>`, e.g. `--with-libiconv-prefix`.
  #[serde(default)]
  pub prefix_arg: Option<String>,
}

fn default_true() -> bool {
  true
}

impl Requirement {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      required: true,
      flags_prefix: None,
      lib: None,
      companions: Vec::new(),
      prefix_arg: None,
    }
  }

  pub fn optional(mut self) -> Self {
    self.required = false;
    self
  }

  pub fn with_flags(mut self, prefix: impl Into<String>) -> Self {
    self.flags_prefix = Some(prefix.into());
    self
  }

  pub fn with_companion(mut self, prefix: impl Into<String>, lib: impl Into<String>) -> Self {
    self.companions.push(Companion {
      flags_prefix: prefix.into(),
      lib: lib.into(),
    });
    self
  }

  pub fn with_prefix_arg(mut self, arg: impl Into<String>) -> Self {
    self.prefix_arg = Some(arg.into());
    self
  }

  pub fn link_name(&self) -> &str {
    self.lib.as_deref().unwrap_or(&self.name)
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
  #[default]
  Release,
  Debug,
}

impl fmt::Display for BuildType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildType::Release => write!(f, "release"),
      BuildType::Debug => write!(f, "debug"),
    }
  }
}

/// One `pattern -> destination` rule of a package layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutEntry {
  pub pattern: String,
  /// Destination sub-directory of the package root (empty for the root itself).
  #[serde(default)]
  pub destination: String,
  /// Preserve the path relative to the search root instead of flattening.
  #[serde(default)]
  pub keep_path: bool,
  /// Sub-directory of the build tree to search; the whole tree when unset.
  #[serde(default)]
  pub source: Option<String>,
}

impl LayoutEntry {
  pub fn new(pattern: impl Into<String>, destination: impl Into<String>) -> Self {
    Self {
      pattern: pattern.into(),
      destination: destination.into(),
      keep_path: false,
      source: None,
    }
  }

  pub fn keep_path(mut self) -> Self {
    self.keep_path = true;
    self
  }

  pub fn from_dir(mut self, source: impl Into<String>) -> Self {
    self.source = Some(source.into());
    self
  }
}

/// Ordered staging rules. Evaluated only against a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageLayout(pub Vec<LayoutEntry>);

impl PackageLayout {
  pub fn entries(&self) -> &[LayoutEntry] {
    &self.0
  }

  /// License files copied into `licenses/` from the source tree. Paths are
  /// kept so bundled sub-projects cannot shadow the top-level license.
  pub fn licenses(patterns: &[String]) -> Self {
    Self(
      patterns
        .iter()
        .map(|p| LayoutEntry::new(p.clone(), "licenses").keep_path())
        .collect(),
    )
  }
}

impl Default for PackageLayout {
  /// Headers keep their sub-directories (clients include them by relative
  /// path); libraries are flattened (they are linked by bare name).
  fn default() -> Self {
    Self(vec![
      LayoutEntry::new("*.h", "include").keep_path().from_dir("include"),
      LayoutEntry::new("*.lib", "lib").from_dir("lib"),
      LayoutEntry::new("*.a", "lib").from_dir("lib"),
      LayoutEntry::new("*.so*", "lib").from_dir("lib"),
      LayoutEntry::new("*.dylib", "lib").from_dir("lib"),
    ])
  }
}

fn default_licenses() -> Vec<String> {
  vec!["COPYING*".to_string(), "LICENSE*".to_string()]
}

/// Everything needed to build and package one native library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
  pub name: String,
  pub version: String,
  pub source: Source,
  #[serde(default)]
  pub requires: Vec<Requirement>,
  /// Extra flags passed to `./configure` after the synthesized ones.
  #[serde(default)]
  pub configure_args: Vec<String>,
  #[serde(default)]
  pub options: BuildOptions,
  #[serde(default)]
  pub build_type: BuildType,
  #[serde(default)]
  pub layout: PackageLayout,
  #[serde(default = "default_licenses")]
  pub licenses: Vec<String>,
}

impl Recipe {
  /// `<name>-<version>`, used for work and store directory names.
  pub fn id(&self) -> String {
    format!("{}-{}", self.name, self.version)
  }
}
