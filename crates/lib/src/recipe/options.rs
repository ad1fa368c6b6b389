//! Boolean configure toggles.
//!
//! Every toggle maps to at most one `./configure` flag named after it, except
//! `shared`, which always maps to a pair of mutually exclusive flags.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
  #[error("unknown option '{0}'")]
  UnknownOption(String),

  #[error("invalid value '{value}' for option '{name}' (expected true or false)")]
  InvalidValue { name: String, value: String },

  #[error("malformed option '{0}' (expected name=value)")]
  Malformed(String),
}

/// Canonical names of the single-flag toggles, in the order their flags are emitted.
pub const TOGGLE_NAMES: &[&str] = &[
  "enable_m_guard",
  "disable_asm",
  "enable_ld_version_script",
  "disable_endian_check",
  "enable_random_daemon",
  "enable_hmac_binary_check",
  "disable_padlock_support",
  "disable_aesni_support",
  "disable_O_flag_munging",
];

/// User-selected build toggles. Unknown names are rejected when loading.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BuildOptions {
  #[serde(alias = "build_shared", alias = "build-shared")]
  pub shared: bool,
  #[serde(alias = "enable-m-guard")]
  pub enable_m_guard: bool,
  #[serde(alias = "disable-asm")]
  pub disable_asm: bool,
  #[serde(alias = "enable-ld-version-script")]
  pub enable_ld_version_script: bool,
  #[serde(alias = "disable-endian-check")]
  pub disable_endian_check: bool,
  #[serde(alias = "enable-random-daemon")]
  pub enable_random_daemon: bool,
  #[serde(alias = "enable-hmac-binary-check")]
  pub enable_hmac_binary_check: bool,
  #[serde(alias = "disable-padlock-support")]
  pub disable_padlock_support: bool,
  #[serde(alias = "disable-aesni-support")]
  pub disable_aesni_support: bool,
  #[serde(rename = "disable_O_flag_munging", alias = "disable-O-flag-munging")]
  pub disable_o_flag_munging: bool,
}

impl BuildOptions {
  /// Single-flag toggles with their current values, in [`TOGGLE_NAMES`] order.
  pub fn toggles(&self) -> [(&'static str, bool); 9] {
    [
      (TOGGLE_NAMES[0], self.enable_m_guard),
      (TOGGLE_NAMES[1], self.disable_asm),
      (TOGGLE_NAMES[2], self.enable_ld_version_script),
      (TOGGLE_NAMES[3], self.disable_endian_check),
      (TOGGLE_NAMES[4], self.enable_random_daemon),
      (TOGGLE_NAMES[5], self.enable_hmac_binary_check),
      (TOGGLE_NAMES[6], self.disable_padlock_support),
      (TOGGLE_NAMES[7], self.disable_aesni_support),
      (TOGGLE_NAMES[8], self.disable_o_flag_munging),
    ]
  }

  /// Set a toggle by name. Dashed and snake-case spellings are both accepted.
  pub fn set(&mut self, name: &str, value: bool) -> Result<(), OptionsError> {
    let slot = match name.replace('-', "_").as_str() {
      "shared" | "build_shared" => &mut self.shared,
      "enable_m_guard" => &mut self.enable_m_guard,
      "disable_asm" => &mut self.disable_asm,
      "enable_ld_version_script" => &mut self.enable_ld_version_script,
      "disable_endian_check" => &mut self.disable_endian_check,
      "enable_random_daemon" => &mut self.enable_random_daemon,
      "enable_hmac_binary_check" => &mut self.enable_hmac_binary_check,
      "disable_padlock_support" => &mut self.disable_padlock_support,
      "disable_aesni_support" => &mut self.disable_aesni_support,
      "disable_O_flag_munging" => &mut self.disable_o_flag_munging,
      _ => return Err(OptionsError::UnknownOption(name.to_string())),
    };
    *slot = value;
    Ok(())
  }

  /// Apply a `name=value` override, as given on the command line.
  pub fn apply_assignment(&mut self, assignment: &str) -> Result<(), OptionsError> {
    let (name, value) = assignment
      .split_once('=')
      .ok_or_else(|| OptionsError::Malformed(assignment.to_string()))?;
    let name = name.trim();
    let value = value.trim();
    let parsed = match value.to_ascii_lowercase().as_str() {
      "true" | "1" | "yes" | "on" => true,
      "false" | "0" | "no" | "off" => false,
      _ => {
        return Err(OptionsError::InvalidValue {
          name: name.to_string(),
          value: value.to_string(),
        });
      }
    };
    self.set(name, parsed)
  }
}
