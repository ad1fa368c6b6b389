//! Environment synthesizer.
//!
//! Turns located dependencies and build options into the variables and
//! flags an autotools `./configure` expects. Everything here is pure: the
//! same inputs always produce a byte-identical [`EnvironmentPlan`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::locate::{Located, LocatedDependency};
use crate::platform::Platform;
use crate::recipe::{BuildOptions, BuildType, Requirement};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SynthError {
  #[error("unsupported platform {0}: native configure builds need a POSIX target")]
  UnsupportedPlatform(Platform),
}

/// Variables and configure flags for one build. Never mutated once the
/// driver starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentPlan {
  /// Variables injected into the external processes only.
  pub vars: BTreeMap<String, String>,
  /// Flags passed to `./configure`, in emission order.
  pub configure_flags: Vec<String>,
  #[serde(serialize_with = "serialize_platform")]
  pub platform: Platform,
}

fn serialize_platform<S: serde::Serializer>(platform: &Platform, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_str(&platform.triple())
}

impl EnvironmentPlan {
  /// Shell-style `KEY="value"` tokens followed by the configure flags, joined
  /// with spaces.
  pub fn render(&self) -> String {
    self
      .vars
      .iter()
      .map(|(key, value)| format!("{}=\"{}\"", key, shell_escape(value)))
      .chain(self.configure_flags.iter().cloned())
      .collect::<Vec<_>>()
      .join(" ")
  }
}

fn shell_escape(value: &str) -> String {
  let mut escaped = String::with_capacity(value.len());
  for c in value.chars() {
    if matches!(c, '"' | '\\' | '$' | '`') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped
}

/// `--<name>` with underscores turned into dashes; case is preserved.
pub fn toggle_flag(name: &str) -> String {
  format!("--{}", name.replace('_', "-"))
}

/// The `shared` toggle is the one non-uniform mapping: it always yields two
/// mutually exclusive flags.
pub fn shared_flags(shared: bool) -> [&'static str; 2] {
  if shared {
    ["--enable-shared", "--disable-static"]
  } else {
    ["--enable-static", "--disable-shared"]
  }
}

/// Build the environment plan for one configure invocation.
pub fn synthesize(
  located: &Located,
  requirements: &[Requirement],
  options: &BuildOptions,
  build_type: BuildType,
  platform: Platform,
) -> Result<EnvironmentPlan, SynthError> {
  if !platform.is_posix() {
    return Err(SynthError::UnsupportedPlatform(platform));
  }

  let mut configure_flags: Vec<String> = shared_flags(options.shared).iter().map(|f| f.to_string()).collect();
  for (name, enabled) in options.toggles() {
    if enabled {
      configure_flags.push(toggle_flag(name));
    }
  }

  let mut vars = BTreeMap::new();
  let mut include_dirs: Vec<&Path> = Vec::new();
  let mut lib_dirs: Vec<&Path> = Vec::new();
  let mut libs: Vec<String> = Vec::new();

  for req in requirements {
    let Some(dep) = located.get(&req.name) else {
      continue;
    };

    if let Some(prefix) = &req.flags_prefix {
      insert_package_flags(&mut vars, prefix, dep, req.link_name());
      for companion in &req.companions {
        insert_package_flags(&mut vars, &companion.flags_prefix, dep, &companion.lib);
      }
    }

    if let Some(arg) = &req.prefix_arg {
      configure_flags.push(format!("{}={}", arg, dep.install_prefix().display()));
    }

    if !include_dirs.contains(&dep.include_dir.as_path()) {
      include_dirs.push(&dep.include_dir);
    }
    if !lib_dirs.contains(&dep.lib_dir.as_path()) {
      lib_dirs.push(&dep.lib_dir);
    }
    let dep_libs: Vec<String> = if dep.libs.is_empty() {
      std::iter::once(req.link_name().to_string())
        .chain(req.companions.iter().map(|c| c.lib.clone()))
        .collect()
    } else {
      dep.libs.iter().cloned().collect()
    };
    for lib in dep_libs {
      if !libs.contains(&lib) {
        libs.push(lib);
      }
    }
  }

  let arch_flag = platform.arch.is_x86_32().then_some("-m32");

  let mut cflags = vec!["-fPIC"];
  cflags.push(match build_type {
    BuildType::Release => "-O2",
    BuildType::Debug => "-g",
  });
  cflags.extend(arch_flag);
  vars.insert("CFLAGS".to_string(), cflags.join(" "));

  if !include_dirs.is_empty() {
    let cppflags: Vec<String> = include_dirs.iter().map(|d| format!("-I{}", d.display())).collect();
    vars.insert("CPPFLAGS".to_string(), cppflags.join(" "));
  }

  let mut ldflags: Vec<String> = lib_dirs.iter().map(|d| format!("-L{}", d.display())).collect();
  ldflags.extend(arch_flag.map(str::to_string));
  if !ldflags.is_empty() {
    vars.insert("LDFLAGS".to_string(), ldflags.join(" "));
  }

  if !libs.is_empty() {
    let libs: Vec<String> = libs.iter().map(|l| format!("-l{}", l)).collect();
    vars.insert("LIBS".to_string(), libs.join(" "));
  }

  Ok(EnvironmentPlan {
    vars,
    configure_flags,
    platform,
  })
}

fn insert_package_flags(vars: &mut BTreeMap<String, String>, prefix: &str, dep: &LocatedDependency, lib: &str) {
  vars.insert(format!("{}_CFLAGS", prefix), format!("-I{}", dep.include_dir.display()));
  vars.insert(
    format!("{}_LIBS", prefix),
    format!("-L{} -l{}", dep.lib_dir.display(), lib),
  );
}
