mod build;
mod info;
mod plan;

pub use build::cmd_build;
pub use info::cmd_info;
pub use plan::cmd_plan;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;

use nativepack_lib::locate::MatchPolicy;
use nativepack_lib::manifest::DependencyManifest;
use nativepack_lib::platform::Platform;
use nativepack_lib::platform::arch::Arch;
use nativepack_lib::platform::os::Os;
use nativepack_lib::recipe::{BuildOptions, Recipe};

/// Arguments shared by `build` and `plan`.
#[derive(Debug, Args)]
pub struct BuildInputs {
  /// Recipe JSON describing the library
  pub recipe: PathBuf,

  /// Dependency manifest JSON
  #[arg(short, long)]
  pub deps: PathBuf,

  /// Override a build option, e.g. `-o shared=true` or `-o disable_asm=1`
  #[arg(short = 'o', long = "option", value_name = "NAME=VALUE")]
  pub options: Vec<String>,

  /// Target OS (defaults to the host)
  #[arg(long)]
  pub os: Option<Os>,

  /// Target architecture (defaults to the host)
  #[arg(long)]
  pub arch: Option<Arch>,

  /// Match dependency names anywhere in a path instead of by whole segment
  #[arg(long)]
  pub substring_match: bool,
}

/// Inputs parsed, validated and merged with command-line overrides.
pub struct Loaded {
  pub recipe: Recipe,
  pub manifest: DependencyManifest,
  pub options: BuildOptions,
  pub platform: Platform,
}

impl BuildInputs {
  pub fn load(&self) -> Result<Loaded> {
    let recipe = Recipe::from_path(&self.recipe)
      .with_context(|| format!("Failed to load recipe: {}", self.recipe.display()))?;
    let manifest = DependencyManifest::from_path(&self.deps)
      .with_context(|| format!("Failed to load dependency manifest: {}", self.deps.display()))?;

    let mut options = recipe.options.clone();
    for assignment in &self.options {
      options
        .apply_assignment(assignment)
        .with_context(|| format!("Invalid option override: {assignment}"))?;
    }

    Ok(Loaded {
      recipe,
      manifest,
      options,
      platform: self.platform()?,
    })
  }

  pub fn match_policy(&self) -> MatchPolicy {
    if self.substring_match {
      MatchPolicy::Substring
    } else {
      MatchPolicy::Segment
    }
  }

  fn platform(&self) -> Result<Platform> {
    let os = match self.os.or_else(Os::current) {
      Some(os) => os,
      None => bail!("Could not detect the host OS; pass --os"),
    };
    let arch = match self.arch.or_else(Arch::current) {
      Some(arch) => arch,
      None => bail!("Could not detect the host architecture; pass --arch"),
    };
    Ok(Platform::new(arch, os))
  }
}
