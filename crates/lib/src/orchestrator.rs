//! End-to-end pipeline: locate, synthesize, fetch, drive, stage, commit.
//!
//! Every step must succeed before the next one starts. A failed external
//! build stops the pipeline before anything is staged, so the store only
//! ever receives packages from builds where every stage exited 0.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::driver::{BuildDriver, BuildStatus, DriverConfig, DriverError, Stage};
use crate::environment::{EnvironmentPlan, SynthError, synthesize};
use crate::exec::Executor;
use crate::fetch::{FetchError, Fetcher};
use crate::locate::{LocateError, MatchPolicy, locate_requirements};
use crate::manifest::DependencyManifest;
use crate::platform::Platform;
use crate::platform::paths::work_dir;
use crate::recipe::{BuildOptions, PackageLayout, Recipe, RecipeError};
use crate::stage::{StageError, stage};
use crate::store::{PackageRecord, Store, StoreError};
use crate::store_lock::{LockMode, StoreLock, StoreLockError};

#[derive(Debug, Error)]
pub enum OrchestratorError {
  #[error(transparent)]
  Recipe(#[from] RecipeError),

  #[error(transparent)]
  Locate(#[from] LocateError),

  #[error(transparent)]
  Synth(#[from] SynthError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Driver(#[from] DriverError),

  #[error(
    "external build failed while {stage} ({})",
    .exit_code.map_or_else(|| "interrupted".to_string(), |code| format!("exit code {code}"))
  )]
  ExternalBuild { stage: Stage, exit_code: Option<i32> },

  #[error(transparent)]
  Stage(#[from] StageError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Lock(#[from] StoreLockError),

  #[error("failed to prepare work directory {path}: {source}")]
  WorkDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
  pub driver: DriverConfig,
  pub match_policy: MatchPolicy,
  pub store: Store,
  /// Downloads land in `<work_dir>/downloads`, sources in
  /// `<work_dir>/<name>-<version>/src`.
  pub work_dir: PathBuf,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      driver: DriverConfig::default(),
      match_policy: MatchPolicy::default(),
      store: Store::from_env(),
      work_dir: work_dir(),
    }
  }
}

pub struct Orchestrator<F, E> {
  fetcher: F,
  driver: BuildDriver<E>,
  match_policy: MatchPolicy,
  store: Store,
  work_dir: PathBuf,
}

impl<F: Fetcher, E: Executor> Orchestrator<F, E> {
  pub fn new(fetcher: F, executor: E, config: OrchestratorConfig) -> Self {
    Self {
      fetcher,
      driver: BuildDriver::new(executor, config.driver),
      match_policy: config.match_policy,
      store: config.store,
      work_dir: config.work_dir,
    }
  }

  pub fn store(&self) -> &Store {
    &self.store
  }

  pub fn fetcher(&self) -> &F {
    &self.fetcher
  }

  pub fn executor(&self) -> &E {
    self.driver.executor()
  }

  /// Locate and synthesize only. Touches neither the network nor the store.
  pub fn plan(
    &self,
    recipe: &Recipe,
    manifest: &DependencyManifest,
    options: &BuildOptions,
    platform: Platform,
  ) -> Result<EnvironmentPlan, OrchestratorError> {
    recipe.validate()?;
    let located = locate_requirements(manifest, &recipe.requires, self.match_policy)?;
    let plan = synthesize(&located, &recipe.requires, options, recipe.build_type, platform)?;
    Ok(plan)
  }

  /// Build `recipe` against `manifest` and commit the staged package.
  pub async fn build(
    &self,
    recipe: &Recipe,
    manifest: &DependencyManifest,
    options: &BuildOptions,
    platform: Platform,
  ) -> Result<PackageRecord, OrchestratorError> {
    let id = recipe.id();
    let _store_lock = StoreLock::acquire(self.store.root(), LockMode::Exclusive, &format!("build {id}"))?;

    let plan = self.plan(recipe, manifest, options, platform)?;
    info!(package = %id, flags = plan.configure_flags.len(), "environment synthesized");

    let source_root = self.prepare_source(recipe).await?;

    let result = self.driver.run(&source_root, &plan, &recipe.configure_args).await?;
    if let BuildStatus::Failed { stage, exit_code } = result.status {
      warn!(package = %id, stage = %stage, exit_code = ?exit_code, "build failed, nothing staged");
      return Err(OrchestratorError::ExternalBuild { stage, exit_code });
    }

    let staging = self.store.staging_area()?;
    let artifacts = stage(&result.produced_artifact_root, &recipe.layout, staging.path())?;
    let licenses = stage(&source_root, &PackageLayout::licenses(&recipe.licenses), staging.path())?;
    if licenses.file_count() == 0 {
      warn!(package = %id, "no license files found in source tree");
    }
    info!(
      package = %id,
      files = artifacts.file_count() + licenses.file_count(),
      "package staged"
    );

    let record = self.store.commit(staging.path(), &recipe.name, &recipe.version)?;
    if record.libs.is_empty() {
      warn!(package = %id, "package contains no linkable libraries");
    }
    Ok(record)
  }

  async fn prepare_source(&self, recipe: &Recipe) -> Result<PathBuf, OrchestratorError> {
    let downloads = self.work_dir.join("downloads");
    let src = self.work_dir.join(recipe.id()).join("src");

    // A previous failed build is left behind for inspection; start clean.
    if src.exists() {
      std::fs::remove_dir_all(&src).map_err(|source| work_dir_err(&src, source))?;
    }

    let archive = self
      .fetcher
      .fetch(&recipe.source.url, &recipe.source.sha256, &downloads)
      .await?;
    let root = self.fetcher.extract(&archive, &src).await?;
    info!(package = %recipe.id(), source = %root.display(), "source ready");
    Ok(root)
  }
}

fn work_dir_err(path: &Path, source: std::io::Error) -> OrchestratorError {
  OrchestratorError::WorkDir {
    path: path.to_path_buf(),
    source,
  }
}
