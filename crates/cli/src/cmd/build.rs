//! Implementation of the `nativepack build` command.

use std::time::Instant;

use anyhow::{Context, Result};

use nativepack_lib::exec::ProcessExecutor;
use nativepack_lib::fetch::HttpFetcher;
use nativepack_lib::orchestrator::{Orchestrator, OrchestratorConfig};

use super::BuildInputs;
use crate::output::{OutputFormat, format_duration, print_info, print_json, print_stat, print_success};

pub fn cmd_build(inputs: &BuildInputs, jobs: Option<usize>, output: OutputFormat) -> Result<()> {
  let loaded = inputs.load()?;
  let recipe = &loaded.recipe;

  let mut config = OrchestratorConfig {
    match_policy: inputs.match_policy(),
    ..OrchestratorConfig::default()
  };
  if let Some(jobs) = jobs {
    config.driver.jobs = jobs;
  }
  let orchestrator = Orchestrator::new(HttpFetcher::new(), ProcessExecutor, config);

  if !output.is_json() {
    print_info(&format!("Building {} for {}", recipe.id(), loaded.platform));
  }

  let started = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let record = rt
    .block_on(orchestrator.build(recipe, &loaded.manifest, &loaded.options, loaded.platform))
    .with_context(|| format!("Build of {} failed", recipe.id()))?;
  let elapsed = started.elapsed();

  if output.is_json() {
    print_json(&serde_json::json!({
      "package": record,
      "elapsed_ms": elapsed.as_millis() as u64,
    }))?;
  } else {
    print_success(&format!("Built {} in {}", recipe.id(), format_duration(elapsed)));
    print_stat("Package", &record.path.display().to_string());
    print_stat("Hash", &record.hash.0);
    print_stat("Libraries", &link_flags(&record.libs));
  }

  Ok(())
}

fn link_flags(libs: &[String]) -> String {
  if libs.is_empty() {
    return "none".to_string();
  }
  libs.iter().map(|lib| format!("-l{lib}")).collect::<Vec<_>>().join(" ")
}
