//! Implementation of the `nativepack plan` command.
//!
//! Locates dependencies and prints the synthesized configure environment
//! without fetching or building anything.

use anyhow::{Context, Result};

use nativepack_lib::exec::ProcessExecutor;
use nativepack_lib::fetch::HttpFetcher;
use nativepack_lib::orchestrator::{Orchestrator, OrchestratorConfig};

use super::BuildInputs;
use crate::output::{print_info, print_json, print_stat};

pub fn cmd_plan(inputs: &BuildInputs, json: bool) -> Result<()> {
  let loaded = inputs.load()?;
  let config = OrchestratorConfig {
    match_policy: inputs.match_policy(),
    ..OrchestratorConfig::default()
  };
  let orchestrator = Orchestrator::new(HttpFetcher::new(), ProcessExecutor, config);

  let mut plan = orchestrator
    .plan(&loaded.recipe, &loaded.manifest, &loaded.options, loaded.platform)
    .with_context(|| format!("Failed to plan {}", loaded.recipe.id()))?;
  plan.configure_flags.extend(loaded.recipe.configure_args.iter().cloned());

  if json {
    return print_json(&plan);
  }

  print_info(&format!("Plan for {} ({})", loaded.recipe.id(), plan.platform));
  println!();
  println!("Environment:");
  for (key, value) in &plan.vars {
    print_stat(key, value);
  }
  println!();
  println!("Configure flags:");
  for flag in &plan.configure_flags {
    println!("  {flag}");
  }
  println!();
  println!("Rendered:");
  println!("  {}", plan.render());

  Ok(())
}
