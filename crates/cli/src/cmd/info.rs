use anyhow::{Context, Result};

use nativepack_lib::platform::paths::work_dir;
use nativepack_lib::platform::platform_triple;
use nativepack_lib::store::Store;
use nativepack_lib::store_lock::{LockMode, StoreLock};

use crate::output::{OutputFormat, print_json, print_stat, truncate_hash};

pub fn cmd_info(output: OutputFormat) -> Result<()> {
  let store = Store::from_env();
  let work = work_dir();
  let _lock = if store.root().exists() {
    Some(
      StoreLock::acquire(store.root(), LockMode::Shared, "info").context("Failed to acquire store lock")?,
    )
  } else {
    None
  };
  let packages = store.list().context("Failed to read package store")?;

  if output.is_json() {
    return print_json(&serde_json::json!({
      "version": env!("CARGO_PKG_VERSION"),
      "platform": platform_triple(),
      "store": store.root(),
      "work": work,
      "packages": packages,
    }));
  }

  println!("System:");
  print_stat(
    "Platform",
    platform_triple().as_deref().unwrap_or("unknown (pass --os/--arch)"),
  );
  print_stat("Store", &store.root().display().to_string());
  print_stat("Work", &work.display().to_string());

  println!();
  println!("Packages: {}", packages.len());
  for package in &packages {
    println!(
      "  {}-{} {} [{}]",
      package.name,
      package.version,
      truncate_hash(&package.hash.0),
      package.libs.join(", ")
    );
  }

  Ok(())
}
