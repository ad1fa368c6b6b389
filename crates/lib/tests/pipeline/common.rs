//! Fake fetcher and scripted executor shared by the pipeline tests.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use nativepack_lib::driver::DriverConfig;
use nativepack_lib::exec::{ExecOutput, Executor};
use nativepack_lib::fetch::{FetchError, Fetcher};
use nativepack_lib::locate::MatchPolicy;
use nativepack_lib::manifest::{Dependency, DependencyManifest};
use nativepack_lib::orchestrator::{Orchestrator, OrchestratorConfig};
use nativepack_lib::recipe::{BuildOptions, BuildType, PackageLayout, Recipe, Requirement, Source};
use nativepack_lib::store::Store;
use tempfile::TempDir;

/// Serves a fixed source tree instead of downloading anything.
pub struct TreeFetcher {
  files: Vec<(String, String)>,
  pub fetched: Mutex<Vec<String>>,
}

impl TreeFetcher {
  pub fn new(files: &[(&str, &str)]) -> Self {
    Self {
      files: files.iter().map(|(p, c)| (p.to_string(), c.to_string())).collect(),
      fetched: Mutex::new(Vec::new()),
    }
  }
}

impl Fetcher for TreeFetcher {
  async fn fetch(&self, url: &str, _sha256: &str, downloads_dir: &Path) -> Result<PathBuf, FetchError> {
    self.fetched.lock().unwrap().push(url.to_string());
    fs::create_dir_all(downloads_dir)?;
    let archive = downloads_dir.join("source.tar.gz");
    fs::write(&archive, b"fake")?;
    Ok(archive)
  }

  async fn extract(&self, _archive: &Path, dest: &Path) -> Result<PathBuf, FetchError> {
    for (rel, content) in &self.files {
      let path = dest.join(rel);
      fs::create_dir_all(path.parent().unwrap())?;
      fs::write(path, content)?;
    }
    Ok(dest.to_path_buf())
  }
}

#[derive(Debug, Clone)]
pub struct Call {
  pub program: String,
  pub args: Vec<String>,
  pub env: BTreeMap<String, String>,
}

/// Pretends to be sh/make: `make install` writes a small install tree into
/// the prefix given to configure.
#[derive(Default)]
pub struct ScriptedExecutor {
  fail_at: Option<(usize, i32)>,
  prefix: Mutex<Option<PathBuf>>,
  pub calls: Mutex<Vec<Call>>,
}

impl ScriptedExecutor {
  pub fn succeeding() -> Self {
    Self::default()
  }

  pub fn failing_at(call: usize, exit_code: i32) -> Self {
    Self {
      fail_at: Some((call, exit_code)),
      ..Self::default()
    }
  }

  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }
}

impl Executor for ScriptedExecutor {
  async fn exec(
    &self,
    program: &str,
    args: &[String],
    cwd: &Path,
    env: &BTreeMap<String, String>,
  ) -> io::Result<ExecOutput> {
    let index = {
      let mut calls = self.calls.lock().unwrap();
      calls.push(Call {
        program: program.to_string(),
        args: args.to_vec(),
        env: env.clone(),
      });
      calls.len() - 1
    };

    if let Some((at, code)) = self.fail_at
      && at == index
    {
      return Ok(ExecOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: "configure: error: nettle not found".to_string(),
      });
    }

    if let Some(prefix) = args.iter().find_map(|a| a.strip_prefix("--prefix=")) {
      *self.prefix.lock().unwrap() = Some(PathBuf::from(prefix));
    }
    if args.iter().any(|a| a == "install") {
      let prefix = self
        .prefix
        .lock()
        .unwrap()
        .clone()
        .unwrap_or_else(|| cwd.join("_install"));
      install_tree(&prefix)?;
    }

    Ok(ExecOutput {
      exit_code: Some(0),
      ..ExecOutput::default()
    })
  }
}

fn install_tree(prefix: &Path) -> io::Result<()> {
  for (rel, content) in [
    ("include/gnutls/gnutls.h", "/* gnutls */"),
    ("include/gnutls/x509.h", "/* x509 */"),
    ("lib/libgnutls.a", "ar"),
    ("lib/pkgconfig/gnutls.pc", "Name: gnutls"),
    ("bin/gnutls-cli", "elf"),
  ] {
    let path = prefix.join(rel);
    fs::create_dir_all(path.parent().unwrap())?;
    fs::write(path, content)?;
  }
  Ok(())
}

pub const SOURCE_FILES: &[(&str, &str)] = &[
  ("configure", "#!/bin/sh\n"),
  ("COPYING", "GPL"),
  ("COPYING.LESSER", "LGPL"),
  ("lib/gnutls_int.h", "/* private */"),
  ("lib/unistring/COPYING", "bundled LGPLv3+"),
];

/// Scratch store, work dir and fake dependency prefixes.
pub struct Workspace {
  pub temp: TempDir,
}

impl Workspace {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn store(&self) -> Store {
    Store::new(self.temp.path().join("store"))
  }

  pub fn prefix(&self, name: &str) -> PathBuf {
    self.temp.path().join("deps").join(name)
  }

  pub fn manifest(&self) -> DependencyManifest {
    DependencyManifest::new(vec![
      Dependency::new("nettle", "3.9").with_prefix(self.prefix("nettle")),
      Dependency::new("gmp", "6.3").with_prefix(self.prefix("gmp")),
    ])
    .unwrap()
  }

  pub fn orchestrator<E: Executor>(&self, fetcher: TreeFetcher, executor: E) -> Orchestrator<TreeFetcher, E> {
    let config = OrchestratorConfig {
      driver: DriverConfig {
        jobs: 2,
        ..DriverConfig::default()
      },
      match_policy: MatchPolicy::Segment,
      store: self.store(),
      work_dir: self.temp.path().join("work"),
    };
    Orchestrator::new(fetcher, executor, config)
  }
}

pub fn gnutls_recipe() -> Recipe {
  Recipe {
    name: "gnutls".to_string(),
    version: "3.6.2".to_string(),
    source: Source {
      url: "https://example.invalid/gnutls-3.6.2.tar.xz".to_string(),
      sha256: "a".repeat(64),
    },
    requires: vec![
      Requirement::new("nettle")
        .with_flags("NETTLE")
        .with_companion("HOGWEED", "hogweed"),
      Requirement::new("gmp").with_flags("GMP"),
    ],
    configure_args: vec!["--without-p11-kit".to_string()],
    options: BuildOptions::default(),
    build_type: BuildType::Release,
    layout: PackageLayout::default(),
    licenses: vec!["COPYING*".to_string()],
  }
}
