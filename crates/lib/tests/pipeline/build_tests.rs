use std::fs;

use nativepack_lib::driver::Stage;
use nativepack_lib::locate::LocateError;
use nativepack_lib::manifest::{Dependency, DependencyManifest};
use nativepack_lib::orchestrator::{Orchestrator, OrchestratorError};
use nativepack_lib::platform::Platform;
use nativepack_lib::platform::arch::Arch;
use nativepack_lib::platform::os::Os;
use nativepack_lib::recipe::BuildOptions;
use nativepack_lib::store;
use serial_test::serial;

use super::common::{Call, SOURCE_FILES, ScriptedExecutor, TreeFetcher, Workspace, gnutls_recipe};

fn linux() -> Platform {
  Platform::new(Arch::X86_64, Os::Linux)
}

#[tokio::test]
#[serial]
async fn successful_build_commits_staged_package() {
  let ws = Workspace::new();
  let orchestrator = ws.orchestrator(TreeFetcher::new(SOURCE_FILES), ScriptedExecutor::succeeding());
  let recipe = gnutls_recipe();

  let record = orchestrator
    .build(&recipe, &ws.manifest(), &recipe.options, linux())
    .await
    .unwrap();

  assert_eq!(record.name, "gnutls");
  assert_eq!(record.version, "3.6.2");
  assert_eq!(record.libs, vec!["gnutls"]);
  assert!(record.path.starts_with(ws.store().root().join("pkg")));
  assert!(store::verify(&record.path));

  let root = &record.path;
  assert!(root.join("include/gnutls/gnutls.h").is_file());
  assert!(root.join("include/gnutls/x509.h").is_file());
  assert!(root.join("lib/libgnutls.a").is_file());
  assert!(root.join("licenses/COPYING").is_file());
  assert!(root.join("licenses/COPYING.LESSER").is_file());
  assert_eq!(fs::read_to_string(root.join("licenses/COPYING")).unwrap(), "GPL");
  assert!(root.join("licenses/lib/unistring/COPYING").is_file());

  assert!(!root.join("bin").exists());
  assert!(!root.join("lib/pkgconfig").exists());
  assert!(!root.join("lib/gnutls.pc").exists());
  assert!(!root.join("include/gnutls_int.h").exists());
}

#[tokio::test]
#[serial]
async fn stages_run_in_order_with_synthesized_environment() {
  let ws = Workspace::new();
  let executor = ScriptedExecutor::succeeding();
  let orchestrator = ws.orchestrator(TreeFetcher::new(SOURCE_FILES), executor);
  let recipe = gnutls_recipe();

  orchestrator
    .build(&recipe, &ws.manifest(), &recipe.options, linux())
    .await
    .unwrap();

  let calls = orchestrator_calls(&orchestrator);
  assert_eq!(calls.len(), 3);

  let configure = &calls[0];
  assert_eq!(configure.program, "sh");
  assert_eq!(configure.args[0], "./configure");
  assert_eq!(configure.args[1], "--enable-static");
  assert_eq!(configure.args[2], "--disable-shared");
  assert!(configure.args.contains(&"--without-p11-kit".to_string()));
  assert!(configure.args.last().unwrap().starts_with("--prefix="));

  let nettle_include = ws.prefix("nettle").join("include");
  assert_eq!(
    configure.env.get("NETTLE_CFLAGS"),
    Some(&format!("-I{}", nettle_include.display()))
  );
  assert_eq!(
    configure.env.get("HOGWEED_CFLAGS"),
    Some(&format!("-I{}", nettle_include.display()))
  );
  assert!(configure.env["HOGWEED_LIBS"].ends_with("-lhogweed"));
  assert!(configure.env["GMP_LIBS"].ends_with("-lgmp"));

  assert_eq!(calls[1].program, "make");
  assert_eq!(calls[1].args, vec!["-j2".to_string()]);
  assert_eq!(calls[2].args, vec!["install".to_string()]);
  for call in &calls {
    assert_eq!(call.env, configure.env);
  }
}

fn orchestrator_calls(orchestrator: &Orchestrator<TreeFetcher, ScriptedExecutor>) -> Vec<Call> {
  orchestrator.executor().calls()
}

#[tokio::test]
#[serial]
async fn configure_failure_stops_before_staging() {
  let ws = Workspace::new();
  let orchestrator = ws.orchestrator(TreeFetcher::new(SOURCE_FILES), ScriptedExecutor::failing_at(0, 1));
  let recipe = gnutls_recipe();
  let cwd_before = std::env::current_dir().unwrap();

  let err = orchestrator
    .build(&recipe, &ws.manifest(), &recipe.options, linux())
    .await
    .unwrap_err();

  match err {
    OrchestratorError::ExternalBuild { stage, exit_code } => {
      assert_eq!(stage, Stage::Configuring);
      assert_eq!(exit_code, Some(1));
    }
    other => panic!("expected external build failure, got {other:?}"),
  }
  assert_eq!(orchestrator_calls(&orchestrator).len(), 1);
  assert!(ws.store().list().unwrap().is_empty());
  assert_eq!(std::env::current_dir().unwrap(), cwd_before);

  // The source tree stays behind for diagnostics.
  let src = ws.temp.path().join("work/gnutls-3.6.2/src");
  assert!(src.join("configure").is_file());
}

#[tokio::test]
#[serial]
async fn install_failure_reports_installing_stage() {
  let ws = Workspace::new();
  let orchestrator = ws.orchestrator(TreeFetcher::new(SOURCE_FILES), ScriptedExecutor::failing_at(2, 2));
  let recipe = gnutls_recipe();

  let err = orchestrator
    .build(&recipe, &ws.manifest(), &recipe.options, linux())
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    OrchestratorError::ExternalBuild {
      stage: Stage::Installing,
      exit_code: Some(2)
    }
  ));
  assert!(ws.store().list().unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn missing_dependency_fails_before_fetch() {
  let ws = Workspace::new();
  let orchestrator = ws.orchestrator(TreeFetcher::new(SOURCE_FILES), ScriptedExecutor::succeeding());
  let recipe = gnutls_recipe();
  let manifest = DependencyManifest::new(vec![Dependency::new("nettle", "3.9").with_prefix(ws.prefix("nettle"))]).unwrap();

  let err = orchestrator
    .build(&recipe, &manifest, &recipe.options, linux())
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    OrchestratorError::Locate(LocateError::NotInManifest { ref name }) if name == "gmp"
  ));
  assert!(orchestrator.fetcher().fetched.lock().unwrap().is_empty());
  assert!(orchestrator_calls(&orchestrator).is_empty());
}

#[tokio::test]
#[serial]
async fn unmatched_paths_fail_with_dependency_not_found() {
  let ws = Workspace::new();
  let orchestrator = ws.orchestrator(TreeFetcher::new(SOURCE_FILES), ScriptedExecutor::succeeding());
  let recipe = gnutls_recipe();
  let manifest = DependencyManifest::new(vec![
    Dependency::new("nettle", "3.9").with_prefix(ws.prefix("nettle")),
    Dependency::new("gmp", "6.3").with_prefix(ws.temp.path().join("opt/arith")),
  ])
  .unwrap();

  let err = orchestrator
    .build(&recipe, &manifest, &recipe.options, linux())
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    OrchestratorError::Locate(LocateError::DependencyNotFound { ref name, .. }) if name == "gmp"
  ));
}

#[tokio::test]
#[serial]
async fn windows_target_never_runs_a_build() {
  let ws = Workspace::new();
  let orchestrator = ws.orchestrator(TreeFetcher::new(SOURCE_FILES), ScriptedExecutor::succeeding());
  let recipe = gnutls_recipe();

  let err = orchestrator
    .build(
      &recipe,
      &ws.manifest(),
      &recipe.options,
      Platform::new(Arch::X86_64, Os::Windows),
    )
    .await
    .unwrap_err();

  assert!(matches!(err, OrchestratorError::Synth(_)));
  assert!(orchestrator_calls(&orchestrator).is_empty());
}

#[tokio::test]
#[serial]
async fn rebuilding_identical_output_reuses_store_path() {
  let ws = Workspace::new();
  let recipe = gnutls_recipe();

  let first = ws
    .orchestrator(TreeFetcher::new(SOURCE_FILES), ScriptedExecutor::succeeding())
    .build(&recipe, &ws.manifest(), &recipe.options, linux())
    .await
    .unwrap();
  let second = ws
    .orchestrator(TreeFetcher::new(SOURCE_FILES), ScriptedExecutor::succeeding())
    .build(&recipe, &ws.manifest(), &recipe.options, linux())
    .await
    .unwrap();

  assert_eq!(first.path, second.path);
  assert_eq!(ws.store().list().unwrap().len(), 1);
}

#[test]
fn plan_touches_neither_store_nor_network() {
  let ws = Workspace::new();
  let fetcher = TreeFetcher::new(SOURCE_FILES);
  let orchestrator = ws.orchestrator(fetcher, ScriptedExecutor::succeeding());
  let recipe = gnutls_recipe();
  let mut options = BuildOptions::default();
  options.set("disable_asm", true).unwrap();

  let plan = orchestrator.plan(&recipe, &ws.manifest(), &options, linux()).unwrap();

  assert_eq!(
    &plan.configure_flags[..3],
    ["--enable-static", "--disable-shared", "--disable-asm"]
  );
  assert!(orchestrator.fetcher().fetched.lock().unwrap().is_empty());
  assert!(!ws.store().root().exists());
  assert!(fs::read_dir(ws.temp.path()).unwrap().next().is_none());
}
