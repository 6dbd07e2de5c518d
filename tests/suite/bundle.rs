//! Bundling after a successful full compile.

use std::path::Path;

use kiln_config::KilnConfig;
use kiln_core::BuildError;

use crate::common::{FakeToolchain, Project, settle};

fn bundling() -> KilnConfig {
    let mut config = KilnConfig::default();
    config.bundle.enabled = true;
    config
}

#[tokio::test]
async fn test_bundle_runs_once_with_requested_modules() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().gated().into_arc();
    let coordinator = project.coordinator(bundling(), &toolchain);

    let mut tasks = Vec::new();
    for rel in ["src/A.purs", "src/B.purs"] {
        let coordinator = coordinator.clone();
        let source = project.read(rel);
        tasks.push(tokio::spawn(async move {
            coordinator.resolve(Path::new(rel), &source).await
        }));
    }
    settle().await;
    toolchain.release();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    project.resolve(&coordinator, "src/A.purs").await.unwrap();

    assert_eq!(toolchain.bundles(), 1);
    let calls = toolchain.calls();
    let bundle = calls.iter().find(|args| args[0] == "bundle").unwrap();
    let tail: Vec<&str> = bundle[bundle.len() - 6..].iter().map(String::as_str).collect();
    assert_eq!(
        tail,
        ["--namespace", "PS", "--module", "A", "--module", "B"]
    );
    assert_eq!(
        project.read("output/bundle.js"),
        "var PS = {};\nmodule.exports = PS\n"
    );
}

#[tokio::test]
async fn test_no_bundle_after_failed_compile() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().into_arc();
    toolchain.set_compile_result(1, "Error found");
    let coordinator = project.coordinator(bundling(), &toolchain);

    assert!(project.resolve(&coordinator, "src/A.purs").await.is_err());
    assert_eq!(toolchain.bundles(), 0);
}

#[tokio::test]
async fn test_bundle_failure_reaches_first_waiter_only() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().gated().into_arc();
    toolchain.set_bundle_result(1, "Module Main not found");
    let coordinator = project.coordinator(bundling(), &toolchain);

    let mut tasks = Vec::new();
    for rel in ["src/A.purs", "src/B.purs", "src/A.purs"] {
        let coordinator = coordinator.clone();
        let source = project.read(rel);
        tasks.push(tokio::spawn(async move {
            coordinator.resolve(Path::new(rel), &source).await
        }));
    }
    settle().await;
    toolchain.release();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }
    assert!(matches!(
        &results[0],
        Err(BuildError::BundleFailed { stderr }) if stderr.contains("Module Main not found")
    ));
    assert!(matches!(results[1], Err(BuildError::SiblingCompileFailed)));
    assert!(matches!(results[2], Err(BuildError::SiblingCompileFailed)));
    assert_eq!(toolchain.compiles(), 1);
    assert_eq!(toolchain.bundles(), 1);

    let messages = coordinator.take_messages().await;
    assert_eq!(messages.errors.len(), 1);
    assert!(messages.errors[0].contains("Module Main not found"));
}
