//! Full-compile path: single flight, fan-out, invalidation, messages.

use std::path::Path;

use kiln_config::KilnConfig;
use kiln_core::BuildError;

use crate::common::{FakeToolchain, Project, settle};

#[tokio::test]
async fn test_concurrent_requests_share_one_compile() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().gated().into_arc();
    let coordinator = project.coordinator(KilnConfig::default(), &toolchain);

    let mut tasks = Vec::new();
    for rel in ["src/A.purs", "src/B.purs", "src/A.purs", "src/B.purs"] {
        let coordinator = coordinator.clone();
        let source = project.read(rel);
        tasks.push(tokio::spawn(async move {
            coordinator.resolve(Path::new(rel), &source).await
        }));
    }
    settle().await;
    assert_eq!(toolchain.compiles(), 1);
    toolchain.release();

    let mut outputs = Vec::new();
    for task in tasks {
        outputs.push(task.await.unwrap().unwrap());
    }
    assert_eq!(toolchain.compiles(), 1);
    assert_eq!(outputs[0], "exports.a = 1;\n");
    assert_eq!(outputs[0], outputs[2]);
    assert_eq!(outputs[1], outputs[3]);
}

#[tokio::test]
async fn test_imports_point_at_source_files() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().into_arc();
    let coordinator = project.coordinator(KilnConfig::default(), &toolchain);

    let b = project.resolve(&coordinator, "src/B.purs").await.unwrap();

    assert_eq!(
        b,
        format!(
            "var A = {};\nexports.b = A.a;\n",
            project.require_of("src/A.purs")
        )
    );
}

#[tokio::test]
async fn test_finished_generation_reads_without_compiling() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().into_arc();
    let coordinator = project.coordinator(KilnConfig::default(), &toolchain);

    project.resolve(&coordinator, "src/A.purs").await.unwrap();
    project.resolve(&coordinator, "src/B.purs").await.unwrap();
    project.resolve(&coordinator, "src/A.purs").await.unwrap();

    assert_eq!(toolchain.compiles(), 1);
}

#[tokio::test]
async fn test_compile_arguments() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().into_arc();
    let coordinator = project.coordinator(KilnConfig::default(), &toolchain);

    project.resolve(&coordinator, "src/A.purs").await.unwrap();

    let output = project.path("output").to_string_lossy().into_owned();
    assert_eq!(
        toolchain.calls(),
        vec![vec![
            "compile".to_string(),
            "src/**/*.purs".to_string(),
            "--ffi".to_string(),
            "src/**/*.js".to_string(),
            "--output".to_string(),
            output,
        ]]
    );
}

#[tokio::test]
async fn test_compile_failure_reaches_first_waiter_only() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().gated().into_arc();
    toolchain.set_compile_result(1, "Error found:\nin module A");
    let coordinator = project.coordinator(KilnConfig::default(), &toolchain);

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
    let first = results
        .iter()
        .filter(|r| matches!(r, Err(BuildError::CompileFailed { .. })))
        .count();
    let siblings = results
        .iter()
        .filter(|r| matches!(r, Err(BuildError::SiblingCompileFailed)))
        .count();
    assert_eq!((first, siblings), (1, 2));
    assert!(matches!(
        &results[0],
        Err(BuildError::CompileFailed { stderr }) if stderr.contains("in module A")
    ));

    let messages = coordinator.take_messages().await;
    assert_eq!(messages.errors.len(), 1);
    assert!(messages.errors[0].starts_with("Error found:"));
    assert_eq!(toolchain.compiles(), 1);
}

#[tokio::test]
async fn test_failed_generation_is_not_recompiled() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().into_arc();
    toolchain.set_compile_result(1, "Error found");
    let coordinator = project.coordinator(KilnConfig::default(), &toolchain);

    let first = project.resolve(&coordinator, "src/A.purs").await;
    let second = project.resolve(&coordinator, "src/A.purs").await;

    assert!(matches!(first, Err(BuildError::CompileFailed { .. })));
    assert!(matches!(second, Err(BuildError::Output { .. })));
    assert_eq!(toolchain.compiles(), 1);
}

#[tokio::test]
async fn test_invalidate_discards_previous_messages() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().into_arc();
    toolchain.set_compile_result(1, "Error found");
    let coordinator = project.coordinator(KilnConfig::default(), &toolchain);

    assert!(project.resolve(&coordinator, "src/A.purs").await.is_err());
    coordinator.invalidate().await;
    assert_eq!(coordinator.generation().await, 1);

    toolchain.set_compile_result(0, "");
    let a = project.resolve(&coordinator, "src/A.purs").await.unwrap();

    assert_eq!(a, "exports.a = 1;\n");
    assert_eq!(toolchain.compiles(), 2);
    assert!(coordinator.take_messages().await.is_empty());
}

#[tokio::test]
async fn test_warnings_collected_and_drained() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().into_arc();
    toolchain.set_compile_result(0, "Warning 1 of 1:\n  unused import");
    let coordinator = project.coordinator(KilnConfig::default(), &toolchain);

    project.resolve(&coordinator, "src/A.purs").await.unwrap();

    let messages = coordinator.take_messages().await;
    assert_eq!(messages.warnings.len(), 1);
    assert!(messages.warnings[0].contains("unused import"));
    assert!(messages.errors.is_empty());
    assert!(coordinator.take_messages().await.is_empty());
}

#[tokio::test]
async fn test_warnings_suppressed_when_disabled() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().into_arc();
    toolchain.set_compile_result(0, "Warning 1 of 1:\n  unused import");
    let config = KilnConfig {
        warnings: false,
        ..KilnConfig::default()
    };
    let coordinator = project.coordinator(config, &toolchain);

    project.resolve(&coordinator, "src/A.purs").await.unwrap();

    assert!(coordinator.take_messages().await.is_empty());
}

#[tokio::test]
async fn test_missing_module_declaration() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().into_arc();
    let coordinator = project.coordinator(KilnConfig::default(), &toolchain);

    let result = coordinator
        .resolve(Path::new("src/C.purs"), "-- nothing here\n")
        .await;

    assert!(matches!(
        result,
        Err(BuildError::ModuleNameMissing { path }) if path == project.path("src/C.purs")
    ));
    assert_eq!(toolchain.compiles(), 0);
}

#[tokio::test]
async fn test_new_generation_waits_for_running_compile() {
    let project = Project::new();
    let toolchain = FakeToolchain::new().gated().into_arc();
    let coordinator = project.coordinator(KilnConfig::default(), &toolchain);

    let spawn_resolve = |rel: &'static str| {
        let coordinator = coordinator.clone();
        let source = project.read(rel);
        tokio::spawn(async move { coordinator.resolve(Path::new(rel), &source).await })
    };

    let old = spawn_resolve("src/A.purs");
    settle().await;
    coordinator.invalidate().await;
    let new = spawn_resolve("src/A.purs");
    settle().await;
    assert_eq!(toolchain.compiles(), 1);

    toolchain.release();
    assert_eq!(old.await.unwrap().unwrap(), "exports.a = 1;\n");
    assert_eq!(new.await.unwrap().unwrap(), "exports.a = 1;\n");
    assert_eq!(toolchain.compiles(), 2);
}
