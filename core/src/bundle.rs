//! Bundling step: one bundler invocation per generation.

use std::path::Path;

use kiln_config::BundleConfig;
use kiln_process::ProcessRunner;
use tokio::io::AsyncWriteExt;

use crate::error::BuildError;

/// `<args…> <output>/*/*.js --output <artifact> --namespace <ns> --module <m>…`.
#[must_use]
pub fn bundle_args(
    config: &BundleConfig,
    output_dir: &Path,
    artifact: &Path,
    modules: &[String],
) -> Vec<String> {
    let mut args = config.args.clone();
    args.push(output_dir.join("*").join("*.js").to_string_lossy().into_owned());
    args.push("--output".to_string());
    args.push(artifact.to_string_lossy().into_owned());
    args.push("--namespace".to_string());
    args.push(config.namespace.clone());
    for module in modules {
        args.push("--module".to_string());
        args.push(module.clone());
    }
    args
}

/// Run the bundler and make the artifact export its namespace.
pub async fn run_bundler(
    runner: &dyn ProcessRunner,
    config: &BundleConfig,
    output_dir: &Path,
    artifact: &Path,
    modules: &[String],
) -> Result<(), BuildError> {
    let args = bundle_args(config, output_dir, artifact, modules);
    tracing::info!(artifact = %artifact.display(), modules = modules.len(), "bundling");
    let output = runner.run(&config.command, &args).await?;
    if !output.success() {
        return Err(BuildError::BundleFailed {
            stderr: output.stderr,
        });
    }

    let artifact_err = |source| BuildError::Artifact {
        path: artifact.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(artifact)
        .await
        .map_err(artifact_err)?;
    file.write_all(format!("\nmodule.exports = {}\n", config.namespace).as_bytes())
        .await
        .map_err(artifact_err)?;
    file.flush().await.map_err(artifact_err)?;
    Ok(())
}
