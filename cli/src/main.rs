//! kiln - resolve modules through one coordinated build.
//!
//! ```text
//! kiln src/Main.purs src/Data/Foo.purs
//!   └─▶ BuildCoordinator::resolve (concurrently, one task per file)
//!         └─▶ single full compile ─▶ rewritten output on stdout
//! ```
//!
//! Compiled output goes to stdout. Logs, warnings and errors go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use kiln_config::{CONFIG_FILE_NAME, KilnConfig};
use kiln_core::BuildCoordinator;
use kiln_process::SystemRunner;

#[derive(Parser)]
#[command(name = "kiln", version)]
#[command(about = "Compile modules with a single coordinated build and print their output")]
struct Cli {
    /// Source files to resolve
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Project root (compiler runs here; relative config paths resolve here)
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Config file [default: <root>/kiln.toml]
    #[arg(long)]
    config: Option<PathBuf>,
    /// Only report diagnostics; do not print compiled output
    #[arg(long, short)]
    quiet: bool,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    // stdout carries compiled output.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("project root {}", cli.root.display()))?;
    let config_path = cli.config.unwrap_or_else(|| root.join(CONFIG_FILE_NAME));
    let config = single_run(KilnConfig::load(&config_path)?);
    tracing::debug!(
        root = %root.display(),
        config = %config_path.display(),
        "loaded configuration"
    );

    let runner = Arc::new(SystemRunner::with_cwd(&root));
    let coordinator = BuildCoordinator::new(config, &root, runner);
    let ok = run(&coordinator, &cli.files, cli.quiet).await;
    coordinator.shutdown().await;

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// One run never invalidates, so it never rebuilds through the analysis
/// server. Starting one would only delay exit.
fn single_run(mut config: KilnConfig) -> KilnConfig {
    if config.ide.enabled {
        tracing::debug!("analysis server disabled for a single run");
        config.ide.enabled = false;
    }
    config
}

/// Resolve every file concurrently. Returns whether all succeeded and no
/// errors were reported.
async fn run(coordinator: &BuildCoordinator, files: &[PathBuf], quiet: bool) -> bool {
    let tasks: Vec<_> = files
        .iter()
        .map(|file| {
            let coordinator = coordinator.clone();
            let file = file.clone();
            tokio::spawn(async move { resolve_file(&coordinator, &file).await })
        })
        .collect();

    let mut ok = true;
    for (file, task) in files.iter().zip(tasks) {
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(anyhow::Error::new(e).context("resolve task failed")),
        };
        match result {
            Ok(output) => {
                if !quiet {
                    println!("// {}", file.display());
                    println!("{output}");
                }
            }
            Err(e) => {
                ok = false;
                eprintln!("{}: {e:#}", file.display());
            }
        }
    }

    let messages = coordinator.take_messages().await;
    for warning in &messages.warnings {
        eprintln!("{warning}");
    }
    for error in &messages.errors {
        eprintln!("{error}");
    }
    ok && messages.errors.is_empty()
}

async fn resolve_file(coordinator: &BuildCoordinator, file: &Path) -> Result<String> {
    let path = tokio::fs::canonicalize(file)
        .await
        .with_context(|| format!("resolving {}", file.display()))?;
    let source = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(coordinator.resolve(&path, &source).await?)
}
