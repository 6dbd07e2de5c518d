//! Full-compile invocation.

use std::path::Path;

use kiln_config::KilnConfig;
use kiln_process::{ProcessError, ProcessOutput, ProcessRunner};

/// `<args…> <src globs…> --ffi <glob>… --output <dir>`.
#[must_use]
pub fn compile_args(config: &KilnConfig, output_dir: &Path) -> Vec<String> {
    let ffi = config.ffi_globs();
    let capacity = config.compiler.args.len() + config.src.len() + ffi.len() * 2 + 2;
    let mut args = Vec::with_capacity(capacity);
    args.extend(config.compiler.args.iter().cloned());
    args.extend(config.src.iter().cloned());
    for glob in ffi {
        args.push("--ffi".to_string());
        args.push(glob);
    }
    args.push("--output".to_string());
    args.push(output_dir.to_string_lossy().into_owned());
    args
}

/// Run the compiler to completion. A non-zero exit is reported through the
/// returned output, not as an error.
pub async fn run_compiler(
    runner: &dyn ProcessRunner,
    config: &KilnConfig,
    output_dir: &Path,
) -> Result<ProcessOutput, ProcessError> {
    let args = compile_args(config, output_dir);
    tracing::info!(command = %config.compiler.command, "compiling");
    let output = runner.run(&config.compiler.command, &args).await?;
    tracing::info!(exit_code = ?output.exit_code, "compile finished");
    Ok(output)
}
