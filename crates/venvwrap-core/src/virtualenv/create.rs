use tracing::{debug, info, warn};
use venvwrap_domain::{creation_argv, PythonVersion, VirtualenvDescriptor};

use crate::context::ExecutionContext;
use crate::error::VenvError;
use crate::process::RunOutput;

/// Creates the virtualenv behind `descriptor` unless it already exists or is
/// not ours to create. Returns whether a virtualenv was created.
///
/// # Errors
/// Returns [`VenvError::Creation`] with the captured output when the creation
/// command exits non-zero, [`VenvError::Launch`] when it cannot start, and
/// [`VenvError::Cancelled`] when cancellation was requested beforehand.
pub fn create_if_missing(
    descriptor: &VirtualenvDescriptor,
    ctx: &ExecutionContext,
) -> Result<bool, VenvError> {
    let target = descriptor.virtualenv_path();
    let Some(interpreter) = descriptor
        .interpreter_path()
        .filter(|_| descriptor.creatable())
    else {
        debug!(%target, "virtualenv is externally managed; not creating");
        return Ok(false);
    };
    if ctx.fs().exists(ctx.workspace_root(), &target) {
        debug!(%target, "virtualenv already exists");
        return Ok(false);
    }
    if ctx.is_cancelled() {
        return Err(VenvError::Cancelled);
    }

    let version = probe_version(&interpreter, ctx)?;
    let argv = creation_argv(&interpreter, &target, version);
    ctx.notify(&format!(
        "Creating virtualenv at {target} using Python installation found at {interpreter}"
    ));
    let output = run(&argv, ctx)?;
    if output.code != 0 {
        let captured = output.text();
        let message = format!("Error while creating virtualenv: {captured}");
        warn!("{message}");
        ctx.notify(&message);
        return Err(VenvError::Creation {
            interpreter,
            target,
            code: output.code,
            output: captured,
        });
    }
    debug!(output = %output.text(), "virtualenv creation output");
    info!(%target, "created virtualenv");
    Ok(true)
}

fn probe_version(
    interpreter: &str,
    ctx: &ExecutionContext,
) -> Result<Option<PythonVersion>, VenvError> {
    let argv = [interpreter.to_string(), "--version".to_string()];
    let output = run(&argv, ctx)?;
    let version = PythonVersion::from_version_output(&output.text());
    match version {
        Some(version) => debug!(%interpreter, %version, "detected interpreter version"),
        None => debug!(%interpreter, code = output.code, "interpreter version not recognised"),
    }
    Ok(version)
}

fn run(argv: &[String], ctx: &ExecutionContext) -> Result<RunOutput, VenvError> {
    ctx.commands()
        .run(argv, ctx.workspace_root())
        .map_err(|err| VenvError::Launch {
            program: argv.first().cloned().unwrap_or_default(),
            message: format!("{err:#}"),
        })
}
