//! Command handlers shaping core results into [`ExecutionOutcome`]s.

use std::env;
use std::ffi::OsString;

use anyhow::Result;
use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::debug;
use venvwrap_domain::PATH_VARIABLE;

use crate::context::ExecutionContext;
use crate::error::VenvError;
use crate::outcome::ExecutionOutcome;
use crate::process::run_command_passthrough;
use crate::tooling::registry::{FileToolRegistry, ToolInstallation};
use crate::virtualenv::VirtualenvManager;

#[derive(Clone, Debug)]
pub struct VirtualenvRequest {
    pub identifier: String,
}

#[derive(Clone, Debug)]
pub struct RunRequest {
    pub identifier: String,
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ToolAddRequest {
    pub name: String,
    pub home: String,
}

#[derive(Clone, Debug)]
pub struct ToolRemoveRequest {
    pub name: String,
}

/// Prints the activation delta for an identifier.
///
/// # Errors
/// Only unexpected failures escape; virtualenv failures become outcomes.
pub fn virtualenv_env(
    manager: &VirtualenvManager,
    ctx: &ExecutionContext,
    request: &VirtualenvRequest,
) -> Result<ExecutionOutcome> {
    let delta = match manager.environment_for(&request.identifier, ctx) {
        Ok(delta) => delta,
        Err(err) => return Ok(venv_error_outcome(&request.identifier, &err)),
    };
    let message = delta
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(ExecutionOutcome::success(
        message,
        json!({
            "identifier": request.identifier,
            "variables": delta,
            "passthrough": true,
        }),
    ))
}

/// Resolves an identifier and reports the descriptor without creating anything.
///
/// # Errors
/// Only unexpected failures escape; virtualenv failures become outcomes.
pub fn virtualenv_describe(
    manager: &VirtualenvManager,
    ctx: &ExecutionContext,
    request: &VirtualenvRequest,
) -> Result<ExecutionOutcome> {
    let descriptor = match manager.describe(&request.identifier, ctx) {
        Ok(descriptor) => descriptor,
        Err(err) => return Ok(venv_error_outcome(&request.identifier, &err)),
    };
    let path = descriptor.virtualenv_path();
    let exists = ctx.fs().exists(ctx.workspace_root(), &path);
    Ok(ExecutionOutcome::success(
        format!("{} virtualenv at {path}", descriptor.kind()),
        json!({
            "identifier": request.identifier,
            "kind": descriptor.kind(),
            "virtualenv_path": path,
            "interpreter_path": descriptor.interpreter_path(),
            "creatable": descriptor.creatable(),
            "exists": exists,
            "os": ctx.os(),
        }),
    ))
}

/// Runs a program directly (no shell) inside the activated environment and
/// reports its exit code.
///
/// # Errors
/// Returns an error when the program cannot be spawned.
pub fn virtualenv_run(
    manager: &VirtualenvManager,
    ctx: &ExecutionContext,
    request: &RunRequest,
) -> Result<ExecutionOutcome> {
    let delta = match manager.environment_for(&request.identifier, ctx) {
        Ok(delta) => delta,
        Err(err) => return Ok(venv_error_outcome(&request.identifier, &err)),
    };
    let (mut environment, opaque) = inherited_environment();
    delta.apply_to(&mut environment, ctx.os());

    let search_path = environment
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(PATH_VARIABLE))
        .map(|(_, value)| value.clone());
    let Ok(program) = which::which_in(&request.program, search_path, ctx.workspace_root()) else {
        return Ok(ExecutionOutcome::user_error(
            format!("`{}` was not found on the activated PATH", request.program),
            json!({
                "identifier": request.identifier,
                "program": request.program,
                "hint": "install the program into the virtualenv or put it on PATH",
            }),
        ));
    };
    debug!(program = %program.display(), "running inside virtualenv");

    let mut envs: Vec<(OsString, OsString)> = opaque
        .into_iter()
        .filter(|(key, _)| key.to_str().map_or(true, |key| !environment.contains_key(key)))
        .collect();
    envs.extend(
        environment
            .into_iter()
            .map(|(key, value)| (OsString::from(key), OsString::from(value))),
    );
    let code = run_command_passthrough(&program, &request.args, &envs, ctx.workspace_root())?;
    let details = json!({
        "identifier": request.identifier,
        "program": program.display().to_string(),
        "exit_code": code,
        "passthrough": true,
    });
    if code == 0 {
        Ok(ExecutionOutcome::success(String::new(), details))
    } else {
        Ok(ExecutionOutcome::failure(String::new(), details))
    }
}

/// # Errors
/// Returns an error when the registry cannot be read.
pub fn tools_list(registry: &FileToolRegistry) -> Result<ExecutionOutcome> {
    let installations = registry.load()?;
    let message = if installations.is_empty() {
        format!("no tool installations in {}", registry.path().display())
    } else {
        installations
            .iter()
            .map(|tool| format!("{}  {}  ({})", tool.name, tool.home, tool.descriptor))
            .collect::<Vec<_>>()
            .join("\n")
    };
    Ok(ExecutionOutcome::success(
        message,
        json!({
            "registry": registry.path().display().to_string(),
            "installations": installations,
        }),
    ))
}

/// # Errors
/// Returns an error when the registry cannot be read or written.
pub fn tools_add(registry: &FileToolRegistry, request: &ToolAddRequest) -> Result<ExecutionOutcome> {
    if request.name.trim().is_empty() {
        return Ok(ExecutionOutcome::user_error(
            "tool installation name must not be empty",
            Value::Null,
        ));
    }
    let installation = ToolInstallation::python(request.name.trim(), request.home.as_str());
    registry.add(installation.clone())?;
    Ok(ExecutionOutcome::success(
        format!("registered {} at {}", installation.name, installation.home),
        json!({ "installation": installation }),
    ))
}

/// # Errors
/// Returns an error when the registry cannot be read or written.
pub fn tools_remove(
    registry: &FileToolRegistry,
    request: &ToolRemoveRequest,
) -> Result<ExecutionOutcome> {
    if registry.remove(&request.name)? {
        Ok(ExecutionOutcome::success(
            format!("removed {}", request.name),
            json!({ "name": request.name }),
        ))
    } else {
        Ok(ExecutionOutcome::user_error(
            format!("no tool installation named {}", request.name),
            json!({
                "name": request.name,
                "hint": "run `venvwrap tools list` to see registered installations",
            }),
        ))
    }
}

/// Splits the inherited environment into variables the delta can be merged
/// into and the rest, which is handed to the program untouched.
fn inherited_environment() -> (IndexMap<String, String>, Vec<(OsString, OsString)>) {
    let mut environment = IndexMap::new();
    let mut opaque = Vec::new();
    for (key, value) in env::vars_os() {
        match (key.to_str(), value.to_str()) {
            (Some(name), Some(text)) => {
                environment.insert(name.to_string(), text.to_string());
            }
            _ => {
                debug!(variable = %key.to_string_lossy(), "passing non-UTF-8 variable through unchanged");
                opaque.push((key, value));
            }
        }
    }
    (environment, opaque)
}

fn venv_error_outcome(identifier: &str, err: &VenvError) -> ExecutionOutcome {
    if err.is_cancelled() {
        return ExecutionOutcome::cancelled(err.to_string());
    }
    ExecutionOutcome::failure(
        err.to_string(),
        json!({
            "identifier": identifier,
            "code": err.code(),
            "output": err.captured_output(),
        }),
    )
}
