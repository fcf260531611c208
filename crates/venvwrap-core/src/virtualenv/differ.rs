use std::thread;

use tracing::debug;
use venvwrap_domain::{EnvironmentDelta, EnvironmentSnapshot, VirtualenvDescriptor};

use crate::context::ExecutionContext;
use crate::error::VenvError;

/// Computes the variables activating a virtualenv changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentDiffer;

impl EnvironmentDiffer {
    /// Dumps the environment without activation, then with it, and diffs the
    /// two. The baseline always completes before the activation run starts.
    ///
    /// # Errors
    /// [`VenvError::DiffCapture`] when a dump fails, [`VenvError::MalformedPath`]
    /// when activation did more than prepend to `PATH`, and
    /// [`VenvError::Cancelled`] when cancellation is observed while waiting.
    pub fn diff(
        &self,
        descriptor: &VirtualenvDescriptor,
        ctx: &ExecutionContext,
    ) -> Result<EnvironmentDelta, VenvError> {
        let os = ctx.os();
        let before = capture(os.baseline_script(), ctx)?;
        let activation = os.activation_script(&descriptor.virtualenv_path());
        let after = capture(&activation, ctx)?;
        let delta = EnvironmentDelta::between(&before, &after, os)?;
        debug!(
            before = before.len(),
            after = after.len(),
            changed = delta.len(),
            "computed activation delta"
        );
        Ok(delta)
    }
}

fn capture(script: &str, ctx: &ExecutionContext) -> Result<EnvironmentSnapshot, VenvError> {
    let output = run_to_completion(script, ctx)?;
    Ok(EnvironmentSnapshot::parse(&output))
}

// The runner only exposes polling, so wait in bounded steps and check for
// cancellation between them.
fn run_to_completion(script: &str, ctx: &ExecutionContext) -> Result<String, VenvError> {
    if ctx.is_cancelled() {
        return Err(VenvError::Cancelled);
    }
    let mut controller = ctx
        .commands()
        .run_capturing(script, ctx.workspace_root(), &[])
        .map_err(|err| VenvError::diff_capture(script, format!("failed to start: {err:#}"), ""))?;

    let code = loop {
        if ctx.is_cancelled() {
            if let Err(err) = controller.stop() {
                debug!("stopping cancelled script failed: {err:#}");
            }
            return Err(VenvError::Cancelled);
        }
        match controller.exit_status() {
            Ok(Some(code)) => break code,
            Ok(None) => thread::sleep(ctx.poll_interval()),
            Err(err) => {
                return Err(VenvError::diff_capture(
                    script,
                    format!("lost track of the script: {err:#}"),
                    "",
                ))
            }
        }
    };

    let bytes = controller
        .output()
        .map_err(|err| VenvError::diff_capture(script, format!("{err:#}"), ""))?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            let lossy = String::from_utf8_lossy(err.as_bytes()).to_string();
            return Err(VenvError::diff_capture(
                script,
                "output is not valid UTF-8",
                lossy,
            ));
        }
    };
    if code != 0 {
        return Err(VenvError::diff_capture(
            script,
            format!("exited with code {code}"),
            text,
        ));
    }
    Ok(text)
}
