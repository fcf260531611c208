use venvwrap_domain::PathReconcileError;

/// Failures surfaced by the virtualenv pipeline.
#[derive(Debug, thiserror::Error)]
pub enum VenvError {
    #[error("[VW100] no virtualenv strategy accepted `{identifier}`")]
    Resolution { identifier: String },
    #[error("[VW200] error while creating virtualenv at {target} with {interpreter} (exit code {code}): {output}")]
    Creation {
        interpreter: String,
        target: String,
        code: i32,
        output: String,
    },
    #[error("[VW201] failed to launch `{program}`: {message}")]
    Launch { program: String, message: String },
    #[error("[VW300] capturing the environment with `{script}` failed: {reason}{}", format_output(.output))]
    DiffCapture {
        script: String,
        reason: String,
        output: String,
    },
    #[error("[VW400] {0}")]
    MalformedPath(#[from] PathReconcileError),
    #[error("[VW500] virtualenv preparation was cancelled")]
    Cancelled,
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

fn format_output(output: &str) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!("\n{output}")
    }
}

impl VenvError {
    /// Stable code also printed at the head of the message.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "VW100",
            Self::Creation { .. } => "VW200",
            Self::Launch { .. } => "VW201",
            Self::DiffCapture { .. } => "VW300",
            Self::MalformedPath(_) => "VW400",
            Self::Cancelled => "VW500",
            Self::Collaborator(_) => "VW900",
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Output captured from the external process behind this failure, if any.
    #[must_use]
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            Self::Creation { output, .. } | Self::DiffCapture { output, .. } => Some(output.as_str()),
            _ => None,
        }
    }

    pub(crate) fn diff_capture(
        script: &str,
        reason: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::DiffCapture {
            script: script.to_string(),
            reason: reason.into(),
            output: output.into(),
        }
    }
}
