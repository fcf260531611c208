use std::fmt;

use crate::naming::{interpreter_path, workspace_virtualenv_path};
use crate::os::OsFamily;

/// One resolved virtualenv.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VirtualenvDescriptor {
    /// A complete virtualenv owned by someone else; never created or modified.
    Managed { path: String },
    /// Backed by a registered tool installation whose home yields the
    /// interpreter.
    ToolProvided {
        identifier: String,
        home: String,
        workspace: String,
        os: OsFamily,
    },
    /// Fallback: lives in the workspace, interpreter derived from the
    /// identifier itself.
    WorkspaceRelative {
        identifier: String,
        workspace: String,
        os: OsFamily,
    },
}

impl VirtualenvDescriptor {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Managed { .. } => "managed",
            Self::ToolProvided { .. } => "tool",
            Self::WorkspaceRelative { .. } => "workspace",
        }
    }

    #[must_use]
    pub fn virtualenv_path(&self) -> String {
        match self {
            Self::Managed { path } => path.clone(),
            Self::ToolProvided {
                identifier,
                workspace,
                os,
                ..
            }
            | Self::WorkspaceRelative {
                identifier,
                workspace,
                os,
            } => workspace_virtualenv_path(workspace, identifier, *os),
        }
    }

    /// Interpreter a creatable virtualenv is built from. Managed virtualenvs
    /// have none.
    #[must_use]
    pub fn interpreter_path(&self) -> Option<String> {
        match self {
            Self::Managed { .. } => None,
            Self::ToolProvided {
                identifier,
                home,
                os,
                ..
            } => Some(interpreter_path(identifier, Some(home), *os)),
            Self::WorkspaceRelative { identifier, os, .. } => {
                Some(interpreter_path(identifier, None, *os))
            }
        }
    }

    #[must_use]
    pub fn creatable(&self) -> bool {
        !matches!(self, Self::Managed { .. })
    }
}

impl fmt::Display for VirtualenvDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.interpreter_path() {
            Some(interpreter) => write!(f, "{} {interpreter}", self.virtualenv_path()),
            None => f.write_str(&self.virtualenv_path()),
        }
    }
}
