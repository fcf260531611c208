use std::fmt;
use std::sync::Arc;

use tracing::debug;
use venvwrap_domain::VirtualenvDescriptor;

use crate::context::ExecutionContext;
use crate::error::VenvError;
use crate::tooling::registry::PYTHON_TOOL_DESCRIPTOR;

/// One way of turning an identifier into a virtualenv.
///
/// `can_handle` may stash what it looked up for the following `build` call;
/// `build` is only ever invoked right after `can_handle` returned `true`.
pub trait Strategy: Send {
    fn name(&self) -> &'static str;
    fn can_handle(&mut self, identifier: &str, ctx: &ExecutionContext) -> Result<bool, VenvError>;
    fn build(&mut self, identifier: &str, ctx: &ExecutionContext) -> VirtualenvDescriptor;
}

pub type StrategyChain = Vec<Box<dyn Strategy>>;

/// Matches an identifier equal to the name of a registered Python tool.
#[derive(Debug, Default)]
pub struct ToolInstallationStrategy {
    home: Option<String>,
}

impl Strategy for ToolInstallationStrategy {
    fn name(&self) -> &'static str {
        "tool-installation"
    }

    fn can_handle(&mut self, identifier: &str, ctx: &ExecutionContext) -> Result<bool, VenvError> {
        for installation in ctx.tools().list_installations(PYTHON_TOOL_DESCRIPTOR)? {
            if installation.name == identifier {
                ctx.notify(&format!(
                    "Matched Python tool installation: {}",
                    installation.name
                ));
                self.home = Some(installation.home);
                return Ok(true);
            }
            debug!(name = %installation.name, "skipping tool installation");
        }
        Ok(false)
    }

    fn build(&mut self, identifier: &str, ctx: &ExecutionContext) -> VirtualenvDescriptor {
        VirtualenvDescriptor::ToolProvided {
            identifier: identifier.to_string(),
            home: self.home.take().unwrap_or_default(),
            workspace: ctx.workspace().to_string(),
            os: ctx.os(),
        }
    }
}

/// Matches a directory path holding a complete virtualenv that must be left
/// untouched.
#[derive(Debug, Default)]
pub struct ManagedStrategy;

impl Strategy for ManagedStrategy {
    fn name(&self) -> &'static str {
        "managed"
    }

    fn can_handle(&mut self, identifier: &str, ctx: &ExecutionContext) -> Result<bool, VenvError> {
        let conventions = ctx.os().conventions();
        if !identifier.ends_with(conventions.path_separator) {
            return Ok(false);
        }
        Ok(conventions.managed_markers.iter().all(|marker| {
            let present = ctx
                .fs()
                .exists(ctx.workspace_root(), &format!("{identifier}{marker}"));
            if !present {
                debug!(%identifier, %marker, "managed virtualenv marker missing");
            }
            present
        }))
    }

    fn build(&mut self, identifier: &str, _ctx: &ExecutionContext) -> VirtualenvDescriptor {
        VirtualenvDescriptor::Managed {
            path: identifier.to_string(),
        }
    }
}

/// Unconditional fallback: a virtualenv inside the workspace.
#[derive(Debug, Default)]
pub struct WorkspaceStrategy;

impl Strategy for WorkspaceStrategy {
    fn name(&self) -> &'static str {
        "workspace"
    }

    fn can_handle(&mut self, _identifier: &str, _ctx: &ExecutionContext) -> Result<bool, VenvError> {
        Ok(true)
    }

    fn build(&mut self, identifier: &str, ctx: &ExecutionContext) -> VirtualenvDescriptor {
        VirtualenvDescriptor::WorkspaceRelative {
            identifier: identifier.to_string(),
            workspace: ctx.workspace().to_string(),
            os: ctx.os(),
        }
    }
}

/// Tool installations first, then managed directories, then the workspace.
#[must_use]
pub fn default_chain() -> StrategyChain {
    vec![
        Box::new(ToolInstallationStrategy::default()),
        Box::new(ManagedStrategy),
        Box::new(WorkspaceStrategy),
    ]
}

type ChainFactory = dyn Fn() -> StrategyChain + Send + Sync;

/// Walks a freshly built strategy chain for every identifier, so state stashed
/// by one `can_handle` never leaks into another resolution.
#[derive(Clone)]
pub struct VirtualenvResolver {
    chain: Arc<ChainFactory>,
}

impl Default for VirtualenvResolver {
    fn default() -> Self {
        Self::with_chain(default_chain)
    }
}

impl fmt::Debug for VirtualenvResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = (self.chain)().iter().map(|s| s.name()).collect();
        f.debug_struct("VirtualenvResolver")
            .field("chain", &names)
            .finish()
    }
}

impl VirtualenvResolver {
    pub fn with_chain(chain: impl Fn() -> StrategyChain + Send + Sync + 'static) -> Self {
        Self {
            chain: Arc::new(chain),
        }
    }

    /// Returns the descriptor built by the first strategy that accepts
    /// `identifier`.
    ///
    /// # Errors
    /// Propagates collaborator failures from a strategy check, and returns
    /// [`VenvError::Resolution`] when the chain has no taker.
    pub fn resolve(
        &self,
        identifier: &str,
        ctx: &ExecutionContext,
    ) -> Result<VirtualenvDescriptor, VenvError> {
        for mut strategy in (self.chain)() {
            if strategy.can_handle(identifier, ctx)? {
                let descriptor = strategy.build(identifier, ctx);
                debug!(
                    strategy = strategy.name(),
                    %identifier,
                    path = %descriptor.virtualenv_path(),
                    "resolved virtualenv"
                );
                return Ok(descriptor);
            }
            debug!(strategy = strategy.name(), %identifier, "strategy declined");
        }
        Err(VenvError::Resolution {
            identifier: identifier.to_string(),
        })
    }
}
