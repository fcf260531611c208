use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use venvwrap_domain::OsFamily;

use crate::config::Config;
use crate::effects::{self, Effects, SharedEffects};

/// User-facing log of one invocation, separate from diagnostic tracing.
pub trait LogSink: Send + Sync {
    fn line(&self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn line(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// Raised by the caller to abandon an invocation.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything one resolve/ensure/diff invocation may touch.
pub struct ExecutionContext {
    os: OsFamily,
    workspace: String,
    effects: SharedEffects,
    sink: Arc<dyn LogSink>,
    cancellation: CancellationFlag,
    poll_interval: Duration,
}

impl ExecutionContext {
    pub fn new(os: OsFamily, workspace: impl Into<String>, effects: SharedEffects) -> Self {
        Self {
            os,
            workspace: workspace.into(),
            effects,
            sink: Arc::new(StderrSink),
            cancellation: CancellationFlag::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn from_config(config: &Config, effects: SharedEffects) -> Self {
        Self::new(config.os(), config.workspace(), effects).with_poll_interval(config.poll_interval())
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn os(&self) -> OsFamily {
        self.os
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    pub fn workspace_root(&self) -> &Path {
        Path::new(&self.workspace)
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }

    pub fn commands(&self) -> &dyn effects::CommandRunner {
        self.effects.commands()
    }

    pub fn tools(&self) -> &dyn effects::ToolRegistry {
        self.effects.tools()
    }

    pub fn fs(&self) -> &dyn effects::FileSystem {
        self.effects.fs()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Writes `message` to the user-facing sink and to the trace log.
    pub fn notify(&self, message: &str) {
        info!("{message}");
        self.sink.line(message);
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("os", &self.os)
            .field("workspace", &self.workspace)
            .field("poll_interval", &self.poll_interval)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
