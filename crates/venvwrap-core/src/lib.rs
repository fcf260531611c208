#![deny(clippy::all)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod config;
mod error;
mod runtime;
mod tooling;
mod virtualenv;

pub mod commands;

pub(crate) use crate::config::context;
pub(crate) use crate::runtime::{effects, process};
pub(crate) use crate::tooling::outcome;

pub use crate::config::context::{CancellationFlag, ExecutionContext, LogSink, StderrSink};
pub use crate::config::{Config, GlobalOptions};
pub use crate::error::VenvError;
pub use crate::runtime::effects::{
    CommandRunner, Controller, Effects, FileSystem, SharedEffects, SystemEffects, ToolRegistry,
};
pub use crate::runtime::process::RunOutput;
pub use crate::tooling::outcome::{
    format_status_message, to_json_response, CommandStatus, ExecutionOutcome,
};
pub use crate::tooling::registry::{FileToolRegistry, ToolInstallation, PYTHON_TOOL_DESCRIPTOR};
pub use crate::virtualenv::{
    create_if_missing, default_chain, EnvCache, EnvironmentDiffer, ManagedStrategy, Strategy,
    StrategyChain, ToolInstallationStrategy, VirtualenvManager, VirtualenvResolver,
    WorkspaceStrategy,
};
