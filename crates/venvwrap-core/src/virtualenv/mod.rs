//! Resolving identifiers to virtualenvs, creating them, and capturing what
//! activation changes.

pub mod create;
pub mod differ;
pub mod manager;
pub mod resolver;

pub use create::create_if_missing;
pub use differ::EnvironmentDiffer;
pub use manager::{EnvCache, VirtualenvManager};
pub use resolver::{
    default_chain, ManagedStrategy, Strategy, StrategyChain, ToolInstallationStrategy,
    VirtualenvResolver, WorkspaceStrategy,
};

#[cfg(test)]
mod tests;
