pub mod context;
pub(crate) mod settings;

pub use settings::{Config, GlobalOptions};
