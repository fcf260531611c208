#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod descriptor;
pub mod environment;
pub mod naming;
pub mod os;
pub mod path;
pub mod version;

pub use descriptor::VirtualenvDescriptor;
pub use environment::{
    EnvironmentDelta, EnvironmentSnapshot, IGNORED_VARIABLES, PATH_ADDITION_KEY, PATH_VARIABLE,
};
pub use naming::{
    interpreter_path, relative_directory_for, workspace_virtualenv_path, VIRTUALENV_DIR_PREFIX,
};
pub use os::{OsConventions, OsFamily};
pub use path::{reconcile_path, PathReconcileError};
pub use version::{creation_argv, PythonVersion};
