//! Process execution and the collaborator seam the virtualenv logic runs against.

pub mod effects;
pub mod process;
