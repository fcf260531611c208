pub mod outcome;
pub mod registry;
