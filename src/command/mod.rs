//! Command execution engine

mod definitions;
mod executor;
mod handlers;

pub use definitions::command_definitions;
pub use executor::{CancelPolicy, CommandExecutor};
