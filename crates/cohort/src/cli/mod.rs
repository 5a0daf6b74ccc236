//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the cohort binary.

mod commands;
mod count;
mod get;
mod probe;

pub use commands::{Cli, Commands};
pub use count::count_resources;
pub use get::fetch;
pub use probe::probe_server;
