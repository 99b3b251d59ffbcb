//! CLI command implementations for function-host.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Process probe and offline endpoint run
//! - `config`: Configuration file generation

pub mod check;
pub mod config;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
