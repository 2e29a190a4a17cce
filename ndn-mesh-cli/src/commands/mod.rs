//! Subcommand implementations

pub mod command;
pub mod config;
pub mod decode;
pub mod probe;
pub mod simulate;
