//! Subcommand implementations.

pub mod config;
pub mod group;
pub mod scan;
pub mod status;
pub mod watch;

mod render;
