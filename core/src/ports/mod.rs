//! Ports layer - Trait definitions (interfaces).
//!
//! This module defines the interfaces the discovery and telemetry services
//! use to interact with external systems. Implementations live in `adapters`.

mod command;
mod reporter;
mod transport;

pub use command::{CommandRunner, ShellCommand};
pub use reporter::{ErrorReport, ErrorReporter};
pub use transport::{Transport, TransportRequest, TransportResponse};
