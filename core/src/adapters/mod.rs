//! Adapters layer - External system implementations.
//!
//! This module contains implementations of the port traits defined in `ports`.
//! Each adapter handles communication with external systems.

mod command;
mod reporter;
mod transport;

// Re-export main types for convenience
pub use command::TokioCommandRunner;
pub use reporter::LogReporter;
pub use transport::HttpsTransport;
