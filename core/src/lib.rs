//! GravityWatch Core Library
//!
//! Finds the locally running Antigravity language server and watches its
//! per-model quota telemetry. Provides functionality to:
//! - Discover the server process, its CSRF token and a verified connect port
//! - Poll the status endpoint with cold-start and steady-state retry policies
//! - Decode responses into quota snapshots and group models by shared quota
//! - Persist grouping preferences
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Pure data models
//! - `ports`: Trait definitions (interfaces)
//! - `adapters`: External system implementations
//! - `platform`, `hunter`, `reactor`: discovery and telemetry services
//! - `engine`: composition root
//!
//! # Platform Support
//! - macOS: `ps` and `lsof`
//! - Linux: `ps` and the first of `lsof`, `ss`, `netstat` available
//! - Windows: PowerShell CIM queries and `netstat -ano`

// Hexagonal architecture layers
pub mod adapters;
pub mod domain;
pub mod ports;

pub mod config;
pub mod engine;
pub mod error;
pub mod hunter;
pub mod platform;
pub mod protocol;
pub mod reactor;

// Re-export domain types (primary API)
pub use domain::{
    format_delta, EnvironmentScanResult, GroupingConfig, MappingCorrection, ModelQuotaInfo,
    PromptCredits, QuotaGroup, QuotaSnapshot, ScanDiagnostics, ScanMethod, UserInfo,
};

// Re-export other commonly used types
pub use config::{Config, ConfigStore};
pub use engine::Engine;
pub use error::{Error, ErrorCategory, Result};
pub use hunter::ProcessHunter;
pub use platform::PlatformStrategy;
pub use reactor::{ReactorCore, ReactorState};
