//! Domain layer - Pure data models.
//!
//! These types have no I/O dependencies and can be tested in isolation.

mod discovery;
mod grouping;
mod quota;

// Re-export all domain types
pub use discovery::{EnvironmentScanResult, ProcessCandidate, ScanDiagnostics, ScanMethod};
pub use grouping::{GroupingConfig, MappingCorrection};
pub use quota::{
    format_delta, group_id_for, ModelQuotaInfo, PromptCredits, QuotaFingerprint, QuotaGroup,
    QuotaSnapshot, UserInfo, ALREADY_RESET,
};
