//! Error reporting port (interface).

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::ScanDiagnostics;
use crate::error::{Error, ErrorCategory};

/// Everything the reporting collaborator receives about one failure.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Where the failure surfaced, e.g. `initial_sync`.
    pub context: &'static str,
    pub message: String,
    #[serde(skip)]
    pub category: ErrorCategory,
    pub port: Option<u16>,
    pub diagnostics: Option<ScanDiagnostics>,
}

impl ErrorReport {
    pub fn new(
        context: &'static str,
        error: &Error,
        port: Option<u16>,
        diagnostics: Option<ScanDiagnostics>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            context,
            message: error.to_string(),
            category: error.category(),
            port,
            diagnostics,
        }
    }
}

/// Port for the external error-reporting collaborator.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, report: ErrorReport);
}
