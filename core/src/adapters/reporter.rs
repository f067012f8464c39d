//! Error reporter adapter that writes reports to the log.

use tracing::error;

use crate::ports::{ErrorReport, ErrorReporter};

/// Emits one structured error event per report.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl LogReporter {
    pub fn new() -> Self {
        Self
    }
}

impl ErrorReporter for LogReporter {
    fn report(&self, report: ErrorReport) {
        let diagnostics = report
            .diagnostics
            .as_ref()
            .and_then(|d| serde_json::to_string(d).ok())
            .unwrap_or_default();

        error!(
            report_id = %report.id,
            context = report.context,
            category = ?report.category,
            port = ?report.port,
            diagnostics = %diagnostics,
            "{}",
            report.message
        );
    }
}
