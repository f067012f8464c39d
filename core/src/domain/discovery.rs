//! Process discovery domain models.

use serde::{Deserialize, Serialize};

/// A process whose command line looks like the language server.
///
/// Produced by a single scan attempt and discarded after verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCandidate {
    pub pid: u32,
    /// Value of `--extension_server_port`, if present and numeric.
    pub extension_port: Option<u16>,
    pub csrf_token: String,
}

/// How a scan located its candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ScanMethod {
    /// Filtered by the platform's process name.
    #[default]
    ProcessName,
    /// Filtered only by the presence of the token flag.
    Keyword,
}

impl std::fmt::Display for ScanMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanMethod::ProcessName => write!(f, "process_name"),
            ScanMethod::Keyword => write!(f, "keyword"),
        }
    }
}

/// What the last `scan_environment` call saw, for error reports.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDiagnostics {
    pub scan_method: ScanMethod,
    pub target_process_name: String,
    pub attempt_count: u32,
    pub candidates_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listening_ports: Option<Vec<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_succeeded: Option<bool>,
}

impl ScanDiagnostics {
    pub fn new(target_process_name: impl Into<String>) -> Self {
        Self {
            target_process_name: target_process_name.into(),
            ..Self::default()
        }
    }
}

/// The verified outcome of discovery, handed to `ReactorCore::engage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentScanResult {
    pub extension_port: Option<u16>,
    /// Port that answered the authenticated probe.
    pub connect_port: u16,
    pub csrf_token: String,
}

impl std::fmt::Display for EnvironmentScanResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.extension_port {
            Some(ext) => write!(f, "connect port {} (extension port {})", self.connect_port, ext),
            None => write!(f, "connect port {}", self.connect_port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_skip_unset_fields() {
        let diag = ScanDiagnostics::new("language_server_linux_x64");
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["targetProcessName"], "language_server_linux_x64");
        assert_eq!(json["scanMethod"], "processName");
        assert!(json.get("verifiedPort").is_none());
    }

    #[test]
    fn test_scan_result_display_never_shows_token() {
        let result = EnvironmentScanResult {
            extension_port: Some(51000),
            connect_port: 51002,
            csrf_token: "secret-token".to_string(),
        };
        let text = result.to_string();
        assert_eq!(text, "connect port 51002 (extension port 51000)");
        assert!(!text.contains("secret"));
    }
}
