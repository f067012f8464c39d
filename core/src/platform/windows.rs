//! Windows strategy using PowerShell CIM queries and `netstat -ano`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::domain::ProcessCandidate;
use crate::error::{Error, Result};
use crate::ports::ShellCommand;

use super::utils::normalize_ports;
use super::{candidate_from_cmdline, PlatformErrorMessages};

/// Forces UTF-8 output so non-ASCII paths survive the pipe.
const UTF8_PREAMBLE: &str = "[Console]::OutputEncoding = [System.Text.Encoding]::UTF8; ";

/// Windows process and port discovery.
#[derive(Debug, Default)]
pub struct WindowsStrategy;

impl WindowsStrategy {
    pub fn new() -> Self {
        Self
    }

    pub fn process_name(&self) -> &str {
        "language_server_windows_x64.exe"
    }

    fn powershell(script: String) -> ShellCommand {
        ShellCommand::new("powershell").args([
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            format!("{}{}", UTF8_PREAMBLE, script),
        ])
    }

    /// Executes a CIM query filtered by executable name, as compact JSON.
    pub fn build_process_list_command(&self) -> ShellCommand {
        Self::powershell(format!(
            "Get-CimInstance Win32_Process -Filter \"Name='{}'\" | \
             Select-Object ProcessId,CommandLine | ConvertTo-Json -Compress",
            self.process_name()
        ))
    }

    /// Executes a CIM query over every process whose command line carries a token.
    pub fn build_keyword_scan_command(&self) -> ShellCommand {
        Self::powershell(
            "Get-CimInstance Win32_Process | \
             Where-Object { $_.CommandLine -match 'csrf_token' } | \
             Select-Object ProcessId,CommandLine | ConvertTo-Json -Compress"
                .to_string(),
        )
    }

    /// Parse the CIM JSON output.
    ///
    /// PowerShell prints a bare object for one match and nothing at all for
    /// none, and may prefix the JSON with encoding noise.
    pub fn parse_process_info(&self, output: &str) -> Result<Vec<ProcessCandidate>> {
        let Some(json) = strip_leading_noise(output) else {
            return Ok(Vec::new());
        };

        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::ParseError(format!("process list is not valid JSON: {}", e)))?;

        let entries = match value {
            Value::Array(items) => items,
            object @ Value::Object(_) => vec![object],
            _ => Vec::new(),
        };

        let candidates: Vec<ProcessCandidate> = entries
            .iter()
            .filter_map(|entry| {
                let pid = entry.get("ProcessId")?.as_u64()?;
                let cmdline = entry.get("CommandLine")?.as_str()?;
                candidate_from_cmdline(u32::try_from(pid).ok()?, cmdline)
            })
            .collect();

        debug!(entries = entries.len(), candidates = candidates.len(), "Parsed CIM output");
        Ok(candidates)
    }

    /// Executes: `netstat -ano`
    pub fn build_port_list_command(&self) -> ShellCommand {
        ShellCommand::new("netstat").arg("-ano")
    }

    /// Parse `netstat -ano` rows in LISTENING state owned by `pid`.
    ///
    /// ```text
    ///   Proto  Local Address          Foreign Address        State           PID
    ///   TCP    127.0.0.1:42100        0.0.0.0:0              LISTENING       41234
    /// ```
    pub fn parse_listening_ports(&self, output: &str, pid: u32) -> Vec<u16> {
        let ports = netstat_regex()
            .captures_iter(output)
            .filter(|caps| caps[2].parse::<u32>().ok() == Some(pid))
            .filter_map(|caps| caps[1].parse::<u16>().ok())
            .collect();
        normalize_ports(ports)
    }

    pub fn build_diagnostic_command(&self) -> ShellCommand {
        Self::powershell(
            "Get-CimInstance Win32_Process | \
             Where-Object { $_.Name -match 'language_server|antigravity' } | \
             Select-Object ProcessId,Name,CommandLine | Format-List"
                .to_string(),
        )
    }

    pub fn error_messages(&self) -> PlatformErrorMessages {
        PlatformErrorMessages {
            process_not_found: "Antigravity language server not found. Make sure Antigravity is running.",
            command_not_available: "PowerShell is not available or blocked by execution policy.",
            requirements: &["powershell", "netstat"],
        }
    }
}

fn netstat_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^\s*TCP\s+(?:127\.0\.0\.1|0\.0\.0\.0|\[::1?\]):(\d+)\s+\S+\s+LISTENING\s+(\d+)\s*$",
        )
        .expect("valid regex")
    })
}

/// Slice from the first `[` or `{`, or `None` when there is no JSON at all.
fn strip_leading_noise(output: &str) -> Option<&str> {
    let start = output.find(['[', '{'])?;
    let json = output[start..].trim();
    (!json.is_empty()).then_some(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CMDLINE_A: &str = r"c:\\Users\\dev\\AppData\\Local\\Programs\\Antigravity\\resources\\bin\\language_server_windows_x64.exe --extension_server_port 50101 --csrf_token 9e1f-aa02 --app_data_dir antigravity";

    fn array_fixture() -> String {
        format!(
            r#"[{{"ProcessId":7124,"CommandLine":"{}"}},{{"ProcessId":88,"CommandLine":null}},{{"ProcessId":99,"CommandLine":"notepad.exe"}}]"#,
            CMDLINE_A
        )
    }

    #[test]
    fn test_parse_json_array() {
        let strategy = WindowsStrategy::new();
        let candidates = strategy.parse_process_info(&array_fixture()).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].pid, 7124);
        assert_eq!(candidates[0].csrf_token, "9e1f-aa02");
        assert_eq!(candidates[0].extension_port, Some(50101));
    }

    #[test]
    fn test_parse_single_object() {
        let strategy = WindowsStrategy::new();
        let single = format!(r#"{{"ProcessId":7124,"CommandLine":"{}"}}"#, CMDLINE_A);
        let candidates = strategy.parse_process_info(&single).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_parse_tolerates_garbage_prefix() {
        let strategy = WindowsStrategy::new();
        let mut bytes = vec![0xEF, 0xBB, 0xBF, 0xFF, 0xFE, b'#', b' '];
        bytes.extend_from_slice(array_fixture().as_bytes());
        let noisy = String::from_utf8_lossy(&bytes);

        let candidates = strategy.parse_process_info(&noisy).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].pid, 7124);
    }

    #[test]
    fn test_parse_empty_and_broken_output() {
        let strategy = WindowsStrategy::new();
        assert!(strategy.parse_process_info("").unwrap().is_empty());
        assert!(strategy.parse_process_info("  \r\n").unwrap().is_empty());
        assert!(matches!(
            strategy.parse_process_info("[{\"ProcessId\":"),
            Err(Error::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_netstat_ano() {
        let output = "\r\nActive Connections\r\n\r\n  Proto  Local Address          Foreign Address        State           PID\r\n  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1000\r\n  TCP    127.0.0.1:50103        0.0.0.0:0              LISTENING       7124\r\n  TCP    127.0.0.1:50101        0.0.0.0:0              LISTENING       7124\r\n  TCP    127.0.0.1:50101        127.0.0.1:61000        ESTABLISHED     7124\r\n  TCP    [::1]:50103            [::]:0                 LISTENING       7124\r\n  TCP    192.168.1.4:50200      0.0.0.0:0              LISTENING       7124\r\n  UDP    0.0.0.0:5353           *:*                                    7124\r\n";
        let strategy = WindowsStrategy::new();
        assert_eq!(strategy.parse_listening_ports(output, 7124), vec![50101, 50103]);
        assert_eq!(strategy.parse_listening_ports(output, 1000), vec![135]);
        assert!(strategy.parse_listening_ports(output, 42).is_empty());
    }

    #[test]
    fn test_keyword_command_filters_by_token_only() {
        let command = WindowsStrategy::new().build_keyword_scan_command();
        let script = command.args.last().unwrap();
        assert!(script.contains("csrf_token"));
        assert!(!script.contains("language_server_windows_x64.exe"));
    }
}
