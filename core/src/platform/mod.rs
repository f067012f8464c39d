//! Platform strategies for locating the language server.
//!
//! Each variant knows how to build the OS commands that list processes and
//! listening ports, and how to parse what those commands print. Parsing is
//! kept in pure functions fed by captured output so it can be tested on any
//! host.
//!
//! # Platform Support
//! - Windows: PowerShell `Get-CimInstance` (JSON) and `netstat -ano`
//! - macOS: `ps` and `lsof`
//! - Linux: `ps` and the first of `lsof`, `ss`, `netstat` found on the system

mod unix;
mod utils;
mod windows;

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::ProcessCandidate;
use crate::error::{Error, Result};
use crate::ports::{CommandRunner, ShellCommand};
use crate::protocol::PRODUCT_NAME;

pub use unix::{PortTool, UnixFlavor, UnixStrategy};
pub use windows::WindowsStrategy;

/// Command-line flag carrying the extension server port.
pub const PORT_FLAG: &str = "--extension_server_port";

/// Command-line flag carrying the CSRF token.
pub const TOKEN_FLAG: &str = "--csrf_token";

/// Command-line flag naming the application data directory.
pub const APP_DIR_FLAG: &str = "--app_data_dir";

/// Operator-facing messages for discovery failures on one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformErrorMessages {
    pub process_not_found: &'static str,
    pub command_not_available: &'static str,
    pub requirements: &'static [&'static str],
}

/// The platform strategy, selected once at startup.
#[derive(Debug)]
pub enum PlatformStrategy {
    Windows(WindowsStrategy),
    Unix(UnixStrategy),
}

impl PlatformStrategy {
    /// Select the strategy for the running OS and architecture.
    pub fn detect() -> Result<Self> {
        Self::for_target(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Select the strategy for an explicit OS/architecture pair.
    pub fn for_target(os: &str, arch: &str) -> Result<Self> {
        let arm = matches!(arch, "aarch64" | "arm");
        match os {
            "windows" => Ok(PlatformStrategy::Windows(WindowsStrategy::new())),
            "macos" => Ok(PlatformStrategy::Unix(UnixStrategy::new(UnixFlavor::Darwin, arm))),
            "linux" => Ok(PlatformStrategy::Unix(UnixStrategy::new(UnixFlavor::Linux, arm))),
            other => Err(Error::UnsupportedPlatform(format!("{} ({})", other, arch))),
        }
    }

    /// Name of the language server executable on this platform.
    pub fn process_name(&self) -> &str {
        match self {
            PlatformStrategy::Windows(s) => s.process_name(),
            PlatformStrategy::Unix(s) => s.process_name(),
        }
    }

    pub fn build_process_list_command(&self) -> ShellCommand {
        match self {
            PlatformStrategy::Windows(s) => s.build_process_list_command(),
            PlatformStrategy::Unix(s) => s.build_process_list_command(),
        }
    }

    /// Broader query filtered only by the token flag. Windows only.
    pub fn build_keyword_scan_command(&self) -> Option<ShellCommand> {
        match self {
            PlatformStrategy::Windows(s) => Some(s.build_keyword_scan_command()),
            PlatformStrategy::Unix(_) => None,
        }
    }

    /// Parse process-list output into verified-looking candidates.
    pub fn parse_process_info(&self, output: &str) -> Result<Vec<ProcessCandidate>> {
        match self {
            PlatformStrategy::Windows(s) => s.parse_process_info(output),
            PlatformStrategy::Unix(s) => Ok(s.parse_process_info(output, std::process::id())),
        }
    }

    /// Make sure the port listing tool is known before building port commands.
    pub async fn ensure_port_command_available<R: CommandRunner>(&self, runner: &R) {
        if let PlatformStrategy::Unix(s) = self {
            s.ensure_port_tool(runner).await;
        }
    }

    pub fn build_port_list_command(&self, pid: u32) -> ShellCommand {
        match self {
            PlatformStrategy::Windows(s) => s.build_port_list_command(),
            PlatformStrategy::Unix(s) => s.build_port_list_command(pid),
        }
    }

    /// Ports `pid` listens on, de-duplicated and ascending.
    pub fn parse_listening_ports(&self, output: &str, pid: u32) -> Vec<u16> {
        match self {
            PlatformStrategy::Windows(s) => s.parse_listening_ports(output, pid),
            PlatformStrategy::Unix(s) => s.parse_listening_ports(output, pid),
        }
    }

    pub fn build_diagnostic_command(&self) -> ShellCommand {
        match self {
            PlatformStrategy::Windows(s) => s.build_diagnostic_command(),
            PlatformStrategy::Unix(s) => s.build_diagnostic_command(),
        }
    }

    /// Reduce diagnostic output to the relevant lines, tokens redacted.
    pub fn summarize_diagnostics(&self, output: &str) -> String {
        let relevant = match self {
            PlatformStrategy::Windows(_) => output.trim().to_string(),
            PlatformStrategy::Unix(s) => s.filter_diagnostic_lines(output),
        };
        redact_tokens(&relevant)
    }

    pub fn error_messages(&self) -> PlatformErrorMessages {
        match self {
            PlatformStrategy::Windows(s) => s.error_messages(),
            PlatformStrategy::Unix(s) => s.error_messages(),
        }
    }

    /// Whether the first command timeout gets a free retry.
    ///
    /// Only PowerShell is slow enough on a cold start to need one.
    pub fn grants_cold_start_grace(&self) -> bool {
        matches!(self, PlatformStrategy::Windows(_))
    }
}

// ============================================================================
// Command-line markers
// ============================================================================

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"--csrf_token(?:=|\s+)["']?([^\s"']+)"#).expect("valid regex"))
}

fn port_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"--extension_server_port(?:=|\s+)["']?(\d+)"#).expect("valid regex")
    })
}

fn app_dir_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r#"(?i){}(?:=|\s+)["']?{}\b"#,
            APP_DIR_FLAG, PRODUCT_NAME
        ))
        .expect("valid regex")
    })
}

/// True iff the port flag, the token flag and the product app-dir flag are all present.
///
/// Requiring all three rejects unrelated processes that share one marker.
pub fn is_target_process(cmdline: &str) -> bool {
    cmdline.contains(PORT_FLAG) && cmdline.contains(TOKEN_FLAG) && app_dir_regex().is_match(cmdline)
}

/// Value of the token flag, if present.
pub fn extract_csrf_token(cmdline: &str) -> Option<String> {
    token_regex()
        .captures(cmdline)
        .map(|caps| caps[1].to_string())
}

/// Value of the port flag, if present and a valid port.
pub fn extract_extension_port(cmdline: &str) -> Option<u16> {
    port_regex()
        .captures(cmdline)
        .and_then(|caps| caps[1].parse().ok())
}

/// Build a candidate from a command line that passes every marker check.
pub(crate) fn candidate_from_cmdline(pid: u32, cmdline: &str) -> Option<ProcessCandidate> {
    let csrf_token = extract_csrf_token(cmdline)?;
    if !is_target_process(cmdline) {
        return None;
    }
    Some(ProcessCandidate {
        pid,
        extension_port: extract_extension_port(cmdline),
        csrf_token,
    })
}

/// Replace every token value with a placeholder.
pub fn redact_tokens(text: &str) -> String {
    token_regex()
        .replace_all(text, "--csrf_token [REDACTED]")
        .into_owned()
}

/// An actionable hint for a failed process-list command, if the error is recognised.
pub fn failure_hint(error_text: &str) -> Option<&'static str> {
    let text = error_text.to_lowercase();
    if text.contains("execution policy") || text.contains("executionpolicy") {
        Some("PowerShell execution policy blocks the process query")
    } else if text.contains("access is denied")
        || text.contains("permission denied")
        || text.contains("operation not permitted")
    {
        Some("insufficient permissions to list processes")
    } else if text.contains("not recognized")
        || text.contains("not found")
        || text.contains("no such file")
    {
        Some("a required system command is missing from PATH")
    } else if text.contains("timed out") || text.contains("timeout") {
        Some("the shell may still be starting; this is common right after login")
    } else {
        None
    }
}
