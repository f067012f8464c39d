//! Unix strategy (macOS and Linux) using `ps` plus a port listing tool.

use std::sync::OnceLock;

use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::domain::ProcessCandidate;
use crate::ports::{CommandRunner, ShellCommand};
use crate::protocol::{COMMAND_TIMEOUT, PRODUCT_NAME};

use super::utils::{normalize_ports, parse_address};
use super::{candidate_from_cmdline, PlatformErrorMessages};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnixFlavor {
    Darwin,
    Linux,
}

/// Tool used to list a process's listening sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortTool {
    Lsof,
    Ss,
    Netstat,
}

impl PortTool {
    /// Probe order on Linux.
    pub const PRIORITY: [PortTool; 3] = [PortTool::Lsof, PortTool::Ss, PortTool::Netstat];

    pub fn binary(&self) -> &'static str {
        match self {
            PortTool::Lsof => "lsof",
            PortTool::Ss => "ss",
            PortTool::Netstat => "netstat",
        }
    }
}

/// Unix process and port discovery.
#[derive(Debug)]
pub struct UnixStrategy {
    flavor: UnixFlavor,
    process_name: &'static str,
    /// Probed once per process lifetime.
    port_tool: OnceCell<PortTool>,
}

impl UnixStrategy {
    pub fn new(flavor: UnixFlavor, arm: bool) -> Self {
        let process_name = match (flavor, arm) {
            (UnixFlavor::Darwin, true) => "language_server_macos_arm",
            (UnixFlavor::Darwin, false) => "language_server_macos",
            (UnixFlavor::Linux, true) => "language_server_linux_arm",
            (UnixFlavor::Linux, false) => "language_server_linux_x64",
        };
        Self {
            flavor,
            process_name,
            port_tool: OnceCell::new(),
        }
    }

    /// Use a fixed port tool instead of probing.
    pub fn with_port_tool(flavor: UnixFlavor, arm: bool, tool: PortTool) -> Self {
        let strategy = Self::new(flavor, arm);
        // A fresh cell is always empty.
        let _ = strategy.port_tool.set(tool);
        strategy
    }

    pub fn flavor(&self) -> UnixFlavor {
        self.flavor
    }

    pub fn process_name(&self) -> &str {
        self.process_name
    }

    /// Executes: `ps -ww -eo pid,ppid,args`
    ///
    /// `-ww` keeps ps from truncating the command line, which carries the token.
    pub fn build_process_list_command(&self) -> ShellCommand {
        ShellCommand::new("ps").args(["-ww", "-eo", "pid,ppid,args"])
    }

    /// Parse `pid ppid command...` lines.
    ///
    /// Children of `own_pid` are listed first since they are most likely the
    /// server this editor spawned, but every match is returned.
    pub fn parse_process_info(&self, output: &str, own_pid: u32) -> Vec<ProcessCandidate> {
        let mut found: Vec<(bool, ProcessCandidate)> = Vec::new();

        for line in output.lines() {
            let Some((pid_str, rest)) = next_field(line) else {
                continue;
            };
            // Header line and garbage fail here
            let Ok(pid) = pid_str.parse::<u32>() else {
                continue;
            };
            let Some((ppid_str, args)) = next_field(rest) else {
                continue;
            };
            let Ok(ppid) = ppid_str.parse::<u32>() else {
                continue;
            };

            let args = args.trim();
            if !args.contains(self.process_name) {
                continue;
            }

            if let Some(candidate) = candidate_from_cmdline(pid, args) {
                found.push((ppid == own_pid, candidate));
            }
        }

        // Stable: preferred first, original order otherwise
        found.sort_by_key(|(preferred, _)| !preferred);
        found.into_iter().map(|(_, c)| c).collect()
    }

    /// Probe for a port tool once and remember the answer.
    ///
    /// macOS always uses lsof.
    pub async fn ensure_port_tool<R: CommandRunner>(&self, runner: &R) -> PortTool {
        let flavor = self.flavor;
        *self
            .port_tool
            .get_or_init(|| async move {
                if flavor == UnixFlavor::Darwin {
                    return PortTool::Lsof;
                }
                for tool in PortTool::PRIORITY {
                    let probe = ShellCommand::new("which").arg(tool.binary());
                    match runner.run(&probe, COMMAND_TIMEOUT).await {
                        Ok(path) if !path.trim().is_empty() => {
                            debug!(tool = tool.binary(), path = path.trim(), "Port tool found");
                            return tool;
                        }
                        _ => continue,
                    }
                }
                warn!("None of lsof, ss or netstat found; falling back to lsof");
                PortTool::Lsof
            })
            .await
    }

    pub fn port_tool(&self) -> PortTool {
        self.port_tool.get().copied().unwrap_or(PortTool::Lsof)
    }

    /// Executes one of:
    /// - `lsof -nP -a -iTCP -sTCP:LISTEN -p <pid>`
    /// - `ss -tlnp`
    /// - `netstat -tlnp`
    pub fn build_port_list_command(&self, pid: u32) -> ShellCommand {
        match self.port_tool() {
            PortTool::Lsof => ShellCommand::new("lsof").args([
                "-nP".to_string(),
                "-a".to_string(),
                "-iTCP".to_string(),
                "-sTCP:LISTEN".to_string(),
                "-p".to_string(),
                pid.to_string(),
            ]),
            PortTool::Ss => ShellCommand::new("ss").arg("-tlnp"),
            PortTool::Netstat => ShellCommand::new("netstat").arg("-tlnp"),
        }
    }

    pub fn parse_listening_ports(&self, output: &str, pid: u32) -> Vec<u16> {
        match self.port_tool() {
            PortTool::Lsof => parse_lsof_ports(output, pid),
            PortTool::Ss => parse_ss_ports(output, pid),
            PortTool::Netstat => parse_netstat_ports(output, pid),
        }
    }

    pub fn build_diagnostic_command(&self) -> ShellCommand {
        self.build_process_list_command()
    }

    pub fn filter_diagnostic_lines(&self, output: &str) -> String {
        output
            .lines()
            .filter(|line| {
                let lower = line.to_lowercase();
                lower.contains("language_server") || lower.contains(PRODUCT_NAME)
            })
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn error_messages(&self) -> PlatformErrorMessages {
        match self.flavor {
            UnixFlavor::Darwin => PlatformErrorMessages {
                process_not_found: "Antigravity language server not found. Make sure Antigravity is running.",
                command_not_available: "lsof is not available. It ships with macOS; check your PATH.",
                requirements: &["ps", "lsof"],
            },
            UnixFlavor::Linux => PlatformErrorMessages {
                process_not_found: "Antigravity language server not found. Make sure Antigravity is running.",
                command_not_available: "None of lsof, ss or netstat is available. Install one of them.",
                requirements: &["ps", "lsof | ss | netstat"],
            },
        }
    }
}

/// Split off the first whitespace-delimited field.
fn next_field(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(end) => Some((&s[..end], &s[end..])),
        None => Some((s, "")),
    }
}

fn lsof_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\S+\s+(\d+)\s.*\sTCP\s+(\S+)\s+\(LISTEN\)\s*$").expect("valid regex")
    })
}

fn ss_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^LISTEN\s+\d+\s+\d+\s+(\S+)\s+\S+.*\bpid=(\d+),").expect("valid regex")
    })
}

fn netstat_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^tcp6?\s+\d+\s+\d+\s+(\S+)\s+\S+\s+LISTEN\s+(\d+)/").expect("valid regex")
    })
}

/// Parse `lsof -nP -a -iTCP -sTCP:LISTEN -p <pid>` output.
///
/// ```text
/// COMMAND     PID USER   FD   TYPE             DEVICE SIZE/OFF NODE NAME
/// language_ 41234  dev   12u  IPv4 0x5e3c1c1f0a1b2c3d      0t0  TCP 127.0.0.1:42100 (LISTEN)
/// ```
pub(crate) fn parse_lsof_ports(output: &str, pid: u32) -> Vec<u16> {
    let ports = lsof_regex()
        .captures_iter(output)
        .filter(|caps| caps[1].parse::<u32>().ok() == Some(pid))
        .filter_map(|caps| parse_address(&caps[2]).map(|(_, port)| port))
        .collect();
    normalize_ports(ports)
}

/// Parse `ss -tlnp` output.
///
/// ```text
/// State  Recv-Q Send-Q Local Address:Port Peer Address:Port Process
/// LISTEN 0      4096       127.0.0.1:42100      0.0.0.0:*    users:(("language_server",pid=41234,fd=12))
/// ```
pub(crate) fn parse_ss_ports(output: &str, pid: u32) -> Vec<u16> {
    let ports = ss_regex()
        .captures_iter(output)
        .filter(|caps| caps[2].parse::<u32>().ok() == Some(pid))
        .filter_map(|caps| parse_address(&caps[1]).map(|(_, port)| port))
        .collect();
    normalize_ports(ports)
}

/// Parse `netstat -tlnp` output.
///
/// ```text
/// Proto Recv-Q Send-Q Local Address   Foreign Address  State   PID/Program name
/// tcp        0      0 127.0.0.1:42100 0.0.0.0:*        LISTEN  41234/language_serv
/// ```
pub(crate) fn parse_netstat_ports(output: &str, pid: u32) -> Vec<u16> {
    let ports = netstat_regex()
        .captures_iter(output)
        .filter(|caps| caps[2].parse::<u32>().ok() == Some(pid))
        .filter_map(|caps| parse_address(&caps[1]).map(|(_, port)| port))
        .collect();
    normalize_ports(ports)
}
