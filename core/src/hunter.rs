//! Language server discovery.
//!
//! `ProcessHunter` runs the platform's process query with bounded retries,
//! lists each candidate's listening ports and proves one of them serves the
//! language server with an authenticated ping. Failures never escape
//! `scan_environment`; they end up in the returned `None` plus
//! [`ScanDiagnostics`].

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{EnvironmentScanResult, ProcessCandidate, ScanDiagnostics, ScanMethod};
use crate::error::{Error, Result};
use crate::platform::{failure_hint, PlatformStrategy};
use crate::ports::{CommandRunner, ShellCommand, Transport, TransportRequest};
use crate::protocol::{ping_payload, COMMAND_TIMEOUT, NETWORK_TIMEOUT, PING_PATH};

/// Default number of process-list attempts.
pub const DEFAULT_SCAN_ATTEMPTS: u32 = 3;

/// Pause between ordinary failed attempts.
pub const SCAN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Pause after the first command timeout on a platform with a slow shell.
pub const COLD_START_DELAY: Duration = Duration::from_secs(2);

// ============================================================================
// Retry policy
// ============================================================================

/// State of the one free retry granted to a cold shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColdStartGrace {
    /// The platform does not grant one.
    NotOffered,
    Available,
    Used,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Bounded retries for the name scan.
///
/// Every failure consumes one attempt, except the first command timeout when
/// the grace is available: that one is retried for free after a longer delay.
#[derive(Debug, Clone)]
pub struct ScanRetryPolicy {
    max_attempts: u32,
    consumed: u32,
    grace: ColdStartGrace,
}

impl ScanRetryPolicy {
    pub fn new(max_attempts: u32, offer_grace: bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            consumed: 0,
            grace: if offer_grace {
                ColdStartGrace::Available
            } else {
                ColdStartGrace::NotOffered
            },
        }
    }

    /// Record a failed attempt. `error` is the command error, if the command
    /// itself failed rather than producing no verified candidate.
    pub fn record_failure(&mut self, error: Option<&Error>) -> RetryDecision {
        let timed_out = matches!(error, Some(Error::CommandTimedOut(_)));
        if timed_out && self.grace == ColdStartGrace::Available {
            self.grace = ColdStartGrace::Used;
            return RetryDecision::RetryAfter(COLD_START_DELAY);
        }

        self.consumed += 1;
        if self.consumed >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(SCAN_RETRY_DELAY)
        }
    }

    pub fn grace(&self) -> ColdStartGrace {
        self.grace
    }

    pub fn attempts_consumed(&self) -> u32 {
        self.consumed
    }
}

// ============================================================================
// ProcessHunter
// ============================================================================

/// Finds the language server and its authenticated connect port.
pub struct ProcessHunter<R: CommandRunner, T: Transport> {
    strategy: PlatformStrategy,
    runner: R,
    transport: T,
    last_diagnostics: Mutex<ScanDiagnostics>,
}

impl<R: CommandRunner, T: Transport> ProcessHunter<R, T> {
    pub fn new(strategy: PlatformStrategy, runner: R, transport: T) -> Self {
        let last_diagnostics = Mutex::new(ScanDiagnostics::new(strategy.process_name()));
        Self {
            strategy,
            runner,
            transport,
            last_diagnostics,
        }
    }

    pub fn strategy(&self) -> &PlatformStrategy {
        &self.strategy
    }

    /// Diagnostics of the most recent `scan_environment` call.
    pub fn last_diagnostics(&self) -> ScanDiagnostics {
        self.last_diagnostics.lock().clone()
    }

    /// Locate the language server and verify its connect port.
    pub async fn scan_environment(&self, max_attempts: u32) -> Option<EnvironmentScanResult> {
        let mut diag = ScanDiagnostics::new(self.strategy.process_name());
        info!(
            process = self.strategy.process_name(),
            max_attempts,
            "Scanning for language server"
        );

        let mut result = self.scan_by_name(max_attempts, &mut diag).await;
        if result.is_none() {
            result = self.scan_by_keyword(&mut diag).await;
        }

        match &result {
            Some(found) => info!(
                candidates = diag.candidates_found,
                attempts = diag.attempt_count,
                "Language server found at {}",
                found
            ),
            None => {
                warn!(
                    attempts = diag.attempt_count,
                    candidates = diag.candidates_found,
                    "{}",
                    self.strategy.error_messages().process_not_found
                );
                self.log_related_processes().await;
            }
        }

        *self.last_diagnostics.lock() = diag;
        result
    }

    /// The error describing why the last scan came back empty.
    pub fn scan_failure(&self) -> Error {
        let diag = self.last_diagnostics.lock();
        if diag.candidates_found == 0 {
            Error::ProcessNotFound(self.strategy.error_messages().process_not_found.to_string())
        } else {
            Error::VerificationFailed(format!(
                "{} candidate(s) found but no port answered (ports seen: {:?})",
                diag.candidates_found,
                diag.listening_ports.as_deref().unwrap_or_default()
            ))
        }
    }

    async fn scan_by_name(
        &self,
        max_attempts: u32,
        diag: &mut ScanDiagnostics,
    ) -> Option<EnvironmentScanResult> {
        let command = self.strategy.build_process_list_command();
        let mut policy =
            ScanRetryPolicy::new(max_attempts, self.strategy.grants_cold_start_grace());

        loop {
            diag.attempt_count += 1;
            let failure = match self.run_stage(&command, diag).await {
                Ok(Some(found)) => return Some(found),
                Ok(None) => None,
                Err(e) => {
                    self.log_command_failure(&e);
                    Some(e)
                }
            };

            match policy.record_failure(failure.as_ref()) {
                RetryDecision::RetryAfter(delay) => {
                    debug!(
                        attempt = diag.attempt_count,
                        delay_ms = delay.as_millis() as u64,
                        grace = ?policy.grace(),
                        "Retrying process scan"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => return None,
            }
        }
    }

    async fn scan_by_keyword(&self, diag: &mut ScanDiagnostics) -> Option<EnvironmentScanResult> {
        let command = self.strategy.build_keyword_scan_command()?;
        info!("Name scan found nothing; falling back to keyword scan");

        diag.scan_method = ScanMethod::Keyword;
        diag.attempt_count += 1;
        match self.run_stage(&command, diag).await {
            Ok(found) => found,
            Err(e) => {
                self.log_command_failure(&e);
                None
            }
        }
    }

    /// One process query followed by verification of every candidate.
    async fn run_stage(
        &self,
        command: &ShellCommand,
        diag: &mut ScanDiagnostics,
    ) -> Result<Option<EnvironmentScanResult>> {
        let output = self.runner.run(command, COMMAND_TIMEOUT).await?;
        let candidates = self.strategy.parse_process_info(&output)?;
        diag.candidates_found = candidates.len();
        debug!(count = candidates.len(), method = %diag.scan_method, "Candidates parsed");

        for candidate in &candidates {
            match self.verify_candidate(candidate, diag).await {
                Ok(Some(connect_port)) => {
                    return Ok(Some(EnvironmentScanResult {
                        extension_port: candidate.extension_port,
                        connect_port,
                        csrf_token: candidate.csrf_token.clone(),
                    }));
                }
                Ok(None) => debug!(pid = candidate.pid, "No port of candidate answered"),
                Err(e) => warn!(pid = candidate.pid, error = %e, "Candidate rejected"),
            }
        }

        Ok(None)
    }

    async fn verify_candidate(
        &self,
        candidate: &ProcessCandidate,
        diag: &mut ScanDiagnostics,
    ) -> Result<Option<u16>> {
        self.strategy.ensure_port_command_available(&self.runner).await;

        let command = self.strategy.build_port_list_command(candidate.pid);
        let output = self
            .runner
            .run(&command, COMMAND_TIMEOUT)
            .await
            .map_err(|e| Error::PortDiscoveryFailed {
                pid: candidate.pid,
                reason: e.to_string(),
            })?;

        let ports = self.strategy.parse_listening_ports(&output, candidate.pid);
        debug!(pid = candidate.pid, ports = ?ports, "Listening ports");
        diag.listening_ports = Some(ports.clone());

        let verified = self.verify_connection(&ports, &candidate.csrf_token).await;
        diag.verified_port = verified;
        diag.verification_succeeded = Some(verified.is_some());
        Ok(verified)
    }

    /// Ping each port in order; the first success status wins.
    pub async fn verify_connection(&self, ports: &[u16], token: &str) -> Option<u16> {
        let body = ping_payload();
        for &port in ports {
            let request = TransportRequest {
                port,
                token,
                path: PING_PATH,
                body: &body,
                timeout: NETWORK_TIMEOUT,
            };
            match self.transport.post(request).await {
                Ok(response) if response.is_success() => {
                    debug!(port, "Port verified");
                    return Some(port);
                }
                Ok(response) => debug!(port, status = response.status, "Probe rejected"),
                Err(e) => debug!(port, error = %e, "Probe failed"),
            }
        }
        None
    }

    fn log_command_failure(&self, error: &Error) {
        match failure_hint(&error.to_string()) {
            Some(hint) => warn!(error = %error, hint, "Process query failed"),
            None => warn!(error = %error, "Process query failed"),
        }
    }

    /// Best effort; output is for operators only, tokens redacted.
    async fn log_related_processes(&self) {
        let command = self.strategy.build_diagnostic_command();
        match self.runner.run(&command, COMMAND_TIMEOUT).await {
            Ok(output) => {
                let summary = self.strategy.summarize_diagnostics(&output);
                if summary.is_empty() {
                    info!("No related processes are running");
                } else {
                    info!(processes = %summary, "Related processes");
                }
            }
            Err(e) => debug!(error = %e, "Diagnostic process listing failed"),
        }
    }
}
