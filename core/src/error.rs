//! Error types for the gravitywatch-core library.

use thiserror::Error;

/// Result type alias for gravitywatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during discovery, transport and decoding.
#[derive(Error, Debug)]
pub enum Error {
    /// A request was attempted before `engage()` supplied a port and token.
    #[error("Reactor is not engaged with a language server")]
    NotEngaged,

    /// Another sync holds the connection and nothing is cached yet.
    #[error("A telemetry sync is already in progress")]
    SyncInProgress,

    /// The TCP/TLS connection to the language server could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The language server did not respond within the network timeout.
    #[error("Request timed out after {0} ms")]
    RequestTimedOut(u64),

    /// The response body was empty or not valid JSON (signal lost).
    #[error("Signal corrupted: {0}")]
    EmptyOrCorruptResponse(String),

    /// The response was JSON but did not carry the expected structure.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The language server reported a legitimate state, e.g. "not signed in".
    #[error("{0}")]
    ServerReported(String),

    /// No running language server process could be found.
    #[error("Language server process not found: {0}")]
    ProcessNotFound(String),

    /// The listening ports of a candidate process could not be listed.
    #[error("Port discovery failed for pid {pid}: {reason}")]
    PortDiscoveryFailed { pid: u32, reason: String },

    /// None of the candidate ports answered the authenticated probe.
    #[error("Connection verification failed: {0}")]
    VerificationFailed(String),

    /// Failed to execute a system command.
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// A system command did not finish in time.
    #[error("Command timed out after {0} ms")]
    CommandTimedOut(u64),

    /// Failed to parse command output.
    #[error("Failed to parse output: {0}")]
    ParseError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Platform not supported.
    #[error("Platform not supported: {0}")]
    UnsupportedPlatform(String),
}

/// User-facing classification of a malfunction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The language server is not running or not reachable.
    BackendUnreachable,
    /// The language server answered with an error of its own.
    BackendError,
    /// Something the extension itself got wrong.
    Defect,
}

impl Error {
    /// True for errors the server supplied itself; these are never escalated.
    pub fn is_server_reported(&self) -> bool {
        matches!(self, Error::ServerReported(_))
    }

    /// True when the failure suggests the server moved to another port.
    ///
    /// Connection refused and lost/corrupted signals both trigger a re-scan.
    pub fn indicates_port_change(&self) -> bool {
        match self {
            Error::ConnectionFailed(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("refused") || msg.contains("reset")
            }
            Error::EmptyOrCorruptResponse(_) => true,
            _ => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotEngaged
            | Error::ConnectionFailed(_)
            | Error::RequestTimedOut(_)
            | Error::ProcessNotFound(_)
            | Error::PortDiscoveryFailed { .. }
            | Error::VerificationFailed(_)
            | Error::CommandTimedOut(_)
            | Error::SyncInProgress => ErrorCategory::BackendUnreachable,
            Error::ServerReported(_) => ErrorCategory::BackendError,
            _ => ErrorCategory::Defect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_reported_passes_message_verbatim() {
        let err = Error::ServerReported("You are not logged in".to_string());
        assert!(err.is_server_reported());
        assert_eq!(err.to_string(), "You are not logged in");
        assert_eq!(err.category(), ErrorCategory::BackendError);
    }

    #[test]
    fn test_port_change_detection() {
        let refused = Error::ConnectionFailed("tcp connect error: Connection refused (os error 111)".into());
        assert!(refused.indicates_port_change());
        assert!(Error::EmptyOrCorruptResponse("empty body".into()).indicates_port_change());
        assert!(!Error::RequestTimedOut(5000).indicates_port_change());
        assert!(!Error::MalformedResponse("no userStatus".into()).indicates_port_change());
    }

    #[test]
    fn test_categories() {
        assert_eq!(Error::NotEngaged.category(), ErrorCategory::BackendUnreachable);
        assert_eq!(
            Error::MalformedResponse("x".into()).category(),
            ErrorCategory::Defect
        );
    }
}
