//! Loopback transport port (interface).

use std::time::Duration;

use crate::error::Result;

/// One authenticated POST to the language server.
#[derive(Debug, Clone)]
pub struct TransportRequest<'a> {
    pub port: u16,
    pub token: &'a str,
    pub path: &'a str,
    pub body: &'a serde_json::Value,
    pub timeout: Duration,
}

/// Raw status and body; interpretation is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Port for talking to the discovered language server.
///
/// Implementations must map failures to the distinguishable errors
/// `ConnectionFailed` and `RequestTimedOut`.
pub trait Transport: Send + Sync {
    fn post(
        &self,
        request: TransportRequest<'_>,
    ) -> impl std::future::Future<Output = Result<TransportResponse>> + Send;
}
