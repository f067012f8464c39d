//! HTTPS transport adapter on `reqwest`.

use reqwest::Client;
use tracing::trace;

use crate::error::{Error, Result};
use crate::ports::{Transport, TransportRequest, TransportResponse};
use crate::protocol::{CSRF_HEADER, LOOPBACK_HOST, PROTOCOL_VERSION, PROTOCOL_VERSION_HEADER};

/// Talks HTTPS to the language server over loopback.
///
/// The server uses a self-signed certificate, so validation is disabled.
/// Proxies are bypassed and connections are never pooled.
#[derive(Debug, Clone)]
pub struct HttpsTransport {
    client: Client,
}

impl HttpsTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .no_proxy()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTPS client: {}", e)))?;

        Ok(Self { client })
    }
}

impl Transport for HttpsTransport {
    async fn post(&self, request: TransportRequest<'_>) -> Result<TransportResponse> {
        let url = format!("https://{}:{}{}", LOOPBACK_HOST, request.port, request.path);
        let timeout_ms = request.timeout.as_millis() as u64;
        trace!(port = request.port, path = request.path, "POST");

        let response = self
            .client
            .post(&url)
            .header(CSRF_HEADER, request.token)
            .header(PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION)
            .json(request.body)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout_ms))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, timeout_ms))?;

        Ok(TransportResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Map a reqwest failure onto the distinguishable transport errors.
fn classify(e: reqwest::Error, timeout_ms: u64) -> Error {
    if e.is_timeout() {
        Error::RequestTimedOut(timeout_ms)
    } else if e.is_body() || e.is_decode() {
        Error::EmptyOrCorruptResponse(error_chain(&e))
    } else {
        Error::ConnectionFailed(error_chain(&e))
    }
}

/// Flatten an error and its sources; reqwest hides "connection refused" a few levels down.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_closed_port_is_connection_failure() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let transport = HttpsTransport::new().unwrap();
        let body = serde_json::json!({});
        let result = transport
            .post(TransportRequest {
                port,
                token: "token",
                path: "/ping",
                body: &body,
                timeout: Duration::from_secs(2),
            })
            .await;

        match result {
            Err(err @ Error::ConnectionFailed(_)) => assert!(err.indicates_port_change()),
            other => panic!("expected connection failure, got {:?}", other),
        }
    }
}
