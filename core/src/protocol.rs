//! Wire constants of the language server's loopback API.

use std::time::Duration;

use serde_json::{json, Value};

/// The language server only listens on loopback.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Header carrying the per-process CSRF token.
pub const CSRF_HEADER: &str = "X-Codeium-Csrf-Token";

/// Connect protocol version header and its fixed value.
pub const PROTOCOL_VERSION_HEADER: &str = "Connect-Protocol-Version";
pub const PROTOCOL_VERSION: &str = "1";

/// Lightweight endpoint used only to prove a port serves the language server.
pub const PING_PATH: &str = "/exa.language_server_pb.LanguageServerService/GetUnleashData";

/// Endpoint returning account status and per-model quotas.
pub const USER_STATUS_PATH: &str = "/exa.language_server_pb.LanguageServerService/GetUserStatus";

/// Product name expected as the value of `--app_data_dir`.
pub const PRODUCT_NAME: &str = "antigravity";

/// Timeout for probes and status requests.
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for OS commands; shells can be slow to start cold.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Empty payload of the ping endpoint.
pub fn ping_payload() -> Value {
    json!({})
}

/// Metadata payload of the status endpoint.
pub fn user_status_payload() -> Value {
    json!({
        "metadata": {
            "ideName": PRODUCT_NAME,
            "extensionName": PRODUCT_NAME,
            "locale": "en",
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_status_payload_shape() {
        let payload = user_status_payload();
        assert_eq!(payload["metadata"]["ideName"], "antigravity");
        assert_eq!(payload["metadata"]["locale"], "en");
    }
}
