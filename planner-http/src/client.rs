//! HTTP bridge implementation

use crate::config::BridgeSettings;
use crate::errors::BridgeError;
use crate::normalize::ServiceFailure;
use crate::types::HEALTH;
use reqwest::Client;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use url::Url;

/// Calls against the worker's HTTP API
#[async_trait::async_trait]
pub trait WorkerClient: Send + Sync {
    /// Single liveness check; any 2xx is healthy
    async fn health(&self) -> Result<(), BridgeError>;

    /// One round trip. No payload issues a `GET`, a payload a JSON `POST`.
    async fn call(
        &self,
        endpoint: &str,
        payload: Option<&JsonValue>,
    ) -> Result<JsonValue, BridgeError>;
}

/// reqwest-backed bridge to a worker on loopback
#[derive(Debug, Clone)]
pub struct HttpBridge {
    client: Client,
    base_url: Url,
    settings: BridgeSettings,
}

impl HttpBridge {
    /// Create a bridge with specific settings
    pub fn new(settings: BridgeSettings) -> Result<Self, BridgeError> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| BridgeError::InvalidEndpoint(format!("{}: {}", settings.base_url, e)))?;

        debug!(
            "Creating worker bridge for {} with {}s request timeout",
            base_url,
            settings.request_timeout.as_secs()
        );

        let client = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(&settings.user_agent)
            // Loopback only; never route through a system proxy
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            base_url,
            settings,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Resolve an endpoint path against the worker's base URL
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, BridgeError> {
        if !endpoint.starts_with('/') || endpoint.starts_with("//") {
            return Err(BridgeError::InvalidEndpoint(format!(
                "endpoint must be an absolute path, got '{}'",
                endpoint
            )));
        }

        self.base_url
            .join(endpoint)
            .map_err(|e| BridgeError::InvalidEndpoint(format!("{}: {}", endpoint, e)))
    }

    async fn into_outcome(response: reqwest::Response) -> Result<JsonValue, BridgeError> {
        let status = response.status();

        if !status.is_success() {
            let body = error_body(response).await;
            let failure = ServiceFailure::from_response(status.as_u16(), &body);
            warn!("Worker rejected request with {}: {}", status.as_u16(), failure.message);
            return Err(BridgeError::Service(failure));
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonValue::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| BridgeError::Decode(e.to_string()))
    }
}

/// Body of a failed response; an unreadable body is logged and treated as empty
async fn error_body(response: reqwest::Response) -> String {
    let status = response.status().as_u16();
    match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to read worker error body (status {}): {}", status, e);
            String::new()
        }
    }
}

#[async_trait::async_trait]
impl WorkerClient for HttpBridge {
    async fn health(&self) -> Result<(), BridgeError> {
        let url = self.endpoint_url(HEALTH)?;
        let response = self
            .client
            .get(url)
            .timeout(self.settings.health_timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = error_body(response).await;
            Err(BridgeError::Service(ServiceFailure::from_response(
                status.as_u16(),
                &body,
            )))
        }
    }

    async fn call(
        &self,
        endpoint: &str,
        payload: Option<&JsonValue>,
    ) -> Result<JsonValue, BridgeError> {
        let url = self.endpoint_url(endpoint)?;

        let request = match payload {
            Some(body) => {
                debug!("POST {}", url);
                self.client.post(url).json(body)
            }
            None => {
                debug!("GET {}", url);
                self.client.get(url)
            }
        };

        let response = request.send().await?;
        info!("Worker responded {} for {}", response.status().as_u16(), endpoint);

        Self::into_outcome(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planner_resilience::Recoverable;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bridge_for(server: &MockServer) -> HttpBridge {
        HttpBridge::new(BridgeSettings::for_base_url(server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_health_ok() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        assert!(bridge_for(&mock_server).health().await.is_ok());
    }

    #[tokio::test]
    async fn test_payload_selects_post() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/grid/build"))
            .and(body_json(json!({"cell_size": 500.0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cells": 4})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = bridge_for(&mock_server)
            .call("/grid/build", Some(&json!({"cell_size": 500.0})))
            .await
            .unwrap();
        assert_eq!(result, json!({"cells": 4}));
    }

    #[tokio::test]
    async fn test_no_payload_selects_get() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = bridge_for(&mock_server).call("/health", None).await.unwrap();
        assert_eq!(result["status"], "ok");
    }

    #[tokio::test]
    async fn test_validation_errors_are_fatal_and_unaltered() {
        let mock_server = MockServer::start().await;
        let errors = json!([{"message": "Unknown token", "line": 3}]);

        Mock::given(method("POST"))
            .and(path("/mission/compile"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({"errors": errors})))
            .mount(&mock_server)
            .await;

        let err = bridge_for(&mock_server)
            .call("/mission/compile", Some(&json!({"mission_text": "<invalid>"})))
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        let failure = err.service_failure().unwrap();
        assert_eq!(failure.status, 422);
        assert_eq!(serde_json::to_value(&failure.errors).unwrap(), errors);
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/mission/compile"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({"detail": "Mission compilation failed"})),
            )
            .mount(&mock_server)
            .await;

        let err = bridge_for(&mock_server)
            .call("/mission/compile", Some(&json!({"mission_text": "MISSION a"})))
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(err.service_failure().unwrap().message, "Mission compilation failed");
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_decode_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/boundary/cache"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let err = bridge_for(&mock_server)
            .call("/boundary/cache", Some(&json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_success_body_is_null() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/boundary/cache"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let value = bridge_for(&mock_server)
            .call("/boundary/cache", Some(&json!({})))
            .await
            .unwrap();
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // Bind then drop to obtain a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let bridge =
            HttpBridge::new(BridgeSettings::for_base_url(format!("http://127.0.0.1:{}", port)))
                .unwrap();

        let err = bridge.health().await.unwrap_err();
        assert!(matches!(err, BridgeError::Connect(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let settings = BridgeSettings {
            health_timeout: Duration::from_millis(100),
            ..BridgeSettings::for_base_url(mock_server.uri())
        };
        let err = HttpBridge::new(settings).unwrap().health().await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_invalid_endpoints() {
        let bridge = HttpBridge::new(BridgeSettings::default()).unwrap();
        assert!(matches!(
            bridge.endpoint_url("grid/build"),
            Err(BridgeError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            bridge.endpoint_url("//evil.example/x"),
            Err(BridgeError::InvalidEndpoint(_))
        ));
        assert_eq!(
            bridge.endpoint_url("/grid/build").unwrap().as_str(),
            "http://127.0.0.1:8765/grid/build"
        );

        assert!(matches!(
            HttpBridge::new(BridgeSettings::for_base_url("not a url")),
            Err(BridgeError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_error_body_keeps_status() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Promises a longer body than it sends, then closes the connection
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 100\r\n\r\n{\"detail\"")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let bridge = HttpBridge::new(BridgeSettings::for_base_url(format!("http://{}", addr))).unwrap();
        let err = bridge.call("/grid/build", None).await.unwrap_err();
        server.await.unwrap();

        let failure = err.service_failure().unwrap();
        assert_eq!(failure.status, 503);
        assert!(failure.message.contains("503"), "{}", failure.message);
        assert!(failure.body.is_none());
        assert!(err.is_transient());
    }
}
