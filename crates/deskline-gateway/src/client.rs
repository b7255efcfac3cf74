// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the gateway bridge.
//!
//! Provides [`GatewayClient`] which handles URL construction, error body
//! parsing and transient error retry.

use std::time::Duration;

use deskline_core::{DesklineError, InstanceId};
use reqwest::{Method, StatusCode, Url};
use tracing::{debug, warn};

use crate::types::{ErrorBody, QrResponse, SendRequest};

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// HTTP client for gateway bridge communication.
///
/// The base URL is passed per call because it is tenant-scoped.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    max_retries: u32,
}

fn unreachable(message: String, source: Option<reqwest::Error>) -> DesklineError {
    DesklineError::GatewayUnreachable {
        message,
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}

impl GatewayClient {
    pub fn new(request_timeout: Duration, max_retries: u32) -> Result<Self, DesklineError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| unreachable(format!("failed to build HTTP client: {e}"), Some(e)))?;
        Ok(Self {
            client,
            max_retries,
        })
    }

    /// Builds `{base}/{path}?instance={id}`.
    fn url(base: &str, path: &str, instance: &InstanceId) -> Result<Url, DesklineError> {
        let joined = format!("{}/{path}", base.trim_end_matches('/'));
        let mut url = Url::parse(&joined)
            .map_err(|e| DesklineError::Config(format!("invalid gateway url {joined}: {e}")))?;
        url.query_pairs_mut().append_pair("instance", instance.as_str());
        Ok(url)
    }

    /// Sends a request, retrying transient statuses. Returns the final response
    /// whatever its status; only transport failures become errors.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, DesklineError> {
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, %url, "retrying gateway request after transient error");
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(body) = &body {
                request = request.json(body);
            }
            let response = request
                .send()
                .await
                .map_err(|e| unreachable(format!("gateway request failed: {e}"), Some(e)))?;

            let status = response.status();
            debug!(status = %status, attempt, %url, "gateway response received");
            if is_transient_error(status) && attempt < self.max_retries {
                continue;
            }
            return Ok(response);
        }
        Err(unreachable(
            "gateway request failed after retries".to_string(),
            None,
        ))
    }

    /// `GET /qr` for one instance.
    pub async fn qr(&self, base: &str, instance: &InstanceId) -> Result<QrResponse, DesklineError> {
        let url = Self::url(base, "qr", instance)?;
        let response = self.execute(Method::GET, url, None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(status, response).await);
        }
        response
            .json::<QrResponse>()
            .await
            .map_err(|e| unreachable(format!("malformed /qr response: {e}"), Some(e)))
    }

    /// `POST /send`.
    pub async fn send(
        &self,
        base: &str,
        instance: &InstanceId,
        jid: &str,
        message: &str,
    ) -> Result<(), DesklineError> {
        let url = Self::url(base, "send", instance)?;
        let body = serde_json::to_value(SendRequest { jid, message })
            .map_err(|e| DesklineError::Internal(format!("failed to encode send body: {e}")))?;
        let response = self.execute(Method::POST, url, Some(body)).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(error_from_response(status, response).await)
    }

    /// `POST /logout`. A 404 means the session is already gone.
    pub async fn logout(&self, base: &str, instance: &InstanceId) -> Result<(), DesklineError> {
        let url = Self::url(base, "logout", instance)?;
        let response = self.execute(Method::POST, url, None).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(error_from_response(status, response).await)
    }
}

async fn error_from_response(status: StatusCode, response: reqwest::Response) -> DesklineError {
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => format!("gateway returned {status}: {}", err.message),
        Err(_) if body.is_empty() => format!("gateway returned {status}"),
        Err(_) => format!("gateway returned {status}: {body}"),
    };
    unreachable(message, None)
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(max_retries: u32) -> GatewayClient {
        GatewayClient::new(Duration::from_secs(5), max_retries).unwrap()
    }

    #[test]
    fn url_joins_base_and_encodes_instance() {
        let url = GatewayClient::url("http://gw:3000/", "qr", &InstanceId::from("a b")).unwrap();
        assert_eq!(url.as_str(), "http://gw:3000/qr?instance=a+b");
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = GatewayClient::url("not a url", "qr", &InstanceId::from("x")).unwrap_err();
        assert!(matches!(err, DesklineError::Config(_)));
    }

    #[tokio::test]
    async fn qr_parses_code_and_connection_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/qr"))
            .and(query_param("instance", "inst-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "qr": "2@abc", "connected": false })),
            )
            .mount(&server)
            .await;

        let qr = client(0)
            .qr(&server.uri(), &InstanceId::from("inst-1"))
            .await
            .unwrap();
        assert_eq!(qr.qr.as_deref(), Some("2@abc"));
        assert!(!qr.connected);
        assert!(qr.phone.is_none());
    }

    #[tokio::test]
    async fn send_posts_jid_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_json(serde_json::json!({ "jid": "5511@s.whatsapp.net", "message": "Oi" })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        client(0)
            .send(&server.uri(), &InstanceId::from("i"), "5511@s.whatsapp.net", "Oi")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_error_carries_gateway_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({ "message": "session not connected" })),
            )
            .mount(&server)
            .await;

        let err = client(0)
            .send(&server.uri(), &InstanceId::from("i"), "jid", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, DesklineError::GatewayUnreachable { .. }));
        assert!(err.to_string().contains("session not connected"), "got: {err}");
    }

    #[tokio::test]
    async fn transient_status_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/qr"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/qr"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "qr": null, "connected": true })),
            )
            .mount(&server)
            .await;

        let qr = client(1)
            .qr(&server.uri(), &InstanceId::from("i"))
            .await
            .unwrap();
        assert!(qr.connected);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let result = client(1)
            .send(&server.uri(), &InstanceId::from("i"), "jid", "hi")
            .await;
        assert!(matches!(result, Err(DesklineError::GatewayUnreachable { .. })));
    }

    #[tokio::test]
    async fn logout_treats_404_as_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logout"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        client(0)
            .logout(&server.uri(), &InstanceId::from("i"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unreachable_host_maps_to_gateway_error() {
        // Port 9 (discard) is not expected to accept HTTP connections.
        let err = client(0)
            .qr("http://127.0.0.1:9", &InstanceId::from("i"))
            .await
            .unwrap_err();
        assert!(matches!(err, DesklineError::GatewayUnreachable { .. }));
    }
}
