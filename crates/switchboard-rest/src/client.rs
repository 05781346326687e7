// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP transport for the REST collaborators.
//!
//! Every response body is an [`ApiResponse`]; a non-200 `code` (or HTTP
//! status) is mapped back onto [`SwitchboardError`]. Transient failures
//! (5xx, connection errors, timeouts) are retried up to `max_retries` times,
//! except on calls that create something: those go through
//! [`RestClient::post_once`] and are sent exactly once.

use std::time::Duration;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use switchboard_config::model::ApiConfig;
use switchboard_core::wire::ApiResponse;
use switchboard_core::{Result, SwitchboardError};
use tracing::{debug, warn};
use url::Url;

/// Authenticated client for one actor.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
    timeout: Duration,
}

impl RestClient {
    /// Build a client that sends `Authorization: Bearer {token}` on every call.
    pub fn new(config: &ApiConfig, token: &SecretString) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| SwitchboardError::Config(format!("invalid API token header value: {e}")))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| SwitchboardError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(1),
            timeout,
        })
    }

    /// Pause between retry attempts (1 second by default).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}{path}", self.base_url);
        Url::parse(&raw).map_err(|e| SwitchboardError::Config(format!("invalid API url `{raw}`: {e}")))
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let mut url = self.endpoint(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        self.execute(Method::GET, url, None, self.max_retries).await
    }

    pub(crate) async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>> {
        let body = serde_json::to_value(body)
            .map_err(|e| SwitchboardError::Internal(format!("request encode failed: {e}")))?;
        let url = self.endpoint(path)?;
        self.execute(Method::POST, url, Some(&body), self.max_retries).await
    }

    /// POST that is never repeated. A timeout leaves the outcome unknown and
    /// the caller must read the state back.
    pub(crate) async fn post_once<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>> {
        let body = serde_json::to_value(body)
            .map_err(|e| SwitchboardError::Internal(format!("request encode failed: {e}")))?;
        let url = self.endpoint(path)?;
        self.execute(Method::POST, url, Some(&body), 0).await
    }

    /// POST without a body.
    pub(crate) async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self.endpoint(path)?;
        self.execute(Method::POST, url, None, self.max_retries).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
        max_retries: u32,
    ) -> Result<Option<T>> {
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                warn!(attempt, %method, path = url.path(), "retrying after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }

            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(body) = body {
                request = request.json(body);
            }
            let outcome = match request.send().await {
                Ok(response) => read_response(response).await,
                Err(e) => Err(self.send_error(e)),
            };

            match outcome {
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    warn!(%method, path = url.path(), error = %e, "transient API failure");
                    last_error = Some(e);
                }
                other => return other,
            }
        }

        Err(last_error.unwrap_or_else(|| SwitchboardError::Api {
            message: "request failed after retries".into(),
            status: None,
        }))
    }

    fn send_error(&self, e: reqwest::Error) -> SwitchboardError {
        if e.is_timeout() {
            SwitchboardError::Timeout {
                duration: self.timeout,
            }
        } else {
            SwitchboardError::Api {
                message: format!("HTTP request failed: {e}"),
                status: None,
            }
        }
    }
}

async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<Option<T>> {
    let status = response.status();
    let body = response.text().await.map_err(|e| SwitchboardError::Api {
        message: format!("failed to read response body: {e}"),
        status: Some(status.as_u16()),
    })?;
    debug!(status = %status, "API response received");

    match serde_json::from_str::<ApiResponse<T>>(&body) {
        Ok(envelope) if !status.is_success() && envelope.is_success() => Err(
            SwitchboardError::from_status(status.as_u16(), envelope.message),
        ),
        Ok(envelope) => envelope.into_result(),
        Err(e) if status.is_success() => Err(SwitchboardError::Api {
            message: format!("malformed API response: {e}"),
            status: Some(status.as_u16()),
        }),
        Err(_) => {
            let message = if body.is_empty() {
                status.to_string()
            } else {
                body
            };
            Err(SwitchboardError::from_status(status.as_u16(), message))
        }
    }
}

/// Unwrap the `data` of a call that must return one.
pub(crate) fn required<T>(data: Option<T>, what: &str) -> Result<T> {
    data.ok_or_else(|| SwitchboardError::Api {
        message: format!("{what} response carried no data"),
        status: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> RestClient {
        let config = ApiConfig {
            base_url: format!("{}/api/", server.uri()),
            timeout_secs: 5,
            max_retries: 1,
        };
        RestClient::new(&config, &SecretString::from("tok-9".to_string()))
            .unwrap()
            .with_retry_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn sends_bearer_token_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/echo"))
            .and(header("authorization", "Bearer tok-9"))
            .and(query_param("sessionId", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200, "message": "success", "data": 7
            })))
            .expect(1)
            .mount(&server)
            .await;

        let value: Option<u32> = client(&server)
            .await
            .get("/echo", &[("sessionId", "42".to_string())])
            .await
            .unwrap();
        assert_eq!(value, Some(7));
    }

    #[tokio::test]
    async fn envelope_code_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/thing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 422, "message": "request is terminal", "data": null
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .post_empty::<serde_json::Value>("/thing")
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn http_status_without_envelope_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such route"))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .get::<serde_json::Value>("/missing", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::NotFound(ref m) if m == "no such route"));
    }

    #[tokio::test]
    async fn server_error_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/flaky"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "code": 503, "message": "busy", "data": null
            })))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .get::<serde_json::Value>("/flaky", &[])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn post_once_is_sent_once_even_on_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/create"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 200, "message": "success", "data": 1}))
                    .set_delay(Duration::from_millis(1500)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = ApiConfig {
            base_url: format!("{}/api", server.uri()),
            timeout_secs: 1,
            max_retries: 1,
        };
        let client = RestClient::new(&config, &SecretString::from("tok-9".to_string()))
            .unwrap()
            .with_retry_delay(Duration::from_millis(10));
        let err = client
            .post_once::<_, u32>("/create", &serde_json::json!({"x": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::Timeout { .. }));
    }

    #[tokio::test]
    async fn race_lost_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/race"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "code": 409, "message": "already accepted", "data": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .post_empty::<serde_json::Value>("/race")
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::RaceLost { .. }));
    }
}
