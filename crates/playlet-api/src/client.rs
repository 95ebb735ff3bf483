//! HTTP client core.

use crate::error::{ApiError, ApiResult};
use crate::types::ErrorBody;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// REST client for the Playlet backend.
///
/// Holds a connection-pooled `reqwest::Client` with the global request
/// timeout baked in. Cheap to clone; all endpoint methods take the bearer
/// token explicitly so the client itself stays stateless.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Arguments
    /// * `base_url` - Backend base URL (e.g. `https://api.playlet.app`)
    /// * `timeout` - Global per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build the full URL for an API path.
    pub(crate) fn endpoint_url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    /// Start a request, attaching the bearer token when present.
    pub(crate) fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, self.endpoint_url(path))
            .header("Accept", "application/json");
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Execute a request and deserialize the JSON response body.
    pub(crate) async fn execute<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> ApiResult<T> {
        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(Self::status_error(status, response).await);
        }

        Ok(response.json().await?)
    }

    /// Execute a request, discarding any response body.
    pub(crate) async fn execute_empty(&self, req: reqwest::RequestBuilder) -> ApiResult<()> {
        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(Self::status_error(status, response).await);
        }

        Ok(())
    }

    /// Convenience for JSON-body requests.
    pub(crate) async fn execute_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: &impl Serialize,
    ) -> ApiResult<T> {
        self.execute(self.request(method, path, token).json(body))
            .await
    }

    async fn status_error(status: reqwest::StatusCode, response: reqwest::Response) -> ApiError {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_default();
        tracing::warn!(status = %status, message = %message, "API request failed");
        ApiError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ApiClient::new("https://api.playlet.test", Duration::from_secs(10)).unwrap();
        assert_eq!(client.base_url, "https://api.playlet.test");
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client = ApiClient::new("https://api.playlet.test/", Duration::from_secs(10)).unwrap();
        assert_eq!(
            client.endpoint_url("series"),
            "https://api.playlet.test/api/v1/series"
        );
    }

    #[test]
    fn test_endpoint_url() {
        let client = ApiClient::new("https://api.playlet.test", Duration::from_secs(10)).unwrap();
        assert_eq!(
            client.endpoint_url("auth/login"),
            "https://api.playlet.test/api/v1/auth/login"
        );
    }
}
