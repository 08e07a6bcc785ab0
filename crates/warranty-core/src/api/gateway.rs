//! Authenticated access to the Warranty Manager service.
//!
//! Every outbound call goes through [`Gateway::send`], which attaches the
//! stored bearer token and ends the session when the service answers 401.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::{LogoutReason, SessionManager};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
    base_url: String,
    session: Arc<SessionManager>,
}

impl Gateway {
    pub fn new(base_url: impl Into<String>, session: Arc<SessionManager>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self::with_client(client, base_url, session))
    }

    /// Build on an existing client, sharing its connection pool.
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        session: Arc<SessionManager>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request against `path`, relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Dispatch a request with the session's credentials.
    ///
    /// A 401 answer ends the session before the error is returned.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let request = match self.session.token() {
            Ok(Some(token)) => request.bearer_auth(token),
            Ok(None) => request,
            Err(e) => {
                warn!(error = %e, "Could not read session token, sending unauthenticated");
                request
            }
        };

        let response = request.send().await?;
        let status = response.status();
        debug!(url = %response.url(), %status, "Response received");

        if status == StatusCode::UNAUTHORIZED {
            self.session.force_logout(LogoutReason::Rejected);
        }

        Self::check_response(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let url = response.url().to_string();
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        Self::parse_json(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.request(Method::POST, path).json(body))
            .await?;
        Self::parse_json(response).await
    }

    /// POST where the service answers with a bare status
    pub async fn post_no_content<B>(&self, path: &str, body: &B) -> Result<(), ApiError>
    where
        B: Serialize + ?Sized,
    {
        self.send(self.request(Method::POST, path).json(body))
            .await?;
        Ok(())
    }
}
