//! HTTP remote backend.

use super::Remote;
use crate::config::RemoteConfig;
use crate::error::{ClientError, RemoteError};
use async_trait::async_trait;
use lapline_types::{IngestRequest, IngestResponse, PullResponse, RunEvent};
use std::time::Duration;

/// Remote authority reached over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRemote {
    /// Create a remote for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Create a remote from configuration.
    pub fn from_config(config: &RemoteConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url.as_deref().ok_or(ClientError::NoRemote)?;
        Ok(Self::new(base_url, config.request_timeout())?)
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the URL for an endpoint path.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn success_body(response: reqwest::Response) -> Result<Vec<u8>, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn ingest(
        &self,
        credential: &str,
        request: &IngestRequest,
    ) -> Result<IngestResponse, RemoteError> {
        let response = self
            .http
            .post(self.endpoint("/events/ingest"))
            .bearer_auth(credential)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request.to_bytes()?)
            .send()
            .await?;

        let body = Self::success_body(response).await?;
        let parsed = IngestResponse::from_slice_lenient(&body);
        if parsed == IngestResponse::default() && !body.is_empty() {
            tracing::debug!(bytes = body.len(), "ingest response had no id lists");
        }
        Ok(parsed)
    }

    async fn events_since(
        &self,
        credential: &str,
        since_ms: i64,
    ) -> Result<Vec<RunEvent>, RemoteError> {
        let response = self
            .http
            .get(self.endpoint("/events"))
            .bearer_auth(credential)
            .query(&[("since", since_ms)])
            .send()
            .await?;

        let body = Self::success_body(response).await?;
        let (parsed, skipped) = PullResponse::decode_lenient(&body);
        if skipped > 0 {
            tracing::warn!(skipped, kept = parsed.events.len(), "dropped undecodable pulled events");
        }
        Ok(parsed.events)
    }
}
