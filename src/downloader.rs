use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::DownloaderConfig;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned an empty body (HTTP {0})")]
    EmptyBody(u16),

    #[error("failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("API reported status {0}")]
    Status(i64),

    #[error("response has no Content-Type header")]
    MissingContentType,
}

/// Raw response from the downloader API
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Decode a `{status, data}` envelope. An empty body or any status
    /// other than 200 is an error.
    pub fn envelope<T: DeserializeOwned + HasStatus>(&self) -> Result<T, ApiError> {
        if self.body.is_empty() {
            return Err(ApiError::EmptyBody(self.status));
        }
        let parsed: T = serde_json::from_slice(&self.body)?;
        if parsed.status() != 200 {
            return Err(ApiError::Status(parsed.status()));
        }
        Ok(parsed)
    }
}

/// Envelope types carrying the API's own status code
pub trait HasStatus {
    fn status(&self) -> i64;
}

#[derive(Debug, Clone, Deserialize)]
pub struct TiktokResponse {
    pub status: i64,
    #[serde(default)]
    pub data: TiktokData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TiktokData {
    #[serde(default)]
    pub title: String,
    pub video: Option<TiktokVideo>,
    #[serde(default)]
    pub images: Vec<TiktokImage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TiktokVideo {
    #[serde(default)]
    pub no_watermark: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TiktokImage {
    pub url: String,
}

impl HasStatus for TiktokResponse {
    fn status(&self) -> i64 {
        self.status
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstagramResponse {
    pub status: i64,
    #[serde(default)]
    pub data: Vec<String>,
}

impl HasStatus for InstagramResponse {
    fn status(&self) -> i64 {
        self.status
    }
}

/// Client for the media downloader HTTP API
pub struct DownloaderApi {
    client: reqwest::Client,
    probe_client: reqwest::Client,
    base_url: String,
}

impl DownloaderApi {
    pub fn new(config: &DownloaderConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let probe_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            probe_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `GET {base}/{endpoint}?{params}`
    pub async fn get(
        &self,
        endpoint: &str,
        params: &HashMap<&str, &str>,
    ) -> Result<ApiResponse, ApiError> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        debug!("Downloader request: {} {:?}", url, params);

        let response = self.client.get(&url).query(params).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse { status, body })
    }

    /// Fetch an arbitrary URL into memory.
    pub async fn fetch_buffer(
        &self,
        url: &str,
        headers: &HashMap<&str, &str>,
    ) -> Result<Vec<u8>, ApiError> {
        let mut request = self.client.get(url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Content type of a remote resource, from a HEAD probe.
    pub async fn content_type(&self, url: &str) -> Result<String, ApiError> {
        let response = self.probe_client.head(url).send().await?.error_for_status()?;
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
            .ok_or(ApiError::MissingContentType)
    }
}
