//! Generation Client - Engine Wire Contract
//!
//! One call, one request. Retrying is the user's decision.

use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, EngineConfig};
use crate::submission::Submission;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{message}")]
    RequestFailed { status: u16, message: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Could not reach the generation engine: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Engine returned a malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("The generation engine stopped unexpectedly")]
    EngineStopped,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiAsset {
    pub filename: String,
    pub content_type: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaletteEntry {
    pub number: u32,
    pub rgb: [u8; 3],
    pub hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateResponse {
    pub image: ApiAsset,
    pub preview: ApiAsset,
    pub legend: ApiAsset,
    pub palette: Vec<PaletteEntry>,
}

/// Anything able to turn a submission into generated assets.
pub trait GenerationEngine: Send + Sync + 'static {
    fn generate(
        &self,
        submission: Submission,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<GenerateResponse, ClientError>> + Send;
}

/// The remote engine over HTTP.
pub struct HttpEngine {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("paintkit/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.generate_endpoint()?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, submission: Submission) -> Result<GenerateResponse, ClientError> {
        let params = submission.parameters;
        let file = Part::bytes(submission.file.bytes().to_vec())
            .file_name(submission.file.name.clone())
            .mime_str(&submission.file.media_type)?;
        let form = Form::new()
            .part("file", file)
            .text("num_colors", params.num_colors.to_string())
            .text("max_width", params.max_width.to_string())
            .text("min_region_size", params.min_region_size.to_string());

        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(request_failed(status, &body));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl GenerationEngine for HttpEngine {
    #[tracing::instrument(skip_all, fields(file = %submission.file.name, endpoint = %self.endpoint))]
    async fn generate(
        &self,
        submission: Submission,
        cancel: CancellationToken,
    ) -> Result<GenerateResponse, ClientError> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("generation request cancelled");
                Err(ClientError::Cancelled)
            }
            result = self.send(submission) => result,
        }
    }
}

/// Build the failure for a non-2xx response.
///
/// The engine answers either plain text or `{"detail": "..."}`.
pub fn request_failed(status: StatusCode, body: &str) -> ClientError {
    let body = body.trim();
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    let message = if message.is_empty() {
        format!("Request failed with status {}", status.as_u16())
    } else {
        message
    };
    ClientError::RequestFailed {
        status: status.as_u16(),
        message,
    }
}
