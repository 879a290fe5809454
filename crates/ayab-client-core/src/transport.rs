use std::time::Duration;

use async_trait::async_trait;
use ayab_proto::ReplyError;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8080/api";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("bridge base url is empty")]
    BaseUrlMissing,
    #[error("bridge request failed: {message}")]
    Request { message: String },
    #[error("bridge request timed out")]
    Timeout,
    #[error("bridge answered http {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("could not decode bridge reply: {message}")]
    Decode { message: String },
    #[error(transparent)]
    Daemon(#[from] ReplyError),
}

impl SyncError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BaseUrlMissing => "base_url_missing",
            Self::Request { .. } => "request",
            Self::Timeout => "timeout",
            Self::Http { .. } => "http",
            Self::Decode { .. } => "decode",
            Self::Daemon(_) => "daemon",
        }
    }
}

/// What the synchronizer needs from the bridge: raw daemon replies for a
/// resource, read or acted upon.
#[async_trait]
pub trait BridgeApi: Send + Sync {
    async fn get(&self, resource: &str) -> Result<Value, SyncError>;
    async fn post(&self, resource: &str, payload: Value) -> Result<Value, SyncError>;
}

#[derive(Debug, Clone)]
pub struct HttpBridgeApi {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpBridgeApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(SyncError::BaseUrlMissing);
        }
        Ok(Self {
            base_url: trimmed.trim_end_matches('/').to_string(),
            timeout,
            http: reqwest::Client::new(),
        })
    }

    #[must_use]
    pub fn endpoint(&self, resource: &str) -> String {
        let resource = resource.trim();
        if resource.starts_with('/') || resource.is_empty() {
            format!("{}{}", self.base_url, resource)
        } else {
            format!("{}/{}", self.base_url, resource)
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, SyncError> {
        let response = request
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?;
        decode_json_response(response).await
    }
}

#[async_trait]
impl BridgeApi for HttpBridgeApi {
    async fn get(&self, resource: &str) -> Result<Value, SyncError> {
        self.send(self.http.get(self.endpoint(resource))).await
    }

    async fn post(&self, resource: &str, payload: Value) -> Result<Value, SyncError> {
        self.send(self.http.post(self.endpoint(resource)).json(&payload))
            .await
    }
}

fn request_error(error: reqwest::Error) -> SyncError {
    if error.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::Request {
            message: error.to_string(),
        }
    }
}

async fn decode_json_response(response: reqwest::Response) -> Result<Value, SyncError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(request_error)?;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&bytes).trim().to_string();
        return Err(SyncError::Http {
            status,
            body: if body.is_empty() {
                "<empty>".to_string()
            } else {
                body
            },
        });
    }

    serde_json::from_slice(&bytes).map_err(|error| SyncError::Decode {
        message: error.to_string(),
    })
}
