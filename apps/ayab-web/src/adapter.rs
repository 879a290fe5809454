//! Translates inbound HTTP requests into daemon envelopes and relays the
//! daemon's reply back unchanged.

use axum::body::{Body, Bytes};
use axum::extract::{Form, FromRequest, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use ayab_proto::{Envelope, EnvelopeError, decode_reply};
use thiserror::Error;
use tracing::{debug, warn};

use crate::AppState;
use crate::daemon_bridge::BridgeError;

const APPLICATION_JSON: &str = "application/json";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM: &str = "multipart/form-data";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid JSON body")]
    InvalidBody(#[source] serde_json::Error),
    #[error("invalid form body")]
    InvalidForm,
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("malformed reply from daemon")]
    MalformedReply(#[source] EnvelopeError),
    #[error("failed to encode request for daemon")]
    Encode(#[source] EnvelopeError),
}

impl AdapterError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidBody(_) => "invalid_body",
            Self::InvalidForm => "invalid_form",
            Self::Bridge(error) => error.kind(),
            Self::MalformedReply(_) => "malformed_reply",
            Self::Encode(_) => "encode",
        }
    }
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        error_response(StatusCode::OK, self.to_string())
    }
}

/// Every locally produced failure has the daemon's own error shape.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
    Multipart,
}

impl BodyKind {
    fn from_headers(headers: &HeaderMap) -> Self {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if content_type.starts_with(FORM_URLENCODED) {
            Self::Form
        } else if content_type.starts_with(MULTIPART_FORM) {
            Self::Multipart
        } else {
            Self::Json
        }
    }
}

/// Maps a request path onto the daemon resource path.
///
/// The mount root itself maps to `""`; anything below it keeps its leading
/// slash. Paths outside the mount return `None`.
pub fn logical_uri(mount_path: &str, path: &str) -> Option<String> {
    if mount_path.is_empty() {
        return Some(if path == "/" {
            String::new()
        } else {
            path.to_string()
        });
    }
    let remainder = path.strip_prefix(mount_path)?;
    if remainder.is_empty() || remainder.starts_with('/') {
        Some(remainder.to_string())
    } else {
        None
    }
}

pub async fn forward(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(logical) = logical_uri(&state.config.mount_path, uri.path()) else {
        return error_response(StatusCode::NOT_FOUND, "not found");
    };

    match relay(&state, &method, &uri, &logical, &headers, body).await {
        Ok(reply) => {
            debug!(
                method = %method,
                uri = %logical,
                daemon = %state.bridge.endpoint(),
                reply_bytes = reply.len(),
                "relayed daemon reply"
            );
            (
                StatusCode::OK,
                [(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))],
                reply,
            )
                .into_response()
        }
        Err(error) => {
            let timed_out = matches!(
                &error,
                AdapterError::Bridge(BridgeError::Unreachable {
                    timed_out: true,
                    ..
                })
            );
            warn!(
                method = %method,
                uri = %logical,
                daemon = %state.bridge.endpoint(),
                error_kind = error.kind(),
                timed_out,
                error = %error,
                "daemon request failed"
            );
            error.into_response()
        }
    }
}

async fn relay(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    logical: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Vec<u8>, AdapterError> {
    let kind = BodyKind::from_headers(headers);
    let mut params = query_params(uri);
    let mut data = None;

    match kind {
        _ if body.is_empty() => {}
        // Browser clients post JSON text under the default form content type.
        BodyKind::Form if carries_data(method) => match serde_json::from_slice(&body) {
            Ok(value) => data = Some(value),
            Err(_) => params.extend(form_params(body).await?),
        },
        BodyKind::Form => params.extend(form_params(body).await?),
        BodyKind::Json if carries_data(method) => {
            data = Some(serde_json::from_slice(&body).map_err(AdapterError::InvalidBody)?);
        }
        _ => {}
    }

    let mut envelope = Envelope::new(method.as_str(), logical).with_params(params);
    if let Some(data) = data {
        envelope = envelope.with_data(data);
    }
    let encoded = envelope.encode().map_err(AdapterError::Encode)?;

    let reply = state.bridge.call(&encoded).await?;
    decode_reply(&reply).map_err(AdapterError::MalformedReply)?;
    Ok(reply)
}

fn carries_data(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT
}

fn query_params(uri: &Uri) -> Vec<(String, String)> {
    if uri.query().is_none() {
        return Vec::new();
    }
    Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(params)| params)
        .unwrap_or_default()
}

async fn form_params(body: Bytes) -> Result<Vec<(String, String)>, AdapterError> {
    let request = Request::builder()
        .method(Method::POST)
        .header(CONTENT_TYPE, FORM_URLENCODED)
        .body(Body::from(body))
        .map_err(|_| AdapterError::InvalidForm)?;
    let Form(params) = Form::<Vec<(String, String)>>::from_request(request, &())
        .await
        .map_err(|_| AdapterError::InvalidForm)?;
    Ok(params)
}
