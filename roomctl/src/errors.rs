//! Error taxonomy and the uniform error envelope returned to the browser.
//!
//! Every failure the proxy can report is a variant of [`Error`]. Each variant carries a stable
//! machine-readable code, an HTTP status and a user-facing message; rendering it through
//! [`IntoResponse`] produces an [`ErrorEnvelope`] JSON body:
//!
//! ```json
//! { "error": "file_too_large", "message": "File is too large. Max allowed size is 10 MB." }
//! ```
//!
//! Four classes of error exist:
//!
//! - **Configuration**: the upstream API key is missing or not a sandbox key.
//! - **Validation**: bad variant, color, file type, empty or oversized upload. These short-circuit
//!   before any upstream call.
//! - **Transport**: the upstream could not be reached at all (`network_error`, 502).
//! - **Upstream rejection**: the upstream answered with a non-2xx status, which is passed through.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error as ThisError;

/// Upstream error details longer than this many characters are truncated.
pub const MAX_DETAIL_CHARS: usize = 800;

/// Which local endpoint an upstream call was made for. Selects message wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `POST /api/remove-bg`, forwarded to the segment API
    RemoveBackground,
    /// `POST /api/advanced-edit`, forwarded to the image editing API
    AdvancedEdit,
}

#[derive(ThisError, Debug)]
pub enum Error {
    /// No upstream API key configured
    #[error("upstream API key is not configured")]
    MissingApiKey,

    /// Sandbox mode is required but the key is a live key
    #[error("sandbox mode is required but the API key is not a sandbox key")]
    SandboxKeyRequired,

    #[error("invalid output variant {value:?}")]
    InvalidOutputVariant { value: String },

    /// HEIC/HEIF sent to the advanced edit path
    #[error("HEIC/HEIF upload rejected on the advanced edit path")]
    UnsupportedAdvancedFormat,

    #[error("unsupported upload type {content_type:?} for file {filename:?}")]
    InvalidFileType {
        endpoint: Endpoint,
        content_type: String,
        filename: String,
    },

    #[error("uploaded file is empty")]
    EmptyUpload,

    #[error("upload exceeds {max_bytes} bytes")]
    FileTooLarge { max_bytes: u64 },

    #[error("invalid background color {value:?}")]
    InvalidBackgroundColor { value: String },

    #[error("background color {color} is not an allowed swatch")]
    UnsupportedBackgroundColor { color: String },

    /// Multipart body did not contain an `image_file` part
    #[error("multipart body has no image_file part")]
    MissingImageFile,

    #[error("malformed multipart body: {message}")]
    InvalidMultipart { message: String },

    /// No response was received from the upstream
    #[error("could not reach upstream: {source}")]
    Network {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream responded with a non-success status
    #[error("upstream responded with status {status}")]
    Upstream { endpoint: Endpoint, status: u16, detail: Option<String> },
}

/// The fixed-shape JSON body returned for every failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Stable machine-readable error code
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Error {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingApiKey => "missing_api_key",
            Error::SandboxKeyRequired => "sandbox_key_required",
            Error::InvalidOutputVariant { .. } => "invalid_output_variant",
            Error::UnsupportedAdvancedFormat => "unsupported_advanced_format",
            Error::InvalidFileType { .. } => "invalid_file_type",
            Error::EmptyUpload => "empty_upload",
            Error::FileTooLarge { .. } => "file_too_large",
            Error::InvalidBackgroundColor { .. } => "invalid_background_color",
            Error::UnsupportedBackgroundColor { .. } => "unsupported_background_color",
            Error::MissingImageFile => "missing_image_file",
            Error::InvalidMultipart { .. } => "invalid_multipart",
            Error::Network { .. } => "network_error",
            Error::Upstream { .. } => "photoroom_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingApiKey => StatusCode::INTERNAL_SERVER_ERROR,
            Error::SandboxKeyRequired
            | Error::InvalidOutputVariant { .. }
            | Error::EmptyUpload
            | Error::InvalidBackgroundColor { .. }
            | Error::UnsupportedBackgroundColor { .. }
            | Error::MissingImageFile
            | Error::InvalidMultipart { .. } => StatusCode::BAD_REQUEST,
            Error::UnsupportedAdvancedFormat | Error::InvalidFileType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Network { .. } => StatusCode::BAD_GATEWAY,
            Error::Upstream { status, .. } => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
        }
    }

    /// Returns the message shown to the user in the browser
    pub fn user_message(&self) -> String {
        match self {
            Error::MissingApiKey => "PHOTOROOM_API_KEY is missing in .env.".to_string(),
            Error::SandboxKeyRequired => {
                "Sandbox mode is required, but PHOTOROOM_API_KEY is not prefixed with sandbox_.".to_string()
            }
            Error::InvalidOutputVariant { .. } => {
                "Invalid output_variant. Allowed values: ghost_mannequin, lifestyle_staging.".to_string()
            }
            Error::UnsupportedAdvancedFormat => "HEIC/HEIF is supported in Remove Background mode, but not in Advanced mode (/v2/edit). \
                                                 Please convert to PNG, JPEG or WEBP."
                .to_string(),
            Error::InvalidFileType { endpoint, .. } => match endpoint {
                Endpoint::RemoveBackground => "Only image files are supported (including HEIC/HEIF).".to_string(),
                Endpoint::AdvancedEdit => "Only image files are supported.".to_string(),
            },
            Error::EmptyUpload => "Uploaded file is empty.".to_string(),
            Error::FileTooLarge { max_bytes } => {
                format!("File is too large. Max allowed size is {} MB.", max_bytes / (1024 * 1024))
            }
            Error::InvalidBackgroundColor { .. } => {
                "Invalid background color. Use a 6-digit hex color, for example #FFFFFF.".to_string()
            }
            Error::UnsupportedBackgroundColor { .. } => {
                "Unsupported background color for this demo. Use one of the predefined light swatches.".to_string()
            }
            Error::MissingImageFile => "Missing image_file in the multipart form.".to_string(),
            Error::InvalidMultipart { .. } => "Request body is not a valid multipart form.".to_string(),
            Error::Network { endpoint, .. } => match endpoint {
                Endpoint::RemoveBackground => "Could not reach Photoroom API.".to_string(),
                Endpoint::AdvancedEdit => "Could not reach Photoroom Image Editing API.".to_string(),
            },
            Error::Upstream { endpoint, status, .. } => upstream_status_message(*endpoint, *status).to_string(),
        }
    }

    /// Optional extra context appended to the message in the envelope
    pub fn detail(&self) -> Option<String> {
        match self {
            Error::SandboxKeyRequired => {
                Some("Set PHOTOROOM_REQUIRE_SANDBOX=false only if you intentionally want to use a live API key.".to_string())
            }
            Error::InvalidMultipart { message } => Some(message.clone()),
            Error::Network { source, .. } => Some(source.to_string()),
            Error::Upstream { detail, .. } => detail.clone(),
            _ => None,
        }
        .filter(|detail| !detail.is_empty())
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.code().to_string(),
            message: self.user_message(),
            detail: self.detail(),
        }
    }
}

/// Picks the user message for an upstream failure status.
///
/// 402 only has a dedicated message on the advanced edit path, where it signals a plan limit.
pub fn upstream_status_message(endpoint: Endpoint, status: u16) -> &'static str {
    match (status, endpoint) {
        (401 | 403, _) => "Authentication failed with Photoroom API.",
        (402, Endpoint::AdvancedEdit) => "Photoroom API returned payment required. The /v2/edit endpoint may require a Plus plan.",
        (429, _) => "Photoroom API rate limit reached. Try again shortly.",
        (500.., _) => "Photoroom API is temporarily unavailable.",
        (_, Endpoint::RemoveBackground) => "Photoroom API rejected the request.",
        (_, Endpoint::AdvancedEdit) => "Photoroom API rejected the advanced edit request.",
    }
}

/// Extracts a human-readable detail from an upstream error body.
///
/// JSON objects contribute their `message`/`error` field as a headline and their
/// `detail`/`details` field as the detail; anything else falls back to the raw text. The result
/// is truncated to [`MAX_DETAIL_CHARS`]. Returns `None` for an empty body.
pub fn upstream_error_detail(body: &str) -> Option<String> {
    let raw = body.trim();
    if raw.is_empty() {
        return None;
    }

    let extracted = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(payload)) => {
            let headline = first_present(&payload, &["message", "error"]);
            let detail = first_present(&payload, &["detail", "details"]);
            match (headline, detail) {
                (Some(headline), Some(detail)) => Some(format!("{headline}: {detail}")),
                (None, Some(detail)) => Some(detail),
                (Some(headline), None) => Some(headline),
                (None, None) => None,
            }
        }
        _ => None,
    };

    Some(truncate_chars(extracted.as_deref().unwrap_or(raw), MAX_DETAIL_CHARS))
}

/// First field among `keys` holding a non-empty value, rendered as trimmed text.
fn first_present(payload: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find(|value| !is_empty_value(value))
        .map(|value| match value {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
        .filter(|text| !text.is_empty())
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::MissingApiKey | Error::SandboxKeyRequired => {
                tracing::error!("Proxy misconfigured: {}", self);
            }
            Error::Network { .. } => {
                tracing::warn!("Upstream unreachable: {:#}", self);
            }
            Error::Upstream { status, .. } if *status >= 500 => {
                tracing::warn!("Upstream failure: {}", self);
            }
            Error::Upstream { .. } => {
                tracing::info!("Upstream rejected request: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), Json(self.envelope())).into_response()
    }
}

/// Type alias for handler and pipeline results
pub type Result<T> = std::result::Result<T, Error>;
