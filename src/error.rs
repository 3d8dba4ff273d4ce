// Error handling module
// Defines the errors surfaced to every caller of the API client

use thiserror::Error;

use crate::auth::RefreshError;

/// Maximum length for error response bodies kept in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Errors that can occur while talking to the TurboLink backend
#[derive(Error, Debug)]
pub enum ApiError {
    /// Network failure or timeout, passed through untouched
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("TurboLink API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// The access token expired and could not be renewed
    #[error("Token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Input rejected before any request was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Build a status error from an error response, reading the backend's
    /// `{"message": ...}` field when present
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::from_status(status, &body)
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        ApiError::Status {
            status,
            message: message_from_body(body),
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Refresh(RefreshError::Rejected { status, .. }) => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Status { status: 401, .. })
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, ApiError::Status { status: 403, .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Transport(e) if e.is_timeout())
    }

    /// Backend message key (e.g. `urlDisabled`) for status errors
    pub fn message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } => Some(message.as_str()),
            _ => None,
        }
    }
}

/// Pull the backend's `message` field out of an error body, else keep the raw text
pub(crate) fn message_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| truncate_body(body))
}

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }

    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
