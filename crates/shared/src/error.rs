//! Shared error types and helpers for decoding API error bodies.

use serde::Deserialize;

/// Structured error returned by the auth endpoints inside `detail`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

/// FastAPI error envelope.
///
/// `detail` is either a plain string (`HTTPException("...")`) or an
/// [`ErrorDetail`] object for the auth routes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DetailBody {
    Text { detail: String },
    Structured { detail: ErrorDetail },
}

/// Attempt to parse an error body into a user-facing message.
/// Prefers `detail.message`, falls back to a plain `detail` string.
pub fn try_error_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<DetailBody>(body).ok()?;
    let message = match parsed {
        DetailBody::Text { detail } => detail,
        DetailBody::Structured { detail } => detail.message,
    };
    if message.trim().is_empty() {
        None
    } else {
        Some(message)
    }
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// True when the server answered 401/403, i.e. there is no valid session.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Http { status: 401 | 403, .. })
    }

    /// Human readable message, using the server's `detail` when present.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http { status, body } => try_error_detail(body)
                .map(|detail| format!("HTTP {status}: {detail}"))
                .unwrap_or_else(|| self.to_string()),
            _ => self.to_string(),
        }
    }
}
