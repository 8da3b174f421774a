use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Classified failure of a single API exchange.
///
/// Every variant carries the user-facing message: the backend's own text when
/// it sent one, a fixed fallback otherwise.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ValidationFailed(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    ServerError(String),

    #[error("{message}")]
    Unclassified { status: Option<u16>, message: String },

    #[error("{message}")]
    TransientConnectivity { timed_out: bool, message: String },
}

/// Fieldless tag of an [`ApiError`], used by notification sinks and callers
/// that only care about the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ErrorCategory {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    ValidationFailed,
    RateLimited,
    ServerError,
    Unclassified,
    TransientConnectivity,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Unauthenticated => "unauthenticated",
            ErrorCategory::Forbidden => "forbidden",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::ValidationFailed => "validation_failed",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::Unclassified => "unclassified",
            ErrorCategory::TransientConnectivity => "transient_connectivity",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const SESSION_EXPIRED: &str = "Session expired, please log in again";
const PERMISSION_DENIED: &str = "Permission denied";
const RESOURCE_NOT_FOUND: &str = "The requested resource does not exist";
const RESOURCE_CONFLICT: &str = "Resource already exists";
const INVALID_PARAMETERS: &str = "Invalid request parameters";
const TOO_MANY_REQUESTS: &str = "Too many requests, please try again later";
const INTERNAL_SERVER_ERROR: &str = "Internal server error";
const REQUEST_FAILED: &str = "Request failed";
const REQUEST_TIMED_OUT: &str = "Request timed out, please try again later";
const NETWORK_UNREACHABLE: &str = "Network error, please check your connection";

/// Maximum length for backend-supplied messages carried in errors
const MAX_MESSAGE_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a backend message to avoid surfacing excessive data
    fn truncate_message(message: &str) -> String {
        if message.len() <= MAX_MESSAGE_LENGTH {
            return message.to_string();
        }
        let mut end = MAX_MESSAGE_LENGTH;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &message[..end], message.len())
    }

    /// Pull the human-readable message out of a FastAPI-style error body.
    ///
    /// Accepts `{"detail": "..."}`, `{"detail": {"message": "..."}}` and the
    /// validation shape `{"detail": [{"msg": "..."}]}`.
    pub fn backend_message(body: &str) -> Option<String> {
        let value: Value = serde_json::from_str(body).ok()?;
        let detail = value.get("detail")?;
        let message = match detail {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get("message").and_then(Value::as_str),
            Value::Array(items) => items
                .first()
                .and_then(|item| item.get("msg"))
                .and_then(Value::as_str),
            _ => None,
        }?;
        let message = message.trim();
        if message.is_empty() {
            None
        } else {
            Some(Self::truncate_message(message))
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let backend = Self::backend_message(body);
        let message = |fallback: &str| backend.clone().unwrap_or_else(|| fallback.to_string());
        match status.as_u16() {
            401 => ApiError::Unauthenticated(message(SESSION_EXPIRED)),
            403 => ApiError::Forbidden(message(PERMISSION_DENIED)),
            404 => ApiError::NotFound(message(RESOURCE_NOT_FOUND)),
            409 => ApiError::Conflict(message(RESOURCE_CONFLICT)),
            422 => ApiError::ValidationFailed(message(INVALID_PARAMETERS)),
            429 => ApiError::RateLimited(message(TOO_MANY_REQUESTS)),
            500 => ApiError::ServerError(message(INTERNAL_SERVER_ERROR)),
            code => ApiError::Unclassified {
                status: Some(code),
                message: message(REQUEST_FAILED),
            },
        }
    }

    /// Classify a failure where no response was received at all.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::TransientConnectivity {
                timed_out: true,
                message: REQUEST_TIMED_OUT.to_string(),
            }
        } else {
            ApiError::TransientConnectivity {
                timed_out: false,
                message: NETWORK_UNREACHABLE.to_string(),
            }
        }
    }

    /// A success response whose body could not be decoded.
    pub fn invalid_body(status: StatusCode, detail: impl std::fmt::Display) -> Self {
        ApiError::Unclassified {
            status: Some(status.as_u16()),
            message: Self::truncate_message(&format!("Invalid response: {}", detail)),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Unauthenticated(_) => ErrorCategory::Unauthenticated,
            ApiError::Forbidden(_) => ErrorCategory::Forbidden,
            ApiError::NotFound(_) => ErrorCategory::NotFound,
            ApiError::Conflict(_) => ErrorCategory::Conflict,
            ApiError::ValidationFailed(_) => ErrorCategory::ValidationFailed,
            ApiError::RateLimited(_) => ErrorCategory::RateLimited,
            ApiError::ServerError(_) => ErrorCategory::ServerError,
            ApiError::Unclassified { .. } => ErrorCategory::Unclassified,
            ApiError::TransientConnectivity { .. } => ErrorCategory::TransientConnectivity,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Unauthenticated(m)
            | ApiError::Forbidden(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::ValidationFailed(m)
            | ApiError::RateLimited(m)
            | ApiError::ServerError(m) => m,
            ApiError::Unclassified { message, .. }
            | ApiError::TransientConnectivity { message, .. } => message,
        }
    }

    /// HTTP status the error was classified from, if a response arrived.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthenticated(_) => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::Conflict(_) => Some(409),
            ApiError::ValidationFailed(_) => Some(422),
            ApiError::RateLimited(_) => Some(429),
            ApiError::ServerError(_) => Some(500),
            ApiError::Unclassified { status, .. } => *status,
            ApiError::TransientConnectivity { .. } => None,
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ApiError::Unauthenticated(_))
    }
}
