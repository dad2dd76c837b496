//! Error taxonomy for calls against the assistant backend.

use thiserror::Error;

use crate::notice::Notice;
use crate::wire::{self, ParseError};

/// Coarse grouping used to pick the message shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Authentication,
    Permission,
    NotFound,
    Validation,
    Server,
    Network,
    Malformed,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Permission => "permission",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Server => "server",
            ErrorCategory::Network => "network",
            ErrorCategory::Malformed => "malformed",
        }
    }

    fn generic_message(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => {
                "Your session is missing or has expired. Please sign in again."
            }
            ErrorCategory::Permission => "You do not have permission to perform this action.",
            ErrorCategory::NotFound => "The requested item no longer exists.",
            ErrorCategory::Validation => "The request was rejected as invalid.",
            ErrorCategory::Server => "The server failed to process the request. Try again later.",
            ErrorCategory::Network => "Cannot reach the server. Check that the backend is running.",
            ErrorCategory::Malformed => "The server returned an unexpected response.",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection refused, DNS failure, timeout.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("authentication failed: {message}")]
    Unauthorized { message: String },

    /// Any other non-2xx status. `message` comes from the JSON body when present.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("malformed response: {0}")]
    Parse(#[from] ParseError),

    /// Rejected locally before anything was sent.
    #[error("{0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = wire::error_message(body).unwrap_or_default();
        if status == 401 {
            ApiError::Unauthorized { message }
        } else {
            ApiError::Http { status, message }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Network(_) => ErrorCategory::Network,
            ApiError::Unauthorized { .. } => ErrorCategory::Authentication,
            ApiError::Http { status, .. } => match status {
                403 => ErrorCategory::Permission,
                404 => ErrorCategory::NotFound,
                400..=499 => ErrorCategory::Validation,
                _ => ErrorCategory::Server,
            },
            ApiError::Parse(_) => ErrorCategory::Malformed,
            ApiError::Validation(_) | ApiError::Io(_) => ErrorCategory::Validation,
        }
    }

    /// Message for the operator: the server's own words when it gave any.
    pub fn user_message(&self) -> String {
        let category = self.category();
        match self {
            ApiError::Unauthorized { message } if !message.is_empty() => {
                format!("{} ({})", category.generic_message(), message)
            }
            ApiError::Http { message, .. } if !message.is_empty() => message.clone(),
            ApiError::Validation(message) => message.clone(),
            ApiError::Io(e) => e.to_string(),
            _ => category.generic_message().to_string(),
        }
    }

    pub fn notice(&self, context: &str) -> Notice {
        Notice::error(format!("{}: {}", context, self.user_message()))
            .with_category(self.category())
    }
}
