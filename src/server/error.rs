//! Server call failures and their displayable pages.

use serde::Deserialize;
use thiserror::Error;

use crate::spec::{ActionSpec, PageSpec, Widget};

use super::transport::{Response, TransportError};

/// Why a server call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Transport failure or timeout. Retryable.
    #[error("network error: {0}")]
    Network(String),

    /// 5xx. Retryable up to the attempt budget.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// 4xx. The user's input or state is the problem; not retried.
    #[error("{message} ({status})")]
    User { status: u16, message: String },

    /// Malformed or unexpected response. Retrying cannot fix it.
    #[error("client error: {0}")]
    Client(String),

    /// Stopped by cancellation; nothing to display.
    #[error("cancelled")]
    Cancelled,
}

/// Optional structured error body: `{"message": "..."}`.
#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl From<TransportError> for CallError {
    fn from(e: TransportError) -> Self {
        Self::Network(e.to_string())
    }
}

impl CallError {
    /// Classify a response that is neither success nor `304`.
    pub fn from_status(response: &Response) -> Self {
        let status = response.status;
        let message = serde_json::from_slice::<ErrorBody>(&response.body)
            .map(|b| b.message)
            .unwrap_or_else(|_| format!("HTTP {status}"));
        match status {
            400..=499 => Self::User { status, message },
            500..=599 => Self::Server { status, message },
            _ => Self::Client(format!("unexpected status {status}")),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }

    /// Short class name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Server { .. } => "server",
            Self::User { .. } => "user",
            Self::Client(_) => "client",
            Self::Cancelled => "cancelled",
        }
    }

    /// Page shown in place of the one that failed to load.
    pub fn to_page(&self) -> PageSpec {
        let (title, text) = match self {
            Self::Network(_) => (
                "Connection problem",
                "Could not reach the server. Check your connection and try again.".to_string(),
            ),
            Self::Server { .. } => (
                "Server error",
                "The server ran into a problem. Try again later.".to_string(),
            ),
            Self::User { message, .. } => ("Request failed", message.clone()),
            Self::Client(_) => (
                "Unexpected response",
                "The app could not understand the server's reply.".to_string(),
            ),
            Self::Cancelled => ("Cancelled", String::new()),
        };
        PageSpec::nav(
            title,
            Widget::column(vec![
                Widget::text(text),
                Widget::button("Back", vec![ActionSpec::Pop]),
            ]),
        )
    }
}
