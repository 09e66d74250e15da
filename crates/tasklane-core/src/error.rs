//! Error taxonomy for calls against the remote API.
//!
//! Classification follows the response status: 401 may be recovered once by
//! the session client, 429 is never retried, everything else is surfaced to
//! the caller unchanged.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tasklane_shared::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No response was received (DNS, connect, TLS, timeout, broken body).
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unauthorized{}", fmt_message(message))]
    Unauthorized { message: Option<String> },

    #[error("rate limited{}", fmt_message(message))]
    RateLimited {
        message: Option<String>,
        retry_after: Option<Duration>,
    },

    #[error("request rejected with {status}{}", fmt_message(message))]
    Client {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("server error {status}{}", fmt_message(message))]
    Server {
        status: StatusCode,
        message: Option<String>,
    },

    /// The credential could not be refreshed; local session state was cleared.
    #[error("session refresh failed: {source}")]
    RefreshFailed {
        #[source]
        source: Box<ApiError>,
    },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

fn fmt_message(message: &Option<String>) -> String {
    match message {
        Some(text) => format!(": {text}"),
        None => String::new(),
    }
}

impl ApiError {
    /// Builds the error for a non-success response from its status, headers
    /// and raw body.
    pub fn from_response(status: StatusCode, headers: &HeaderMap, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.text().map(ToString::to_string));

        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized { message },
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited {
                message,
                retry_after: parse_retry_after(headers),
            },
            s if s.is_server_error() => Self::Server { status, message },
            _ => Self::Client { status, message },
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::RefreshFailed { source } => source.status(),
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Text shown to the user: the server's own explanation when it sent
    /// one, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Unauthorized { message }
            | Self::RateLimited { message, .. }
            | Self::Client { message, .. }
            | Self::Server { message, .. } => {
                message.clone().unwrap_or_else(|| fallback.to_string())
            }
            Self::RefreshFailed { .. } => "Session expired, please log in again".to_string(),
            Self::Validation(text) => text.clone(),
            Self::Transport(_) | Self::Decode(_) | Self::Storage(_) => fallback.to_string(),
        }
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|text| text.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
