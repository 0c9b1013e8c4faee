//! Failure taxonomy and the mapping to client-visible error codes
//!
//! Everything that can go wrong inside a session ends up as a [`Failure`].
//! [`translate`] is the only place that decides what (if anything) the client
//! is told about it; raw diagnostics stay in the logs.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Closed set of error codes sent to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AuthRequired,
    InvalidToken,
    AuthTimeout,
    InvalidMessage,
    RecognitionError,
    ProcessingError,
    Timeout,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthRequired => "auth_required",
            ErrorCode::InvalidToken => "invalid_token",
            ErrorCode::AuthTimeout => "auth_timeout",
            ErrorCode::InvalidMessage => "invalid_message",
            ErrorCode::RecognitionError => "recognition_error",
            ErrorCode::ProcessingError => "processing_error",
            ErrorCode::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-facing error: a code plus an optional sanitized message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub code: ErrorCode,
    pub message: Option<String>,
}

impl SessionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// Error that carries only its code (auth failures)
    pub fn bare(code: ErrorCode) -> Self {
        Self {
            code,
            message: None,
        }
    }
}

/// Why the auth gate refused a connection
#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("first message was not an auth frame")]
    Required,
    #[error("token rejected")]
    InvalidToken,
    #[error("token verification failed: {0}")]
    Verifier(anyhow::Error),
    #[error("no auth frame within {0:?}")]
    Timeout(Duration),
    #[error("connection closed during auth")]
    Disconnected,
}

/// Internal failure causes
#[derive(Debug, Error)]
pub enum Failure {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthFailure),
    #[error("malformed control frame: {0}")]
    MalformedFrame(String),
    #[error("recognition backend failed: {0:#}")]
    Backend(anyhow::Error),
    #[error("session exceeded maximum duration of {0:?}")]
    Timeout(Duration),
    #[error("worker pipeline failed: {0}")]
    Pipeline(String),
    #[error("transport closed")]
    TransportClosed,
    #[error("session cancelled")]
    Cancelled,
}

/// Map a failure to what the client sees. `None` means stay silent.
pub fn translate(failure: &Failure) -> Option<SessionError> {
    match failure {
        Failure::Auth(auth) => match auth {
            AuthFailure::Required => Some(SessionError::bare(ErrorCode::AuthRequired)),
            AuthFailure::InvalidToken | AuthFailure::Verifier(_) => {
                Some(SessionError::bare(ErrorCode::InvalidToken))
            }
            AuthFailure::Timeout(_) => Some(SessionError::bare(ErrorCode::AuthTimeout)),
            AuthFailure::Disconnected => None,
        },
        Failure::MalformedFrame(_) => Some(SessionError::new(
            ErrorCode::InvalidMessage,
            "Control frame could not be understood",
        )),
        Failure::Backend(_) => Some(SessionError::new(
            ErrorCode::RecognitionError,
            "Speech recognition failed",
        )),
        Failure::Timeout(limit) => Some(SessionError::new(
            ErrorCode::Timeout,
            format!(
                "Session timed out (maximum {} seconds)",
                limit.as_secs()
            ),
        )),
        Failure::Pipeline(_) => Some(SessionError::new(
            ErrorCode::ProcessingError,
            "Failed to process recognition results",
        )),
        Failure::TransportClosed | Failure::Cancelled => None,
    }
}
