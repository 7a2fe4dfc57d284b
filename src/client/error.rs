use crate::api::v1::{ApiError, ApiErrorCode};
use thiserror::Error;

/// Every failure a client call can end in. Cloneable so one refresh outcome
/// can be handed to all the requests waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No usable access credential: missing, malformed, expired, or the
    /// login itself was refused. Carries the server's code.
    #[error("not authenticated: {0}")]
    Unauthenticated(ApiErrorCode),
    /// The refresh credential was rejected. The session is gone.
    #[error("session ended: refresh token rejected")]
    RefreshInvalid,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// A toggle queued behind one that failed on the same entry.
    #[error("superseded by a failed mutation on the same entry")]
    Superseded,
    #[error("session storage: {0}")]
    Storage(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
}

impl ClientError {
    pub fn from_api_error(status: u16, error: ApiError) -> Self {
        match error.code {
            ApiErrorCode::MissingToken
            | ApiErrorCode::TokenExpired
            | ApiErrorCode::InvalidToken
            | ApiErrorCode::InvalidCredentials => ClientError::Unauthenticated(error.code),
            ApiErrorCode::RefreshInvalid => ClientError::RefreshInvalid,
            ApiErrorCode::ValidationError => ClientError::Validation(error.message),
            ApiErrorCode::Conflict => ClientError::Conflict(error.message),
            ApiErrorCode::NotFound => ClientError::NotFound(error.message),
            ApiErrorCode::InternalError => ClientError::Server {
                status,
                message: error.message,
            },
        }
    }

    /// True when the session itself is over, not just this request.
    pub fn ends_session(&self) -> bool {
        matches!(self, ClientError::RefreshInvalid)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Storage(e.to_string())
    }
}
