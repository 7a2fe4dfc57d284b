use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use thiserror::Error;
use tracing::warn;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let (code, message) = if let Some(err) = err.find::<ApiRejection>() {
        (err.code.clone(), err.message.clone())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (ApiErrorCode::ValidationError, e.to_string())
    } else if err.is_not_found() {
        (ApiErrorCode::NotFound, "no such route".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (ApiErrorCode::NotFound, "method not allowed".to_string())
    } else {
        warn!("unhandled rejection: {:?}", err);
        (ApiErrorCode::InternalError, format!("Unhandled error: {:?}", err))
    };

    let status = code.status();
    let json = warp::reply::json(&ApiResponse::<()>::err(code, message));
    Ok(warp::reply::with_status(json, status))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

/// Wire error codes. `TokenExpired` is the only one a client should answer
/// with a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ApiErrorCode {
    #[error("No access token")]
    MissingToken,
    #[error("Access token expired")]
    TokenExpired,
    #[error("Token is not valid")]
    InvalidToken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Refresh token is expired, invalid or revoked")]
    RefreshInvalid,
    #[error("Validation failed")]
    ValidationError,
    #[error("Already exists")]
    Conflict,
    #[error("Not found")]
    NotFound,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::MissingToken
            | ApiErrorCode::TokenExpired
            | ApiErrorCode::InvalidToken
            | ApiErrorCode::InvalidCredentials
            | ApiErrorCode::RefreshInvalid => StatusCode::UNAUTHORIZED,
            ApiErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ApiErrorCode::Conflict => StatusCode::CONFLICT,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A code plus the human readable detail, carried through warp as a rejection.
#[derive(Debug)]
pub struct ApiRejection {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiRejection {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiRejection {
            code,
            message: message.into(),
        }
    }

    pub fn internal<E: std::fmt::Display>(error: E) -> Self {
        warn!("Internal error: {}", error);
        Self::new(ApiErrorCode::InternalError, ApiErrorCode::InternalError.to_string())
    }
}

impl reject::Reject for ApiRejection {}

impl From<AuthError> for ApiRejection {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Unauthenticated(TokenFault::Missing) => {
                ApiRejection::new(ApiErrorCode::MissingToken, "Not authorized, no token")
            }
            AuthError::Unauthenticated(TokenFault::Expired) => {
                ApiRejection::new(ApiErrorCode::TokenExpired, "Not authorized, token expired")
            }
            AuthError::Unauthenticated(TokenFault::Invalid) => {
                ApiRejection::new(ApiErrorCode::InvalidToken, "Not authorized, token failed")
            }
            AuthError::RefreshInvalid(fault) => ApiRejection::new(
                ApiErrorCode::RefreshInvalid,
                match fault {
                    RefreshFault::Expired => "refresh token expired",
                    RefreshFault::Invalid => "refresh token invalid",
                    RefreshFault::Revoked => "refresh token revoked",
                },
            ),
            AuthError::InvalidCredentials => {
                ApiRejection::new(ApiErrorCode::InvalidCredentials, error.to_string())
            }
            AuthError::Validation(msg) => ApiRejection::new(ApiErrorCode::ValidationError, msg),
            AuthError::Conflict(msg) => ApiRejection::new(ApiErrorCode::Conflict, msg),
            AuthError::NotFound(msg) => ApiRejection::new(ApiErrorCode::NotFound, msg),
            AuthError::Store(e) => ApiRejection::internal(e),
            AuthError::InternalError(e) => ApiRejection::internal(e),
        }
    }
}

impl From<MembershipError> for ApiRejection {
    fn from(error: MembershipError) -> Self {
        match error {
            MembershipError::Validation(msg) => {
                ApiRejection::new(ApiErrorCode::ValidationError, msg)
            }
            MembershipError::Conflict { .. } => {
                ApiRejection::new(ApiErrorCode::Conflict, error.to_string())
            }
            MembershipError::NotFound { .. } => {
                ApiRejection::new(ApiErrorCode::NotFound, error.to_string())
            }
            MembershipError::Store(e) => ApiRejection::internal(e),
        }
    }
}
