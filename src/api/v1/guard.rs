//! Request authentication.
//!
//! The only credential carrier is `Authorization: Bearer <access token>`.
//! Access tokens are checked by signature and expiry alone, so the guard
//! never reaches the credential store.

use super::error::ApiRejection;
use crate::application_port::{AuthError, AuthService, TokenFault};
use crate::domain_model::Principal;
use std::sync::Arc;
use warp::{Filter, http};

/// Pulls the bearer credential out of an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::Unauthenticated(TokenFault::Missing))?;
    match header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AuthError::Unauthenticated(TokenFault::Invalid)),
    }
}

pub async fn authorize(
    auth_service: &dyn AuthService,
    header: Option<&str>,
) -> Result<Principal, AuthError> {
    let token = bearer_token(header)?;
    auth_service.verify_access(token).await
}

/// Extracts the authenticated [`Principal`] or rejects with a code telling
/// expiry (`TokenExpired`) apart from everything else.
pub fn authenticate(
    auth_service: Arc<dyn AuthService>,
) -> impl Filter<Extract = (Principal,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>(http::header::AUTHORIZATION.as_str()).and_then(
        move |header: Option<String>| {
            let auth_service = auth_service.clone();
            async move {
                authorize(auth_service.as_ref(), header.as_deref())
                    .await
                    .map_err(ApiRejection::from)
                    .map_err(warp::Rejection::from)
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_is_missing_token() {
        assert!(matches!(
            bearer_token(None),
            Err(AuthError::Unauthenticated(TokenFault::Missing))
        ));
    }

    #[test]
    fn non_bearer_schemes_are_invalid() {
        for header in ["Basic abc", "Bearer ", "bearer abc", "abc"] {
            assert!(
                matches!(
                    bearer_token(Some(header)),
                    Err(AuthError::Unauthenticated(TokenFault::Invalid))
                ),
                "{header}"
            );
        }
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
    }
}
