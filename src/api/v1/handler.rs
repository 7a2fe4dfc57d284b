use super::error::*;
use super::guard::bearer_token;
use crate::application_port::{
    AuthService, AuthTokens, LoginInput, MembershipService, ProfileUpdate, RefreshResult,
    RegisterInput,
};
use crate::domain_model::{ListKind, MembershipEntry, Principal, PrincipalInfo};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub principal: PrincipalInfo,
    pub tokens: AuthTokens,
}

pub async fn login(
    body: LoginRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let login_result = auth_service
        .login(LoginInput {
            email: body.email,
            password: body.password,
        })
        .await
        .map_err(ApiRejection::from)?;

    let response = SessionResponse {
        principal: login_result.principal,
        tokens: login_result.tokens,
    };
    Ok(warp::reply::json(&ApiResponse::ok(response)))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn register(
    body: RegisterRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = auth_service
        .register(RegisterInput {
            firstname: body.firstname,
            lastname: body.lastname,
            email: body.email,
            password: body.password,
        })
        .await
        .map_err(ApiRejection::from)?;

    let response = SessionResponse {
        principal: result.principal,
        tokens: result.tokens,
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse::ok(response)),
        StatusCode::CREATED,
    ))
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    #[serde(alias = "refreshToken")]
    refresh_token: Option<String>,
}

/// The refresh token may come in the JSON body or, failing that, as a bearer
/// credential. The body wins when both are present.
pub async fn refresh_token(
    body: Bytes,
    authorization: Option<String>,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .map_err(|e| ApiRejection::new(ApiErrorCode::ValidationError, e.to_string()))?
            .refresh_token
    };
    let token = match from_body {
        Some(token) => token,
        None => bearer_token(authorization.as_deref())
            .map_err(|_| ApiRejection::new(ApiErrorCode::RefreshInvalid, "no refresh token"))?
            .to_string(),
    };

    let refreshed: RefreshResult = auth_service
        .refresh_token(&token)
        .await
        .map_err(ApiRejection::from)?;
    Ok(warp::reply::json(&ApiResponse::ok(refreshed)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub message: String,
}

pub async fn logout(
    principal: Principal,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    auth_service
        .logout(principal)
        .await
        .map_err(ApiRejection::from)?;
    Ok(warp::reply::json(&ApiResponse::ok(LogoutResponse {
        message: "Logged out successfully".to_string(),
    })))
}

pub async fn profile(
    principal: Principal,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let info = auth_service
        .profile(principal)
        .await
        .map_err(ApiRejection::from)?;
    Ok(warp::reply::json(&ApiResponse::ok(info)))
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub principal: PrincipalInfo,
    /// Present only after a password change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<AuthTokens>,
}

pub async fn update_profile(
    principal: Principal,
    body: UpdateProfileRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let updated = auth_service
        .update_profile(
            principal,
            ProfileUpdate {
                firstname: body.firstname,
                lastname: body.lastname,
                email: body.email,
                password: body.password,
            },
        )
        .await
        .map_err(ApiRejection::from)?;

    Ok(warp::reply::json(&ApiResponse::ok(ProfileResponse {
        principal: updated.principal,
        tokens: updated.tokens,
    })))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountDeletedResponse {
    pub message: String,
}

pub async fn delete_account(
    principal: Principal,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    auth_service
        .delete_account(principal)
        .await
        .map_err(ApiRejection::from)?;
    Ok(warp::reply::json(&ApiResponse::ok(AccountDeletedResponse {
        message: "User and associated account deleted successfully".to_string(),
    })))
}

pub async fn list_members(
    kind: ListKind,
    principal: Principal,
    membership_service: Arc<dyn MembershipService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let set = membership_service
        .list(principal, kind)
        .await
        .map_err(ApiRejection::from)?;
    Ok(warp::reply::json(&ApiResponse::ok(set)))
}

pub async fn add_member(
    kind: ListKind,
    principal: Principal,
    body: MembershipEntry,
    membership_service: Arc<dyn MembershipService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let set = membership_service
        .add(principal, kind, body)
        .await
        .map_err(ApiRejection::from)?;
    Ok(warp::reply::json(&ApiResponse::ok(set)))
}

pub async fn remove_member(
    kind: ListKind,
    principal: Principal,
    body: MembershipEntry,
    membership_service: Arc<dyn MembershipService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let set = membership_service
        .remove(principal, kind, body)
        .await
        .map_err(ApiRejection::from)?;
    Ok(warp::reply::json(&ApiResponse::ok(set)))
}
