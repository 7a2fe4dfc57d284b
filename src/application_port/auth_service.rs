use crate::domain_model::{Principal, PrincipalInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why an access credential was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFault {
    Missing,
    Expired,
    Invalid,
}

/// Why a refresh credential was refused. All of them end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshFault {
    Expired,
    Invalid,
    /// Well signed and unexpired, but no longer the principal's current one.
    Revoked,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unauthenticated: {0:?}")]
    Unauthenticated(TokenFault),
    #[error("refresh token rejected: {0:?}")]
    RefreshInvalid(RefreshFault),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Blank or absent fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// `tokens` is a fresh pair when the password changed; every earlier refresh
/// token of the principal is dead by then.
#[derive(Debug, Clone)]
pub struct ProfileUpdateResult {
    pub principal: PrincipalInfo,
    pub tokens: Option<AuthTokens>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub principal: PrincipalInfo,
    pub tokens: AuthTokens,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub access_token_ttl_secs: u64,
    pub refresh_token_expires_at: DateTime<Utc>,
}

/// Outcome of a refresh call. `refresh_token` is only present when rotation is on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResult {
    pub access_token: AccessToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub access_token_ttl_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,
}

#[derive(Debug, Clone)]
pub struct TokenVerifyResult {
    pub principal: Principal,
    pub jti: String,
}

/// Signs and checks credentials. Knows nothing about stored state.
#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn issue_access_token(
        &self,
        principal: Principal,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError>;
    async fn issue_refresh_token(
        &self,
        principal: Principal,
    ) -> Result<(RefreshToken, DateTime<Utc>), AuthError>;
    async fn verify_access_token(&self, token: &AccessToken)
    -> Result<TokenVerifyResult, AuthError>;
    async fn verify_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<TokenVerifyResult, AuthError>;
    fn access_ttl(&self) -> std::time::Duration;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn register(&self, request: RegisterInput) -> Result<LoginResult, AuthError>;
    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError>;
    /// Stateless; never touches the credential store.
    async fn verify_access(&self, token: &str) -> Result<Principal, AuthError>;
    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshResult, AuthError>;
    async fn logout(&self, principal: Principal) -> Result<(), AuthError>;
    async fn profile(&self, principal: Principal) -> Result<PrincipalInfo, AuthError>;
    async fn update_profile(
        &self,
        principal: Principal,
        update: ProfileUpdate,
    ) -> Result<ProfileUpdateResult, AuthError>;
    /// Revokes the refresh record and removes the account with its lists.
    async fn delete_account(&self, principal: Principal) -> Result<(), AuthError>;
}
