use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// The one refresh credential a principal may currently use. Only a digest of
/// the token is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRecord {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl RefreshRecord {
    pub fn new(token: &RefreshToken, expires_at: DateTime<Utc>) -> Self {
        RefreshRecord {
            token_hash: refresh_token_hash(token),
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub fn refresh_token_hash(token: &RefreshToken) -> String {
    let digest = Sha256::digest(token.0.as_bytes());
    hex::encode(digest.as_slice())
}

#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Overwrite the principal's record in a single atomic write.
    async fn replace_refresh(
        &self,
        principal: Principal,
        record: RefreshRecord,
    ) -> Result<(), AuthError>;

    async fn current_refresh(&self, principal: Principal)
    -> Result<Option<RefreshRecord>, AuthError>;

    /// Install `next` only if the stored hash still equals `expected_hash`.
    /// Returns whether the swap happened.
    async fn compare_and_swap_refresh(
        &self,
        principal: Principal,
        expected_hash: &str,
        next: RefreshRecord,
    ) -> Result<bool, AuthError>;

    /// Idempotent.
    async fn clear_refresh(&self, principal: Principal) -> Result<(), AuthError>;
}
