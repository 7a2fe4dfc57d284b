use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub principal: Principal,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn info(&self) -> PrincipalInfo {
        PrincipalInfo {
            id: self.principal,
            firstname: self.firstname.clone(),
            lastname: self.lastname.clone(),
            email: self.email.clone(),
            is_admin: self.is_admin,
            created_at: self.created_at,
        }
    }
}

#[async_trait::async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `AuthError::Conflict` when the email is taken.
    async fn create(&self, record: &UserRecord) -> Result<(), AuthError>;

    /// Lookup by normalized (lowercase) email, for login.
    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError>;

    async fn get_by_principal(&self, principal: Principal)
    -> Result<Option<UserRecord>, AuthError>;

    async fn touch_last_login(
        &self,
        principal: Principal,
        at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Rewrites names, email and password hash. Fails with
    /// `AuthError::Conflict` when the new email belongs to someone else.
    async fn update(&self, record: &UserRecord) -> Result<(), AuthError>;

    /// Returns whether a row was removed.
    async fn delete(&self, principal: Principal) -> Result<bool, AuthError>;
}
