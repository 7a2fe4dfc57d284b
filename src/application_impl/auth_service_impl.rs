use super::TokenIssuer;
use crate::application_port::*;
use crate::domain_model::{Principal, PrincipalInfo};
use crate::domain_port::*;
use crate::logger::*;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use std::sync::Arc;

pub struct Argon2PasswordHasher;

#[async_trait::async_trait]
impl CredentialHasher for Argon2PasswordHasher {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = argon2::password_hash::SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::InternalError(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    async fn verify_password(
        &self,
        password: &str,
        password_hash: &str,
    ) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| AuthError::InternalError(format!("invalid PHC hash: {e}")))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::InternalError(format!("verify error: {e}"))),
        }
    }
}

pub struct RealAuthService {
    user_repo: Arc<dyn UserRepo>,
    membership_repo: Arc<dyn MembershipRepo>,
    credential_hasher: Arc<dyn CredentialHasher>,
    issuer: Arc<TokenIssuer>,
    min_password_len: usize,
}

impl RealAuthService {
    pub fn new(
        user_repo: Arc<dyn UserRepo>,
        membership_repo: Arc<dyn MembershipRepo>,
        credential_hasher: Arc<dyn CredentialHasher>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            user_repo,
            membership_repo,
            credential_hasher,
            issuer,
            min_password_len: 6,
        }
    }

    fn check_password(&self, password: &str) -> Result<(), AuthError> {
        if password.len() < self.min_password_len {
            return Err(AuthError::Validation(format!(
                "password must be at least {} characters",
                self.min_password_len
            )));
        }
        Ok(())
    }

    #[inline]
    fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    fn validate_register(&self, input: &RegisterInput) -> Result<(), AuthError> {
        if input.firstname.trim().is_empty() || input.lastname.trim().is_empty() {
            return Err(AuthError::Validation("first and last name are required".into()));
        }
        if !looks_like_email(&Self::normalize_email(&input.email)) {
            return Err(AuthError::Validation("a valid email address is required".into()));
        }
        self.check_password(&input.password)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Same shape the account form enforces: `local@domain.tld`, no whitespace.
fn looks_like_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn register(&self, request: RegisterInput) -> Result<LoginResult, AuthError> {
        self.validate_register(&request)?;
        let email = Self::normalize_email(&request.email);

        if self.user_repo.get_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict("user already exists".into()));
        }

        let password_hash = self.credential_hasher.hash_password(&request.password).await?;
        let now = Utc::now();
        let record = UserRecord {
            principal: Principal::generate(),
            firstname: request.firstname.trim().to_string(),
            lastname: request.lastname.trim().to_string(),
            email,
            password_hash,
            is_admin: false,
            created_at: now,
            last_login: Some(now),
        };
        self.user_repo.create(&record).await?;

        let tokens = self.issuer.issue(record.principal).await?;
        info!(principal = %record.principal, "registered");

        Ok(LoginResult {
            principal: record.info(),
            tokens,
        })
    }

    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError> {
        if request.email.trim().is_empty() || request.password.is_empty() {
            return Err(AuthError::Validation("email and password are required".into()));
        }

        let rec = self
            .user_repo
            .get_by_email(&Self::normalize_email(&request.email))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let ok = self
            .credential_hasher
            .verify_password(&request.password, &rec.password_hash)
            .await?;
        if !ok {
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.issuer.issue(rec.principal).await?;
        self.user_repo
            .touch_last_login(rec.principal, Utc::now())
            .await?;
        info!(principal = %rec.principal, "logged in");

        Ok(LoginResult {
            principal: rec.info(),
            tokens,
        })
    }

    async fn verify_access(&self, token: &str) -> Result<Principal, AuthError> {
        self.issuer.verify_access(token).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshResult, AuthError> {
        self.issuer.refresh(refresh_token).await
    }

    async fn logout(&self, principal: Principal) -> Result<(), AuthError> {
        self.issuer.revoke(principal).await?;
        info!(%principal, "logged out");
        Ok(())
    }

    async fn profile(&self, principal: Principal) -> Result<PrincipalInfo, AuthError> {
        self.user_repo
            .get_by_principal(principal)
            .await?
            .map(|rec| rec.info())
            .ok_or_else(|| AuthError::NotFound("user not found".into()))
    }

    async fn update_profile(
        &self,
        principal: Principal,
        update: ProfileUpdate,
    ) -> Result<ProfileUpdateResult, AuthError> {
        let mut rec = self
            .user_repo
            .get_by_principal(principal)
            .await?
            .ok_or_else(|| AuthError::NotFound("user not found".into()))?;

        if let Some(firstname) = non_blank(update.firstname.as_deref()) {
            rec.firstname = firstname.to_string();
        }
        if let Some(lastname) = non_blank(update.lastname.as_deref()) {
            rec.lastname = lastname.to_string();
        }
        if let Some(email) = non_blank(update.email.as_deref()) {
            let email = Self::normalize_email(email);
            if !looks_like_email(&email) {
                return Err(AuthError::Validation("a valid email address is required".into()));
            }
            if email != rec.email && self.user_repo.get_by_email(&email).await?.is_some() {
                return Err(AuthError::Conflict("email already in use".into()));
            }
            rec.email = email;
        }
        let password = update.password.filter(|p| !p.is_empty());
        if let Some(password) = &password {
            self.check_password(password)?;
            rec.password_hash = self.credential_hasher.hash_password(password).await?;
        }

        self.user_repo.update(&rec).await?;
        // A new password ends every other session of the principal.
        let tokens = match password {
            Some(_) => Some(self.issuer.issue(principal).await?),
            None => None,
        };
        info!(%principal, password_changed = tokens.is_some(), "profile updated");

        Ok(ProfileUpdateResult {
            principal: rec.info(),
            tokens,
        })
    }

    async fn delete_account(&self, principal: Principal) -> Result<(), AuthError> {
        if self.user_repo.get_by_principal(principal).await?.is_none() {
            return Err(AuthError::NotFound("user not found".into()));
        }

        self.issuer.revoke(principal).await?;
        self.membership_repo
            .purge(principal)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        if !self.user_repo.delete(principal).await? {
            return Err(AuthError::NotFound("user not found".into()));
        }
        info!(%principal, "account deleted");
        Ok(())
    }
}
