use crate::application_port::*;
use crate::domain_model::Principal;
use crate::domain_port::*;
use crate::logger::*;
use chrono::Utc;
use std::sync::Arc;

/// Mints and validates credential pairs.
///
/// Refresh credentials follow the stateful model: the store holds a digest of
/// the single refresh token each principal may currently use, so issuing a new
/// pair revokes the previous one.
pub struct TokenIssuer {
    codec: Arc<dyn TokenCodec>,
    store: Arc<dyn CredentialStore>,
    rotate_refresh: bool,
}

impl TokenIssuer {
    pub fn new(
        codec: Arc<dyn TokenCodec>,
        store: Arc<dyn CredentialStore>,
        rotate_refresh: bool,
    ) -> Self {
        Self {
            codec,
            store,
            rotate_refresh,
        }
    }

    pub async fn issue(&self, principal: Principal) -> Result<AuthTokens, AuthError> {
        let (access_token, access_exp) = self.codec.issue_access_token(principal).await?;
        let (refresh_token, refresh_exp) = self.codec.issue_refresh_token(principal).await?;

        self.store
            .replace_refresh(principal, RefreshRecord::new(&refresh_token, refresh_exp))
            .await?;
        debug!(%principal, "issued credential pair");

        Ok(AuthTokens {
            access_token,
            refresh_token,
            access_token_expires_at: access_exp,
            access_token_ttl_secs: self.codec.access_ttl().as_secs(),
            refresh_token_expires_at: refresh_exp,
        })
    }

    pub async fn verify_access(&self, token: &str) -> Result<Principal, AuthError> {
        let verified = self
            .codec
            .verify_access_token(&AccessToken(token.to_string()))
            .await?;
        Ok(verified.principal)
    }

    pub async fn verify_refresh(&self, token: &str) -> Result<Principal, AuthError> {
        self.check_refresh(&RefreshToken(token.to_string()))
            .await
            .map(|(principal, _)| principal)
    }

    /// Returns the principal and the stored digest the token matched.
    async fn check_refresh(&self, token: &RefreshToken) -> Result<(Principal, String), AuthError> {
        let principal = self.codec.verify_refresh_token(token).await?.principal;

        let record = self
            .store
            .current_refresh(principal)
            .await?
            .ok_or(AuthError::RefreshInvalid(RefreshFault::Revoked))?;

        let presented = refresh_token_hash(token);
        if record.token_hash != presented {
            warn!(%principal, "refresh token does not match the current session");
            return Err(AuthError::RefreshInvalid(RefreshFault::Revoked));
        }
        if record.is_expired_at(Utc::now()) {
            return Err(AuthError::RefreshInvalid(RefreshFault::Expired));
        }

        Ok((principal, presented))
    }

    pub async fn refresh(&self, token: &str) -> Result<RefreshResult, AuthError> {
        let token = RefreshToken(token.to_string());
        let (principal, presented) = self.check_refresh(&token).await?;

        let (access_token, access_exp) = self.codec.issue_access_token(principal).await?;

        let refresh_token = if self.rotate_refresh {
            let (next, next_exp) = self.codec.issue_refresh_token(principal).await?;
            // Rotation: only one of several concurrent refreshes may install its token.
            let swapped = self
                .store
                .compare_and_swap_refresh(principal, &presented, RefreshRecord::new(&next, next_exp))
                .await?;
            if !swapped {
                warn!(%principal, "lost refresh rotation race");
                return Err(AuthError::RefreshInvalid(RefreshFault::Revoked));
            }
            Some(next)
        } else {
            None
        };

        debug!(%principal, rotated = refresh_token.is_some(), "refreshed access token");
        Ok(RefreshResult {
            access_token,
            access_token_expires_at: access_exp,
            access_token_ttl_secs: self.codec.access_ttl().as_secs(),
            refresh_token,
        })
    }

    pub async fn revoke(&self, principal: Principal) -> Result<(), AuthError> {
        self.store.clear_refresh(principal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::JwtHs256Codec;
    use crate::application_impl::token_codec_jwt::tests::test_config;
    use crate::infra_memory::MemoryCredentialStore;

    fn issuer(rotate: bool) -> (TokenIssuer, Arc<JwtHs256Codec>) {
        let codec = Arc::new(JwtHs256Codec::new(test_config()));
        let issuer = TokenIssuer::new(
            codec.clone(),
            Arc::new(MemoryCredentialStore::new()),
            rotate,
        );
        (issuer, codec)
    }

    #[tokio::test]
    async fn issued_pair_verifies() {
        let (issuer, _) = issuer(false);
        let principal = Principal::generate();
        let tokens = issuer.issue(principal).await.unwrap();

        assert_eq!(tokens.access_token_ttl_secs, 30 * 60);
        assert_eq!(
            issuer.verify_access(&tokens.access_token.0).await.unwrap(),
            principal
        );
        assert_eq!(
            issuer.verify_refresh(&tokens.refresh_token.0).await.unwrap(),
            principal
        );
    }

    #[tokio::test]
    async fn second_login_revokes_first_refresh_token() {
        let (issuer, _) = issuer(false);
        let principal = Principal::generate();
        let first = issuer.issue(principal).await.unwrap();
        let second = issuer.issue(principal).await.unwrap();

        assert!(matches!(
            issuer.refresh(&first.refresh_token.0).await,
            Err(AuthError::RefreshInvalid(RefreshFault::Revoked))
        ));
        assert!(issuer.refresh(&second.refresh_token.0).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_without_rotation_keeps_refresh_token() {
        let (issuer, _) = issuer(false);
        let principal = Principal::generate();
        let tokens = issuer.issue(principal).await.unwrap();

        let refreshed = issuer.refresh(&tokens.refresh_token.0).await.unwrap();
        assert!(refreshed.refresh_token.is_none());
        assert_eq!(
            issuer.verify_access(&refreshed.access_token.0).await.unwrap(),
            principal
        );
        assert!(issuer.refresh(&tokens.refresh_token.0).await.is_ok());
    }

    #[tokio::test]
    async fn rotation_lets_exactly_one_concurrent_refresh_win() {
        let (issuer, _) = issuer(true);
        let tokens = issuer.issue(Principal::generate()).await.unwrap();

        let (a, b) = tokio::join!(
            issuer.refresh(&tokens.refresh_token.0),
            issuer.refresh(&tokens.refresh_token.0)
        );
        let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(winners, 1);

        let rotated = a.or(b).unwrap().refresh_token.unwrap();
        assert!(issuer.verify_refresh(&rotated.0).await.is_ok());
        assert!(matches!(
            issuer.verify_refresh(&tokens.refresh_token.0).await,
            Err(AuthError::RefreshInvalid(RefreshFault::Revoked))
        ));
    }

    #[tokio::test]
    async fn revoked_session_cannot_refresh() {
        let (issuer, _) = issuer(false);
        let principal = Principal::generate();
        let tokens = issuer.issue(principal).await.unwrap();
        issuer.revoke(principal).await.unwrap();
        issuer.revoke(principal).await.unwrap();

        assert!(matches!(
            issuer.refresh(&tokens.refresh_token.0).await,
            Err(AuthError::RefreshInvalid(RefreshFault::Revoked))
        ));
    }

    #[tokio::test]
    async fn expired_refresh_token_reports_expired() {
        let (issuer, codec) = issuer(false);
        let long_ago = Utc::now() - chrono::Duration::days(3);
        let (stale, _) = codec
            .issue_refresh_token_at(Principal::generate(), long_ago)
            .unwrap();

        assert!(matches!(
            issuer.refresh(&stale.0).await,
            Err(AuthError::RefreshInvalid(RefreshFault::Expired))
        ));
    }
}
