use crate::application_port::*;
use crate::domain_model::Principal;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub access_audience: String,
    pub refresh_audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub access_key: Vec<u8>,
    pub refresh_key: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String, // keeps two tokens minted in the same second distinct
}

struct KeySpec<'a> {
    key: &'a [u8],
    audience: &'a str,
    ttl: Duration,
}

fn encode_claims(
    principal: Principal,
    spec: &KeySpec<'_>,
    issuer: &str,
    now: DateTime<Utc>,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let exp_dt = now + spec.ttl;
    let claims = Claims {
        sub: principal.to_string(),
        exp: exp_dt.timestamp(),
        iat: now.timestamp(),
        iss: issuer.to_string(),
        aud: spec.audience.to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(spec.key),
    )
    .map_err(|e| AuthError::InternalError(e.to_string()))?;
    Ok((token, exp_dt))
}

/// Decodes and checks signature, issuer, audience and expiry with zero leeway.
fn decode_claims(token: &str, spec: &KeySpec<'_>, issuer: &str) -> Result<Claims, ErrorKind> {
    let mut v = Validation::new(Algorithm::HS256);
    v.validate_exp = true;
    v.leeway = 0;
    v.set_audience(&[spec.audience]);
    v.set_issuer(&[issuer]);
    v.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
    decode::<Claims>(token, &DecodingKey::from_secret(spec.key), &v)
        .map(|data| data.claims)
        .map_err(|e| e.into_kind())
}

pub struct JwtHs256Codec {
    cfg: JwtConfig,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig) -> Self {
        JwtHs256Codec { cfg }
    }

    fn access_spec(&self) -> KeySpec<'_> {
        KeySpec {
            key: &self.cfg.access_key,
            audience: &self.cfg.access_audience,
            ttl: self.cfg.access_ttl,
        }
    }

    fn refresh_spec(&self) -> KeySpec<'_> {
        KeySpec {
            key: &self.cfg.refresh_key,
            audience: &self.cfg.refresh_audience,
            ttl: self.cfg.refresh_ttl,
        }
    }

    pub(crate) fn issue_access_token_at(
        &self,
        principal: Principal,
        now: DateTime<Utc>,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError> {
        let (token, exp) = encode_claims(principal, &self.access_spec(), &self.cfg.issuer, now)?;
        Ok((AccessToken(token), exp))
    }

    pub(crate) fn issue_refresh_token_at(
        &self,
        principal: Principal,
        now: DateTime<Utc>,
    ) -> Result<(RefreshToken, DateTime<Utc>), AuthError> {
        let (token, exp) = encode_claims(principal, &self.refresh_spec(), &self.cfg.issuer, now)?;
        Ok((RefreshToken(token), exp))
    }

    #[inline]
    fn verified(claims: Claims) -> Option<TokenVerifyResult> {
        let principal = claims.sub.parse::<Principal>().ok()?;
        Some(TokenVerifyResult {
            principal,
            jti: claims.jti,
        })
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtHs256Codec {
    async fn issue_access_token(
        &self,
        principal: Principal,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError> {
        self.issue_access_token_at(principal, Utc::now())
    }

    async fn issue_refresh_token(
        &self,
        principal: Principal,
    ) -> Result<(RefreshToken, DateTime<Utc>), AuthError> {
        self.issue_refresh_token_at(principal, Utc::now())
    }

    async fn verify_access_token(
        &self,
        token: &AccessToken,
    ) -> Result<TokenVerifyResult, AuthError> {
        let claims = decode_claims(&token.0, &self.access_spec(), &self.cfg.issuer).map_err(
            |kind| match kind {
                ErrorKind::ExpiredSignature => AuthError::Unauthenticated(TokenFault::Expired),
                _ => AuthError::Unauthenticated(TokenFault::Invalid),
            },
        )?;
        Self::verified(claims).ok_or(AuthError::Unauthenticated(TokenFault::Invalid))
    }

    async fn verify_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<TokenVerifyResult, AuthError> {
        let claims = decode_claims(&token.0, &self.refresh_spec(), &self.cfg.issuer).map_err(
            |kind| match kind {
                ErrorKind::ExpiredSignature => AuthError::RefreshInvalid(RefreshFault::Expired),
                _ => AuthError::RefreshInvalid(RefreshFault::Invalid),
            },
        )?;
        Self::verified(claims).ok_or(AuthError::RefreshInvalid(RefreshFault::Invalid))
    }

    fn access_ttl(&self) -> Duration {
        self.cfg.access_ttl
    }
}
