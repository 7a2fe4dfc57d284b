use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;

const REFRESH_SWAP: &str = include_str!("refresh_swap.lua");

/// One hash per principal: `h` = token digest, `exp` = unix expiry. Redis
/// expires the key at the same instant.
pub struct RedisCredentialStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisCredentialStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisCredentialStore {
            conn,
            prefix: prefix.into(),
        }
    }

    fn key(&self, principal: Principal) -> String {
        format!("{}:refresh:{}", self.prefix, principal)
    }

    fn parse_record(fields: HashMap<String, String>) -> Result<Option<RefreshRecord>, AuthError> {
        let (Some(token_hash), Some(exp)) = (fields.get("h"), fields.get("exp")) else {
            return Ok(None);
        };
        let secs: i64 = exp
            .parse()
            .map_err(|e| AuthError::Store(format!("bad refresh expiry {exp:?}: {e}")))?;
        let expires_at = DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| AuthError::Store(format!("refresh expiry out of range: {secs}")))?;
        Ok(Some(RefreshRecord {
            token_hash: token_hash.clone(),
            expires_at,
        }))
    }
}

#[async_trait::async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn replace_refresh(
        &self,
        principal: Principal,
        record: RefreshRecord,
    ) -> Result<(), AuthError> {
        let key = self.key(principal);
        let exp = record.expires_at.timestamp();
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .hset_multiple(
                &key,
                &[("h", record.token_hash.clone()), ("exp", exp.to_string())],
            )
            .ignore()
            .expire_at(&key, exp)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(())
    }

    async fn current_refresh(
        &self,
        principal: Principal,
    ) -> Result<Option<RefreshRecord>, AuthError> {
        let key = self.key(principal);
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(&key)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Self::parse_record(fields)
    }

    async fn compare_and_swap_refresh(
        &self,
        principal: Principal,
        expected_hash: &str,
        next: RefreshRecord,
    ) -> Result<bool, AuthError> {
        let key = self.key(principal);
        let mut conn = self.conn.clone();
        let swapped: i64 = Script::new(REFRESH_SWAP)
            .key(&key)
            .arg(expected_hash)
            .arg(&next.token_hash)
            .arg(next.expires_at.timestamp())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(swapped == 1)
    }

    async fn clear_refresh(&self, principal: Principal) -> Result<(), AuthError> {
        let key = self.key(principal);
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(&key)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_fields() {
        let mut fields = HashMap::new();
        fields.insert("h".to_string(), "abc".to_string());
        fields.insert("exp".to_string(), "1700000000".to_string());
        let record = RedisCredentialStore::parse_record(fields).unwrap().unwrap();
        assert_eq!(record.token_hash, "abc");
        assert_eq!(record.expires_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn missing_key_is_no_record() {
        assert!(
            RedisCredentialStore::parse_record(HashMap::new())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn corrupt_expiry_is_a_store_error() {
        let mut fields = HashMap::new();
        fields.insert("h".to_string(), "abc".to_string());
        fields.insert("exp".to_string(), "soon".to_string());
        assert!(matches!(
            RedisCredentialStore::parse_record(fields),
            Err(AuthError::Store(_))
        ));
    }
}
