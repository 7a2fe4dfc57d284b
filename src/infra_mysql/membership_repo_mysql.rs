use super::util::is_unique_violation;
use crate::application_port::MembershipError;
use crate::domain_model::*;
use crate::domain_port::*;
use sqlx::{MySqlPool, Row};

pub struct MySqlMembershipRepo {
    pool: MySqlPool,
}

impl MySqlMembershipRepo {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MembershipRepo for MySqlMembershipRepo {
    async fn list(
        &self,
        principal: Principal,
        kind: ListKind,
    ) -> Result<Vec<MembershipEntry>, MembershipError> {
        let rows = sqlx::query(
            r#"
SELECT resource_id, resource_kind FROM membership
WHERE principal_id = ? AND list_kind = ?
ORDER BY added_at, seq
"#,
        )
        .bind(principal)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MembershipError::Store(format!("list membership: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let resource_id: i64 = row
                    .try_get("resource_id")
                    .map_err(|e| MembershipError::Store(format!("resource_id decode: {e}")))?;
                let resource_kind = row
                    .try_get::<&str, _>("resource_kind")
                    .map_err(|e| MembershipError::Store(format!("resource_kind decode: {e}")))?
                    .parse::<ResourceKind>()
                    .map_err(|e| MembershipError::Store(e.to_string()))?;
                Ok(MembershipEntry::new(resource_id, resource_kind))
            })
            .collect()
    }

    async fn insert(
        &self,
        principal: Principal,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<(), MembershipError> {
        let res = sqlx::query(
            r#"
INSERT INTO membership (principal_id, list_kind, resource_id, resource_kind)
VALUES (?, ?, ?, ?)
"#,
        )
        .bind(principal)
        .bind(kind.as_str())
        .bind(entry.resource_id)
        .bind(entry.resource_kind.as_str())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(MembershipError::Conflict { kind, entry }),
            Err(e) => Err(MembershipError::Store(format!("insert membership: {e}"))),
        }
    }

    async fn delete(
        &self,
        principal: Principal,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<(), MembershipError> {
        let res = sqlx::query(
            r#"
DELETE FROM membership
WHERE principal_id = ? AND list_kind = ? AND resource_id = ? AND resource_kind = ?
"#,
        )
        .bind(principal)
        .bind(kind.as_str())
        .bind(entry.resource_id)
        .bind(entry.resource_kind.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| MembershipError::Store(format!("delete membership: {e}")))?;

        if res.rows_affected() == 0 {
            return Err(MembershipError::NotFound { kind, entry });
        }
        Ok(())
    }

    async fn purge(&self, principal: Principal) -> Result<(), MembershipError> {
        sqlx::query("DELETE FROM membership WHERE principal_id = ?")
            .bind(principal)
            .execute(&self.pool)
            .await
            .map_err(|e| MembershipError::Store(format!("purge membership: {e}")))?;
        Ok(())
    }
}
