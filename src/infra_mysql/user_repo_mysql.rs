use super::util::is_unique_violation;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

pub struct MySqlUserRepo {
    pool: MySqlPool,
}

impl MySqlUserRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlUserRepo { pool }
    }

    fn row_to_record(row: MySqlRow) -> Result<UserRecord, AuthError> {
        let store = |e: sqlx::Error| AuthError::Store(e.to_string());
        Ok(UserRecord {
            principal: row.try_get("principal_id").map_err(store)?,
            firstname: row.try_get("firstname").map_err(store)?,
            lastname: row.try_get("lastname").map_err(store)?,
            email: row.try_get("email").map_err(store)?,
            password_hash: row.try_get("password_hash").map_err(store)?,
            is_admin: row.try_get("is_admin").map_err(store)?,
            created_at: row.try_get("created_at").map_err(store)?,
            last_login: row.try_get("last_login").map_err(store)?,
        })
    }
}

const SELECT_USER: &str = r#"
SELECT principal_id, firstname, lastname, email, password_hash, is_admin, created_at, last_login
FROM user_account
"#;

#[async_trait::async_trait]
impl UserRepo for MySqlUserRepo {
    async fn create(&self, record: &UserRecord) -> Result<(), AuthError> {
        let res = sqlx::query(
            r#"
INSERT INTO user_account
    (principal_id, firstname, lastname, email, password_hash, is_admin, created_at, last_login)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(record.principal)
        .bind(&record.firstname)
        .bind(&record.lastname)
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(record.is_admin)
        .bind(record.created_at)
        .bind(record.last_login)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(AuthError::Conflict("user already exists".into())),
            Err(e) => Err(AuthError::Store(e.to_string())),
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        let row_opt: Option<MySqlRow> = sqlx::query(&format!("{SELECT_USER} WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn get_by_principal(
        &self,
        principal: Principal,
    ) -> Result<Option<UserRecord>, AuthError> {
        let row_opt: Option<MySqlRow> =
            sqlx::query(&format!("{SELECT_USER} WHERE principal_id = ?"))
                .bind(principal)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AuthError::Store(e.to_string()))?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn touch_last_login(
        &self,
        principal: Principal,
        at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        sqlx::query("UPDATE user_account SET last_login = ? WHERE principal_id = ?")
            .bind(at)
            .bind(principal)
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("touch last_login: {e}")))?;
        Ok(())
    }

    async fn update(&self, record: &UserRecord) -> Result<(), AuthError> {
        let res = sqlx::query(
            r#"
UPDATE user_account
SET firstname = ?, lastname = ?, email = ?, password_hash = ?
WHERE principal_id = ?
"#,
        )
        .bind(&record.firstname)
        .bind(&record.lastname)
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(record.principal)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(AuthError::Conflict("email already in use".into())),
            Err(e) => Err(AuthError::Store(format!("update user: {e}"))),
        }
    }

    async fn delete(&self, principal: Principal) -> Result<bool, AuthError> {
        // Membership rows go with it through the foreign key.
        let res = sqlx::query("DELETE FROM user_account WHERE principal_id = ?")
            .bind(principal)
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("delete user: {e}")))?;
        Ok(res.rows_affected() > 0)
    }
}
