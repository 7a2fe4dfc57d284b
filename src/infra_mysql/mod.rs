mod membership_repo_mysql;
mod user_repo_mysql;

pub use membership_repo_mysql::*;
pub use user_repo_mysql::*;

mod util;

use sqlx::migrate::Migrator;

/// Schema under `migrations/`, applied by the mysql backend on startup.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_embedded_in_order() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert!(!versions.is_empty());
        assert!(versions.windows(2).all(|w| w[0] < w[1]));

        let init = MIGRATOR.iter().next().unwrap();
        assert!(init.sql.contains("CREATE TABLE IF NOT EXISTS user_account"));
        assert!(init.sql.contains("ON DELETE CASCADE"));
    }
}
