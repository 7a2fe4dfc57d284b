use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity a credential is bound to. Never changes once issued.
#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct Principal(pub uuid::Uuid);

impl Principal {
    pub fn generate() -> Self {
        Principal(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Principal {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(Principal)
    }
}

/// Public profile returned alongside credentials. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalInfo {
    pub id: Principal,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}
