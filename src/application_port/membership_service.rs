use crate::domain_model::{ListKind, MembershipEntry, Principal};

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entry} is already in {kind}")]
    Conflict { kind: ListKind, entry: MembershipEntry },
    #[error("{entry} is not in {kind}")]
    NotFound { kind: ListKind, entry: MembershipEntry },
    #[error("store error: {0}")]
    Store(String),
}

/// Authoritative favorites/watchlist sets. Every call answers with the
/// canonical set after the operation so clients can reconcile.
#[async_trait::async_trait]
pub trait MembershipService: Send + Sync {
    async fn list(
        &self,
        principal: Principal,
        kind: ListKind,
    ) -> Result<Vec<MembershipEntry>, MembershipError>;
    async fn add(
        &self,
        principal: Principal,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<Vec<MembershipEntry>, MembershipError>;
    async fn remove(
        &self,
        principal: Principal,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<Vec<MembershipEntry>, MembershipError>;
}
