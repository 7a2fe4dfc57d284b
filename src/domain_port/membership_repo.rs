use crate::application_port::MembershipError;
use crate::domain_model::*;

#[async_trait::async_trait]
pub trait MembershipRepo: Send + Sync {
    /// Entries in insertion order.
    async fn list(
        &self,
        principal: Principal,
        kind: ListKind,
    ) -> Result<Vec<MembershipEntry>, MembershipError>;

    /// Fails with `MembershipError::Conflict` if the entry is present.
    async fn insert(
        &self,
        principal: Principal,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<(), MembershipError>;

    /// Fails with `MembershipError::NotFound` if the entry is absent.
    async fn delete(
        &self,
        principal: Principal,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<(), MembershipError>;

    /// Drops every list of `principal`. Idempotent.
    async fn purge(&self, principal: Principal) -> Result<(), MembershipError>;
}
