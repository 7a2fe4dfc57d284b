use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::MembershipRepo;
use crate::logger::*;
use std::sync::Arc;

pub struct RealMembershipService {
    repo: Arc<dyn MembershipRepo>,
}

impl RealMembershipService {
    pub fn new(repo: Arc<dyn MembershipRepo>) -> Self {
        Self { repo }
    }

    fn validate(entry: &MembershipEntry) -> Result<(), MembershipError> {
        if entry.resource_id <= 0 {
            return Err(MembershipError::Validation(format!(
                "resource_id must be positive, got {}",
                entry.resource_id
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MembershipService for RealMembershipService {
    async fn list(
        &self,
        principal: Principal,
        kind: ListKind,
    ) -> Result<Vec<MembershipEntry>, MembershipError> {
        self.repo.list(principal, kind).await
    }

    async fn add(
        &self,
        principal: Principal,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<Vec<MembershipEntry>, MembershipError> {
        Self::validate(&entry)?;
        self.repo.insert(principal, kind, entry).await?;
        debug!(%principal, %kind, %entry, "added");
        self.repo.list(principal, kind).await
    }

    async fn remove(
        &self,
        principal: Principal,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<Vec<MembershipEntry>, MembershipError> {
        Self::validate(&entry)?;
        self.repo.delete(principal, kind, entry).await?;
        debug!(%principal, %kind, %entry, "removed");
        self.repo.list(principal, kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::MemoryMembershipRepo;

    fn service() -> RealMembershipService {
        RealMembershipService::new(Arc::new(MemoryMembershipRepo::new()))
    }

    #[tokio::test]
    async fn add_returns_canonical_set() {
        let service = service();
        let me = Principal::generate();
        service
            .add(me, ListKind::Favorites, MembershipEntry::movie(42))
            .await
            .unwrap();
        let set = service
            .add(me, ListKind::Favorites, MembershipEntry::tv(7))
            .await
            .unwrap();
        assert_eq!(set, vec![MembershipEntry::movie(42), MembershipEntry::tv(7)]);

        // Kinds and principals are separate sets.
        assert!(service.list(me, ListKind::Watchlist).await.unwrap().is_empty());
        assert!(
            service
                .list(Principal::generate(), ListKind::Favorites)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn duplicate_add_conflicts_and_missing_remove_is_not_found() {
        let service = service();
        let me = Principal::generate();
        let entry = MembershipEntry::movie(42);
        service.add(me, ListKind::Watchlist, entry).await.unwrap();

        assert!(matches!(
            service.add(me, ListKind::Watchlist, entry).await,
            Err(MembershipError::Conflict { .. })
        ));
        assert!(service.remove(me, ListKind::Watchlist, entry).await.unwrap().is_empty());
        assert!(matches!(
            service.remove(me, ListKind::Watchlist, entry).await,
            Err(MembershipError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn non_positive_ids_are_rejected() {
        let service = service();
        assert!(matches!(
            service
                .add(Principal::generate(), ListKind::Favorites, MembershipEntry::movie(0))
                .await,
            Err(MembershipError::Validation(_))
        ));
    }
}
