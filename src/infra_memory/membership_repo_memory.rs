use crate::application_port::MembershipError;
use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryMembershipRepo {
    sets: DashMap<(Principal, ListKind), Vec<MembershipEntry>>,
}

impl MemoryMembershipRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MembershipRepo for MemoryMembershipRepo {
    async fn list(
        &self,
        principal: Principal,
        kind: ListKind,
    ) -> Result<Vec<MembershipEntry>, MembershipError> {
        Ok(self
            .sets
            .get(&(principal, kind))
            .map(|set| set.value().clone())
            .unwrap_or_default())
    }

    async fn insert(
        &self,
        principal: Principal,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<(), MembershipError> {
        let mut set = self.sets.entry((principal, kind)).or_default();
        if set.contains(&entry) {
            return Err(MembershipError::Conflict { kind, entry });
        }
        set.push(entry);
        Ok(())
    }

    async fn delete(
        &self,
        principal: Principal,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<(), MembershipError> {
        let mut set = self.sets.entry((principal, kind)).or_default();
        let before = set.len();
        set.retain(|e| *e != entry);
        if set.len() == before {
            return Err(MembershipError::NotFound { kind, entry });
        }
        Ok(())
    }

    async fn purge(&self, principal: Principal) -> Result<(), MembershipError> {
        self.sets.retain(|(owner, _), _| *owner != principal);
        Ok(())
    }
}
