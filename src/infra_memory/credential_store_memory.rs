use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Process-local credential store. Each principal's record lives behind one
/// shard lock, so every operation below is atomic per principal.
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: DashMap<Principal, RefreshRecord>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn replace_refresh(
        &self,
        principal: Principal,
        record: RefreshRecord,
    ) -> Result<(), AuthError> {
        self.records.insert(principal, record);
        Ok(())
    }

    async fn current_refresh(
        &self,
        principal: Principal,
    ) -> Result<Option<RefreshRecord>, AuthError> {
        Ok(self.records.get(&principal).map(|r| r.value().clone()))
    }

    async fn compare_and_swap_refresh(
        &self,
        principal: Principal,
        expected_hash: &str,
        next: RefreshRecord,
    ) -> Result<bool, AuthError> {
        match self.records.entry(principal) {
            Entry::Occupied(mut occupied) if occupied.get().token_hash == expected_hash => {
                occupied.insert(next);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_refresh(&self, principal: Principal) -> Result<(), AuthError> {
        self.records.remove(&principal);
        Ok(())
    }
}
