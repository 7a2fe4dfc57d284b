use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Default)]
pub struct MemoryUserRepo {
    by_email: DashMap<String, Principal>,
    users: DashMap<Principal, UserRecord>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserRepo for MemoryUserRepo {
    async fn create(&self, record: &UserRecord) -> Result<(), AuthError> {
        match self.by_email.entry(record.email.clone()) {
            Entry::Occupied(_) => Err(AuthError::Conflict("user already exists".into())),
            Entry::Vacant(vacant) => {
                self.users.insert(record.principal, record.clone());
                vacant.insert(record.principal);
                Ok(())
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        let Some(principal) = self.by_email.get(email).map(|p| *p.value()) else {
            return Ok(None);
        };
        Ok(self.users.get(&principal).map(|r| r.value().clone()))
    }

    async fn get_by_principal(
        &self,
        principal: Principal,
    ) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.users.get(&principal).map(|r| r.value().clone()))
    }

    async fn touch_last_login(
        &self,
        principal: Principal,
        at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        if let Some(mut rec) = self.users.get_mut(&principal) {
            rec.last_login = Some(at);
        }
        Ok(())
    }

    async fn update(&self, record: &UserRecord) -> Result<(), AuthError> {
        let Some(previous) = self.users.get(&record.principal).map(|r| r.email.clone()) else {
            return Err(AuthError::NotFound("user not found".into()));
        };
        if previous != record.email {
            match self.by_email.entry(record.email.clone()) {
                Entry::Occupied(_) => return Err(AuthError::Conflict("email already in use".into())),
                Entry::Vacant(vacant) => {
                    vacant.insert(record.principal);
                }
            }
            self.by_email.remove(&previous);
        }
        self.users.insert(record.principal, record.clone());
        Ok(())
    }

    async fn delete(&self, principal: Principal) -> Result<bool, AuthError> {
        match self.users.remove(&principal) {
            Some((_, rec)) => {
                self.by_email.remove(&rec.email);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
