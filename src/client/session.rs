//! The client's credential pair and its expiry policy.
//!
//! The record is persisted through a [`SessionStorage`] chosen by an explicit
//! [`Persistence`] policy. Liveness is judged against the tokio clock, so a
//! paused runtime can fast-forward through an access-token lifetime.

use super::error::ClientError;
use crate::application_port::{AuthTokens, RefreshResult};
use crate::domain_model::PrincipalInfo;
use crate::logger::*;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub principal: PrincipalInfo,
    pub access_token: String,
    pub refresh_token: String,
    /// End of the access token's lifetime, not the refresh token's.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Started,
    Refreshed,
    /// The access token ran out with no refresh in between.
    Expired,
    /// Explicit logout.
    LoggedOut,
    /// The refresh token was rejected.
    Revoked,
}

pub trait SessionStorage: Send + Sync {
    fn load(&self) -> Result<Option<SessionRecord>, ClientError>;
    fn save(&self, record: &SessionRecord) -> Result<(), ClientError>;
    fn clear(&self) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    /// Gone when the process exits.
    Memory,
    /// A JSON document that survives restarts.
    File(PathBuf),
}

impl Persistence {
    pub fn storage(&self) -> Arc<dyn SessionStorage> {
        match self {
            Persistence::Memory => Arc::new(MemorySessionStorage::default()),
            Persistence::File(path) => Arc::new(FileSessionStorage::new(path)),
        }
    }
}

#[derive(Default)]
pub struct MemorySessionStorage {
    slot: Mutex<Option<SessionRecord>>,
}

impl SessionStorage for MemorySessionStorage {
    fn load(&self) -> Result<Option<SessionRecord>, ClientError> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, record: &SessionRecord) -> Result<(), ClientError> {
        *self.slot.lock() = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        self.slot.lock().take();
        Ok(())
    }
}

pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileSessionStorage {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SessionStorage for FileSessionStorage {
    fn load(&self) -> Result<Option<SessionRecord>, ClientError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ClientError::Storage(format!("{}: {e}", self.path.display())))
    }

    fn save(&self, record: &SessionRecord) -> Result<(), ClientError> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        // Write then rename so a crash never leaves half a record behind.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

struct Active {
    record: SessionRecord,
    deadline: Instant,
}

struct State {
    current: Option<Active>,
    /// Bumped by every login, refresh and logout.
    epoch: u64,
    timer: Option<CancellationToken>,
}

struct Inner {
    state: Mutex<State>,
    storage: Arc<dyn SessionStorage>,
    events: broadcast::Sender<SessionEvent>,
}

/// Holder of the current [`SessionRecord`]. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl SessionClient {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        let (events, _) = broadcast::channel(32);
        SessionClient {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    current: None,
                    epoch: 0,
                    timer: None,
                }),
                storage,
                events,
            }),
        }
    }

    pub fn with_persistence(persistence: &Persistence) -> Self {
        Self::new(persistence.storage())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Installs a freshly issued pair. The expiry horizon comes from the
    /// access token's TTL.
    pub fn set_session(
        &self,
        principal: PrincipalInfo,
        tokens: &AuthTokens,
    ) -> Result<(), ClientError> {
        let ttl = Duration::from_secs(tokens.access_token_ttl_secs);
        let record = SessionRecord {
            principal,
            access_token: tokens.access_token.0.clone(),
            refresh_token: tokens.refresh_token.0.clone(),
            expires_at: Utc::now() + ttl,
        };
        let id = record.principal.id;

        let mut state = self.inner.state.lock();
        self.inner.storage.save(&record)?;
        self.install(&mut state, record, Instant::now() + ttl);
        drop(state);
        info!(principal = %id, "session started");
        self.emit(SessionEvent::Started);
        Ok(())
    }

    /// Loads a persisted record. An already expired one is discarded.
    pub fn restore(&self) -> Result<bool, ClientError> {
        let mut state = self.inner.state.lock();
        let Some(record) = self.inner.storage.load()? else {
            return Ok(false);
        };
        let remaining = (record.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if remaining.is_zero() {
            debug!("discarding expired persisted session");
            self.inner.storage.clear()?;
            return Ok(false);
        }

        self.install(&mut state, record, Instant::now() + remaining);
        drop(state);
        self.emit(SessionEvent::Started);
        Ok(true)
    }

    /// Applies a refresh that was started at `epoch`. Returns `false`, leaving
    /// the session alone, when the session changed in the meantime.
    pub fn apply_refresh(&self, epoch: u64, refreshed: &RefreshResult) -> Result<bool, ClientError> {
        let mut state = self.inner.state.lock();
        if state.epoch != epoch {
            debug!(started = epoch, now = state.epoch, "discarding stale refresh result");
            return Ok(false);
        }
        let Some(active) = state.current.as_ref() else {
            return Ok(false);
        };

        let ttl = Duration::from_secs(refreshed.access_token_ttl_secs);
        let mut record = active.record.clone();
        record.access_token = refreshed.access_token.0.clone();
        if let Some(rotated) = &refreshed.refresh_token {
            record.refresh_token = rotated.0.clone();
        }
        record.expires_at = Utc::now() + ttl;
        self.inner.storage.save(&record)?;

        self.install(&mut state, record, Instant::now() + ttl);
        drop(state);
        self.emit(SessionEvent::Refreshed);
        Ok(true)
    }

    /// Replaces the stored profile, keeping tokens and expiry. No-op without a
    /// session.
    pub fn update_principal(&self, principal: PrincipalInfo) -> Result<(), ClientError> {
        let mut state = self.inner.state.lock();
        let Some(active) = state.current.as_mut() else {
            return Ok(());
        };
        let mut record = active.record.clone();
        record.principal = principal;
        self.inner.storage.save(&record)?;
        active.record = record;
        Ok(())
    }

    /// Explicit logout. Safe to call with no session.
    pub fn clear_session(&self) {
        self.end(None, SessionEvent::LoggedOut);
    }

    /// Ends the session started at `epoch` because its refresh token was
    /// rejected. A newer session is left untouched.
    pub fn revoke(&self, epoch: u64) {
        self.end(Some(epoch), SessionEvent::Revoked);
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner
            .state
            .lock()
            .current
            .as_ref()
            .is_some_and(|active| Instant::now() < active.deadline)
    }

    pub fn epoch(&self) -> u64 {
        self.inner.state.lock().epoch
    }

    pub fn principal(&self) -> Option<PrincipalInfo> {
        self.inner
            .state
            .lock()
            .current
            .as_ref()
            .map(|active| active.record.principal.clone())
    }

    pub fn record(&self) -> Option<SessionRecord> {
        self.inner
            .state
            .lock()
            .current
            .as_ref()
            .map(|active| active.record.clone())
    }

    /// Epoch and access token, read together.
    pub fn access_token(&self) -> Option<(u64, String)> {
        let state = self.inner.state.lock();
        state
            .current
            .as_ref()
            .map(|active| (state.epoch, active.record.access_token.clone()))
    }

    /// Epoch and refresh token, read together.
    pub fn refresh_token(&self) -> Option<(u64, String)> {
        let state = self.inner.state.lock();
        state
            .current
            .as_ref()
            .map(|active| (state.epoch, active.record.refresh_token.clone()))
    }

    fn install(&self, state: &mut State, record: SessionRecord, deadline: Instant) {
        state.current = Some(Active { record, deadline });
        state.epoch += 1;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.timer = arm_expiry(Arc::downgrade(&self.inner), state.epoch, deadline);
    }

    fn end(&self, only_epoch: Option<u64>, event: SessionEvent) {
        let mut state = self.inner.state.lock();
        if only_epoch.is_some_and(|epoch| epoch != state.epoch) {
            return;
        }
        let had_session = Inner::teardown(&self.inner, &mut state);
        drop(state);
        if had_session {
            info!(?event, "session ended");
            self.emit(event);
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

impl Inner {
    /// Drops the current record. Returns whether there was one.
    fn teardown(inner: &Inner, state: &mut State) -> bool {
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        let had_session = state.current.take().is_some();
        state.epoch += 1;
        if let Err(e) = inner.storage.clear() {
            error!("failed to clear persisted session: {}", e);
        }
        had_session
    }

    fn expire(&self, epoch: u64) {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return;
        }
        if Inner::teardown(self, &mut state) {
            drop(state);
            info!("session expired");
            let _ = self.events.send(SessionEvent::Expired);
        }
    }
}

/// Spawns the timer that ends the session at `deadline`. Without a runtime
/// there is no timer and expiry is only observed through `is_authenticated`.
fn arm_expiry(inner: Weak<Inner>, epoch: u64, deadline: Instant) -> Option<CancellationToken> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    let cancel = CancellationToken::new();
    let cancelled = cancel.clone();
    handle.spawn(async move {
        tokio::select! {
            _ = cancelled.cancelled() => {}
            _ = tokio::time::sleep_until(deadline) => {
                if let Some(inner) = inner.upgrade() {
                    inner.expire(epoch);
                }
            }
        }
    });
    Some(cancel)
}
