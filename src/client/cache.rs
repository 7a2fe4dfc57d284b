//! Optimistic favorites/watchlist sets.
//!
//! A toggle flips local membership before any I/O and records a
//! [`PendingMutation`] holding the membership it replaced. Mutations on the
//! same entry run one at a time in toggle order. When one fails the entry is
//! put back to its snapshot and the toggles queued behind it on that entry are
//! cancelled, since they were computed against a state the server never
//! reached.

use super::error::ClientError;
use super::session::{SessionClient, SessionEvent};
use crate::domain_model::{ListKind, MembershipEntry, Principal};
use crate::logger::*;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// The server side of a membership set. Every call answers with the
/// canonical set after the operation.
#[async_trait::async_trait]
pub trait MembershipApi: Send + Sync {
    async fn list(&self, kind: ListKind) -> Result<Vec<MembershipEntry>, ClientError>;
    async fn add(
        &self,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<Vec<MembershipEntry>, ClientError>;
    async fn remove(
        &self,
        kind: ListKind,
        entry: MembershipEntry,
    ) -> Result<Vec<MembershipEntry>, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMutation {
    pub kind: ListKind,
    pub entry: MembershipEntry,
    /// Membership before the toggle was applied.
    pub was_member: bool,
}

impl PendingMutation {
    pub fn op(&self) -> MutationOp {
        if self.was_member {
            MutationOp::Remove
        } else {
            MutationOp::Add
        }
    }

    fn apply(&self, set: &mut HashSet<MembershipEntry>) {
        self.write(set, !self.was_member);
    }

    fn revert(&self, set: &mut HashSet<MembershipEntry>) {
        self.write(set, self.was_member);
    }

    fn write(&self, set: &mut HashSet<MembershipEntry>, member: bool) {
        if member {
            set.insert(self.entry);
        } else {
            set.remove(&self.entry);
        }
    }
}

type LaneKey = (ListKind, MembershipEntry);

#[derive(Default)]
struct Lane {
    next_seq: u64,
    /// Toggles with a sequence number up to this one are cancelled.
    cancelled_through: u64,
    outstanding: usize,
    /// Completion signal of the newest toggle on this entry.
    tail: Option<oneshot::Receiver<()>>,
}

#[derive(Default)]
struct CacheState {
    principal: Option<Principal>,
    /// Bumped on bind and reset so that older completions leave the sets alone.
    generation: u64,
    sets: HashMap<ListKind, HashSet<MembershipEntry>>,
    lanes: HashMap<LaneKey, Lane>,
    pending: HashMap<ListKind, usize>,
}

impl CacheState {
    fn clear(&mut self) {
        self.generation += 1;
        self.sets.clear();
        self.lanes.clear();
        self.pending.clear();
    }
}

struct CacheInner {
    api: Arc<dyn MembershipApi>,
    state: Mutex<CacheState>,
}

#[derive(Clone)]
pub struct OptimisticCache {
    inner: Arc<CacheInner>,
}

/// A toggle that has been applied locally and is settling with the server.
pub struct ToggleHandle {
    mutation: PendingMutation,
    task: JoinHandle<Result<bool, ClientError>>,
}

impl ToggleHandle {
    pub fn mutation(&self) -> PendingMutation {
        self.mutation
    }

    /// Waits for the server. `Ok` carries the confirmed membership.
    pub async fn settled(self) -> Result<bool, ClientError> {
        self.task
            .await
            .map_err(|e| ClientError::Transport(format!("mutation task failed: {e}")))?
    }
}

impl OptimisticCache {
    pub fn new(api: Arc<dyn MembershipApi>) -> Self {
        OptimisticCache {
            inner: Arc::new(CacheInner {
                api,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Switches to `principal`'s sets. Changing principal drops everything;
    /// binding an unbound cache adopts the toggles made since the last reset.
    pub fn bind(&self, principal: Principal) {
        let mut state = self.inner.state.lock();
        match state.principal {
            Some(current) if current == principal => {}
            Some(_) => {
                state.clear();
                state.principal = Some(principal);
            }
            None => state.principal = Some(principal),
        }
    }

    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.clear();
        state.principal = None;
    }

    pub fn principal(&self) -> Option<Principal> {
        self.inner.state.lock().principal
    }

    pub fn members(&self, kind: ListKind) -> HashSet<MembershipEntry> {
        self.inner
            .state
            .lock()
            .sets
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, kind: ListKind, entry: MembershipEntry) -> bool {
        self.inner
            .state
            .lock()
            .sets
            .get(&kind)
            .is_some_and(|set| set.contains(&entry))
    }

    pub fn is_pending(&self, kind: ListKind) -> bool {
        self.inner
            .state
            .lock()
            .pending
            .get(&kind)
            .is_some_and(|n| *n > 0)
    }

    /// Fetches the server's set. The local copy is replaced unless toggles of
    /// that kind are still settling.
    pub async fn load(&self, kind: ListKind) -> Result<HashSet<MembershipEntry>, ClientError> {
        let generation = self.inner.state.lock().generation;
        let canonical: HashSet<_> = self.inner.api.list(kind).await?.into_iter().collect();

        let mut state = self.inner.state.lock();
        let idle = state.pending.get(&kind).is_none_or(|n| *n == 0);
        if state.generation == generation && idle {
            state.sets.insert(kind, canonical.clone());
        }
        Ok(canonical)
    }

    /// Flips membership of `entry` right away and settles it with the server
    /// in the background. Must be called within a tokio runtime.
    pub fn toggle(&self, kind: ListKind, entry: MembershipEntry) -> ToggleHandle {
        let (mutation, seq, generation, previous, done) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            let set = state.sets.entry(kind).or_default();
            let mutation = PendingMutation {
                kind,
                entry,
                was_member: set.contains(&entry),
            };
            mutation.apply(set);
            *state.pending.entry(kind).or_default() += 1;

            let lane = state.lanes.entry((kind, entry)).or_default();
            lane.next_seq += 1;
            lane.outstanding += 1;
            let (done, waiter) = oneshot::channel();
            let previous = lane.tail.replace(waiter);
            (mutation, lane.next_seq, state.generation, previous, done)
        };
        debug!(kind = %kind, %entry, op = ?mutation.op(), seq, "optimistic toggle");

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                // Err only means the previous toggle's task is gone; it has settled either way.
                let _ = previous.await;
            }
            let result = inner.settle(mutation, seq, generation).await;
            let _ = done.send(());
            result
        });

        ToggleHandle { mutation, task }
    }

    /// Resets the sets whenever the session ends and binds them when one
    /// starts.
    pub fn follow(&self, session: &SessionClient) -> JoinHandle<()> {
        let cache = self.clone();
        let session = session.clone();
        let mut events = session.subscribe();
        if let Some(principal) = session.principal() {
            cache.bind(principal.id);
        }
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Started) => {
                        if let Some(principal) = session.principal() {
                            cache.bind(principal.id);
                        }
                    }
                    Ok(SessionEvent::Refreshed) => {}
                    Ok(SessionEvent::Expired | SessionEvent::LoggedOut | SessionEvent::Revoked) => {
                        cache.reset()
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed session events, resetting cache");
                        cache.reset();
                        if let Some(principal) = session.principal() {
                            cache.bind(principal.id);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl CacheInner {
    async fn settle(
        &self,
        mutation: PendingMutation,
        seq: u64,
        generation: u64,
    ) -> Result<bool, ClientError> {
        let superseded = {
            let state = self.state.lock();
            state.generation != generation
                || state
                    .lanes
                    .get(&(mutation.kind, mutation.entry))
                    .is_none_or(|lane| seq <= lane.cancelled_through)
        };

        let result = if superseded {
            Err(ClientError::Superseded)
        } else {
            match mutation.op() {
                MutationOp::Add => self.api.add(mutation.kind, mutation.entry).await,
                MutationOp::Remove => self.api.remove(mutation.kind, mutation.entry).await,
            }
        };

        self.finish(mutation, generation, result)
    }

    fn finish(
        &self,
        mutation: PendingMutation,
        generation: u64,
        result: Result<Vec<MembershipEntry>, ClientError>,
    ) -> Result<bool, ClientError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.generation != generation {
            return result.map(|_| !mutation.was_member);
        }

        let kind = mutation.kind;
        let key = (kind, mutation.entry);
        let idle = match state.pending.get_mut(&kind) {
            Some(n) => {
                *n = n.saturating_sub(1);
                *n == 0
            }
            None => true,
        };

        let outcome = match result {
            Ok(canonical) => {
                if idle {
                    state.sets.insert(kind, canonical.into_iter().collect());
                }
                Ok(!mutation.was_member)
            }
            Err(ClientError::Superseded) => Err(ClientError::Superseded),
            Err(e) => {
                warn!(kind = %kind, entry = %mutation.entry, error = %e, "rolling back toggle");
                mutation.revert(state.sets.entry(kind).or_default());
                if let Some(lane) = state.lanes.get_mut(&key) {
                    lane.cancelled_through = lane.next_seq;
                }
                Err(e)
            }
        };

        if let Some(lane) = state.lanes.get_mut(&key) {
            lane.outstanding = lane.outstanding.saturating_sub(1);
            if lane.outstanding == 0 {
                state.lanes.remove(&key);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::ResourceKind;
    use std::collections::BTreeSet;
    use std::time::Duration;

    /// An in-memory server. Calls can be made to fail and take a little time
    /// so that toggles overlap.
    #[derive(Default)]
    struct FakeServer {
        sets: Mutex<HashMap<ListKind, BTreeSet<MembershipEntry>>>,
        fail: Mutex<HashSet<MembershipEntry>>,
        calls: Mutex<Vec<(MutationOp, MembershipEntry)>>,
    }

    impl FakeServer {
        fn failing_on(&self, entry: MembershipEntry) {
            self.fail.lock().insert(entry);
        }

        fn set(&self, kind: ListKind) -> HashSet<MembershipEntry> {
            self.sets
                .lock()
                .get(&kind)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default()
        }

        async fn mutate(
            &self,
            kind: ListKind,
            entry: MembershipEntry,
            op: MutationOp,
        ) -> Result<Vec<MembershipEntry>, ClientError> {
            self.calls.lock().push((op, entry));
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail.lock().contains(&entry) {
                return Err(ClientError::Server {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            let mut sets = self.sets.lock();
            let set = sets.entry(kind).or_default();
            match op {
                MutationOp::Add if !set.insert(entry) => {
                    return Err(ClientError::Conflict(entry.to_string()));
                }
                MutationOp::Remove if !set.remove(&entry) => {
                    return Err(ClientError::NotFound(entry.to_string()));
                }
                _ => {}
            }
            Ok(set.iter().copied().collect())
        }
    }

    #[async_trait::async_trait]
    impl MembershipApi for FakeServer {
        async fn list(&self, kind: ListKind) -> Result<Vec<MembershipEntry>, ClientError> {
            Ok(self.set(kind).into_iter().collect())
        }

        async fn add(
            &self,
            kind: ListKind,
            entry: MembershipEntry,
        ) -> Result<Vec<MembershipEntry>, ClientError> {
            self.mutate(kind, entry, MutationOp::Add).await
        }

        async fn remove(
            &self,
            kind: ListKind,
            entry: MembershipEntry,
        ) -> Result<Vec<MembershipEntry>, ClientError> {
            self.mutate(kind, entry, MutationOp::Remove).await
        }
    }

    fn cache_over(server: &Arc<FakeServer>) -> OptimisticCache {
        let cache = OptimisticCache::new(server.clone());
        cache.bind(Principal::generate());
        cache
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_applies_before_the_server_answers() {
        let server = Arc::new(FakeServer::default());
        let cache = cache_over(&server);
        let entry = MembershipEntry::new(42, ResourceKind::Movie);

        let handle = cache.toggle(ListKind::Favorites, entry);
        assert_eq!(cache.members(ListKind::Favorites), HashSet::from([entry]));
        assert!(server.set(ListKind::Favorites).is_empty());

        assert!(handle.settled().await.unwrap());
        assert_eq!(server.set(ListKind::Favorites), HashSet::from([entry]));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_toggle_reverts_to_the_prior_set() {
        let server = Arc::new(FakeServer::default());
        let cache = cache_over(&server);
        let entry = MembershipEntry::movie(42);
        server.failing_on(entry);

        let handle = cache.toggle(ListKind::Favorites, entry);
        assert!(cache.contains(ListKind::Favorites, entry));

        assert!(matches!(
            handle.settled().await,
            Err(ClientError::Server { status: 500, .. })
        ));
        assert!(cache.members(ListKind::Favorites).is_empty());
        assert!(!cache.is_pending(ListKind::Favorites));
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_parity_holds_for_rapid_toggles() {
        for toggles in 1..=5usize {
            let server = Arc::new(FakeServer::default());
            let cache = cache_over(&server);
            let entry = MembershipEntry::tv(7);

            let handles: Vec<_> = (0..toggles)
                .map(|_| cache.toggle(ListKind::Watchlist, entry))
                .collect();
            let expected = toggles % 2 == 1;
            assert_eq!(cache.contains(ListKind::Watchlist, entry), expected);

            for handle in handles {
                handle.settled().await.unwrap();
            }
            assert_eq!(cache.contains(ListKind::Watchlist, entry), expected);
            assert_eq!(server.set(ListKind::Watchlist).contains(&entry), expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn same_entry_mutations_never_overlap() {
        let server = Arc::new(FakeServer::default());
        let cache = cache_over(&server);
        let entry = MembershipEntry::movie(1);

        let first = cache.toggle(ListKind::Favorites, entry);
        let second = cache.toggle(ListKind::Favorites, entry);
        tokio::time::sleep(Duration::from_millis(5)).await;
        // The remove is still waiting for the add.
        assert_eq!(server.calls.lock().len(), 1);

        first.settled().await.unwrap();
        second.settled().await.unwrap();
        assert_eq!(
            *server.calls.lock(),
            vec![(MutationOp::Add, entry), (MutationOp::Remove, entry)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_cancels_toggles_queued_behind_it() {
        let server = Arc::new(FakeServer::default());
        let cache = cache_over(&server);
        let entry = MembershipEntry::movie(9);
        server.failing_on(entry);

        let first = cache.toggle(ListKind::Favorites, entry);
        let second = cache.toggle(ListKind::Favorites, entry);
        let third = cache.toggle(ListKind::Favorites, entry);
        assert!(cache.contains(ListKind::Favorites, entry));

        assert!(first.settled().await.is_err());
        assert_eq!(second.settled().await.unwrap_err(), ClientError::Superseded);
        assert_eq!(third.settled().await.unwrap_err(), ClientError::Superseded);
        assert!(!cache.contains(ListKind::Favorites, entry));
        assert_eq!(server.calls.lock().len(), 1);

        // The entry is usable again afterwards.
        server.fail.lock().clear();
        assert!(cache.toggle(ListKind::Favorites, entry).settled().await.unwrap());
        assert!(cache.contains(ListKind::Favorites, entry));
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_only_touches_the_failed_entry() {
        let server = Arc::new(FakeServer::default());
        let cache = cache_over(&server);
        let good = MembershipEntry::movie(1);
        let bad = MembershipEntry::movie(2);
        server.failing_on(bad);

        let ok = cache.toggle(ListKind::Favorites, good);
        let failed = cache.toggle(ListKind::Favorites, bad);
        assert!(failed.settled().await.is_err());
        ok.settled().await.unwrap();

        assert_eq!(cache.members(ListKind::Favorites), HashSet::from([good]));
    }

    #[tokio::test(start_paused = true)]
    async fn success_reconciles_with_the_canonical_set() {
        let server = Arc::new(FakeServer::default());
        server
            .sets
            .lock()
            .entry(ListKind::Favorites)
            .or_default()
            .insert(MembershipEntry::tv(5));
        let cache = cache_over(&server);

        // Local copy never loaded, so the server's extra member shows up on
        // the first confirmed toggle.
        cache
            .toggle(ListKind::Favorites, MembershipEntry::movie(3))
            .settled()
            .await
            .unwrap();
        assert_eq!(
            cache.members(ListKind::Favorites),
            HashSet::from([MembershipEntry::tv(5), MembershipEntry::movie(3)])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn load_and_rebind() {
        let server = Arc::new(FakeServer::default());
        server
            .sets
            .lock()
            .entry(ListKind::Watchlist)
            .or_default()
            .insert(MembershipEntry::movie(8));
        let cache = cache_over(&server);

        cache.load(ListKind::Watchlist).await.unwrap();
        assert!(cache.contains(ListKind::Watchlist, MembershipEntry::movie(8)));

        cache.bind(Principal::generate());
        assert!(cache.members(ListKind::Watchlist).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_mid_flight_leaves_the_new_state_alone() {
        let server = Arc::new(FakeServer::default());
        let cache = cache_over(&server);
        let entry = MembershipEntry::movie(11);

        let handle = cache.toggle(ListKind::Favorites, entry);
        cache.reset();
        assert_eq!(handle.settled().await.unwrap_err(), ClientError::Superseded);
        assert!(cache.members(ListKind::Favorites).is_empty());
        assert!(server.set(ListKind::Favorites).is_empty());
        assert!(cache.principal().is_none());
    }

    #[tokio::test]
    async fn follows_the_session_lifecycle() {
        use crate::client::Persistence;
        use crate::client::session::tests::{principal_info, tokens};

        let server = Arc::new(FakeServer::default());
        let cache = OptimisticCache::new(server.clone());
        let session = SessionClient::with_persistence(&Persistence::Memory);
        let follower = cache.follow(&session);

        let info = principal_info();
        let id = info.id;
        session.set_session(info, &tokens("a", "r", 600)).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(cache.principal(), Some(id));

        session.clear_session();
        tokio::task::yield_now().await;
        assert!(cache.principal().is_none());
        follower.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_right_after_login_survives_the_bind() {
        use crate::client::Persistence;
        use crate::client::session::tests::{principal_info, tokens};

        let server = Arc::new(FakeServer::default());
        let cache = OptimisticCache::new(server.clone());
        let session = SessionClient::with_persistence(&Persistence::Memory);
        let follower = cache.follow(&session);

        let info = principal_info();
        let id = info.id;
        session.set_session(info, &tokens("a", "r", 600)).unwrap();
        // The follower has not seen `Started` yet.
        let entry = MembershipEntry::movie(42);
        let handle = cache.toggle(ListKind::Favorites, entry);

        assert!(handle.settled().await.unwrap());
        assert_eq!(cache.principal(), Some(id));
        assert_eq!(cache.members(ListKind::Favorites), HashSet::from([entry]));
        assert_eq!(server.set(ListKind::Favorites), HashSet::from([entry]));
        follower.abort();
    }
}
