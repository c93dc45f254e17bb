//! Content-addressed result cache.
//!
//! # SINGLE-FLIGHT INVARIANT
//! At most one computation runs per fingerprint. The first caller installs a
//! pending entry and computes; every later caller attaches to that entry and
//! receives the same `Arc` (or the same failure) once it resolves.
//!
//! # LOCKING
//! The entry map lock is held for bounded bookkeeping only, never across an
//! `.await`. Distinct fingerprints compute concurrently.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::engine::fingerprint::Fingerprint;
use crate::engine::result::WaccBreakdown;
use crate::error::CalculationError;
use crate::telemetry::event::tags;

type Shared = Result<Arc<WaccBreakdown>, CalculationError>;
type Slot = watch::Receiver<Option<Shared>>;

/// How a caller obtained its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// This caller ran the computation.
    Miss,
    /// A completed entry was returned.
    Hit,
    /// This caller waited on another caller's in-flight computation.
    Joined,
}

impl CacheStatus {
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Miss => tags::CACHE_MISS,
            Self::Hit => tags::CACHE_HIT,
            Self::Joined => tags::CACHE_JOINED,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub joined: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub ready: usize,
    pub pending: usize,
}

enum CacheEntry {
    Ready(ReadyEntry),
    Pending(PendingEntry),
}

struct ReadyEntry {
    breakdown: Arc<WaccBreakdown>,
    created_at: Instant,
    access_count: u64,
    access_tick: u64,
}

struct PendingEntry {
    id: Uuid,
    slot: Slot,
    // Cleared by `clear()`/`invalidate()`: keep joining, never promote.
    retain: bool,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<Fingerprint, CacheEntry>,
    // access tick -> fingerprint, ready entries only; first key is the LRU victim
    lru: BTreeMap<u64, Fingerprint>,
    tick: u64,
    stats: CacheStats,
}

enum Lookup {
    Ready(Arc<WaccBreakdown>),
    Wait(Slot),
    Lead(Uuid, watch::Sender<Option<Shared>>),
}

pub struct ResultCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Returns the cached breakdown for `fingerprint`, joins an in-flight
    /// computation for it, or runs `compute` as the single leader.
    ///
    /// A failed computation is shared with every waiter and never cached.
    /// If the leader is dropped mid-flight, waiters re-enter the lookup and
    /// one of them takes over.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        compute: F,
    ) -> Result<(Arc<WaccBreakdown>, CacheStatus), CalculationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<WaccBreakdown, CalculationError>>,
    {
        let mut compute = Some(compute);
        loop {
            match self.lookup(fingerprint) {
                Lookup::Ready(breakdown) => return Ok((breakdown, CacheStatus::Hit)),
                Lookup::Wait(mut slot) => match slot.wait_for(Option::is_some).await {
                    Ok(resolved) => match &*resolved {
                        Some(Ok(breakdown)) => return Ok((Arc::clone(breakdown), CacheStatus::Joined)),
                        Some(Err(err)) => return Err(err.clone()),
                        None => continue,
                    },
                    Err(_) => {
                        debug!(?fingerprint, "Leader dropped before resolving; retrying lookup");
                        continue;
                    }
                },
                Lookup::Lead(id, tx) => {
                    let Some(compute) = compute.take() else {
                        return Err(CalculationError::CacheFailure(format!(
                            "compute function for {fingerprint:?} already consumed"
                        )));
                    };
                    let guard = PendingGuard {
                        cache: self,
                        fingerprint,
                        id,
                        armed: true,
                    };
                    let outcome = compute().await.map(Arc::new);
                    guard.disarm();

                    // Publish to the map first so no waiter can observe the
                    // result before the entry reflects it.
                    self.complete(fingerprint, id, &outcome);
                    tx.send_replace(Some(outcome.clone()));
                    return outcome.map(|breakdown| (breakdown, CacheStatus::Miss));
                }
            }
        }
    }

    fn lookup(&self, fingerprint: Fingerprint) -> Lookup {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.tick += 1;
        let tick = state.tick;
        let ttl = self.config.ttl();

        let mut expired = false;
        let mut abandoned = false;
        match state.entries.get_mut(&fingerprint) {
            Some(CacheEntry::Ready(entry)) => {
                if ttl.is_some_and(|ttl| entry.created_at.elapsed() >= ttl) {
                    expired = true;
                } else {
                    state.lru.remove(&entry.access_tick);
                    entry.access_tick = tick;
                    entry.access_count += 1;
                    state.lru.insert(tick, fingerprint);
                    state.stats.hits += 1;
                    return Lookup::Ready(Arc::clone(&entry.breakdown));
                }
            }
            Some(CacheEntry::Pending(pending)) => {
                // Closed sender with no value: the leader vanished.
                if pending.slot.has_changed().is_err() && pending.slot.borrow().is_none() {
                    abandoned = true;
                } else {
                    state.stats.joined += 1;
                    return Lookup::Wait(pending.slot.clone());
                }
            }
            None => {}
        }

        if expired {
            if let Some(CacheEntry::Ready(entry)) = state.entries.remove(&fingerprint) {
                state.lru.remove(&entry.access_tick);
            }
            state.stats.expirations += 1;
            debug!(?fingerprint, "Cache entry expired");
        }
        if abandoned {
            state.entries.remove(&fingerprint);
        }

        let (tx, rx) = watch::channel(None);
        let id = Uuid::new_v4();
        state
            .entries
            .insert(
                fingerprint,
                CacheEntry::Pending(PendingEntry {
                    id,
                    slot: rx,
                    retain: true,
                }),
            );
        state.stats.misses += 1;
        Lookup::Lead(id, tx)
    }

    fn complete(&self, fingerprint: Fingerprint, id: Uuid, outcome: &Shared) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let retain = match state.entries.get(&fingerprint) {
            Some(CacheEntry::Pending(pending)) if pending.id == id => pending.retain,
            _ => return,
        };
        if !retain {
            // Cleared or invalidated while computing: waiters still get the
            // result through the channel, the map does not keep it.
            state.entries.remove(&fingerprint);
            debug!(?fingerprint, "Detached computation finished; result not retained");
            return;
        }

        match outcome {
            Ok(breakdown) => {
                state.tick += 1;
                let tick = state.tick;
                state.entries.insert(
                    fingerprint,
                    CacheEntry::Ready(ReadyEntry {
                        breakdown: Arc::clone(breakdown),
                        created_at: Instant::now(),
                        access_count: 0,
                        access_tick: tick,
                    }),
                );
                state.lru.insert(tick, fingerprint);
                self.enforce_capacity(state);
            }
            Err(err) => {
                state.entries.remove(&fingerprint);
                debug!(?fingerprint, error = %err, "Computation failed; entry dropped");
            }
        }
    }

    fn enforce_capacity(&self, state: &mut CacheState) {
        // Pending entries are not in the LRU index and so are never evicted.
        while state.lru.len() > self.config.capacity {
            let Some((_, victim)) = state.lru.pop_first() else {
                break;
            };
            state.entries.remove(&victim);
            state.stats.evictions += 1;
            debug!(fingerprint = ?victim, "Evicted least recently used entry");
        }
    }

    /// Drops every completed entry. In-flight computations stay joinable
    /// until they resolve, but their results are not retained.
    pub fn clear(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let before = state.entries.len();
        state.entries.retain(|_, entry| match entry {
            CacheEntry::Ready(_) => false,
            CacheEntry::Pending(pending) => {
                pending.retain = false;
                true
            }
        });
        state.lru.clear();
        let detached = state.entries.len();
        info!(removed = before - detached, detached, "Result cache cleared");
    }

    /// Drops the entry for one fingerprint. Returns whether one existed.
    /// An in-flight entry stays joinable but is not retained.
    pub fn invalidate(&self, fingerprint: Fingerprint) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(CacheEntry::Pending(pending)) = state.entries.get_mut(&fingerprint) {
            pending.retain = false;
            return true;
        }
        match state.entries.remove(&fingerprint) {
            Some(CacheEntry::Ready(entry)) => {
                state.lru.remove(&entry.access_tick);
                true
            }
            _ => false,
        }
    }

    /// Removes expired completed entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let Some(ttl) = self.config.ttl() else {
            return 0;
        };
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let expired: Vec<(Fingerprint, u64)> = state
            .entries
            .iter()
            .filter_map(|(fingerprint, entry)| match entry {
                CacheEntry::Ready(ready) if ready.created_at.elapsed() >= ttl => {
                    Some((*fingerprint, ready.access_tick))
                }
                _ => None,
            })
            .collect();

        for (fingerprint, tick) in &expired {
            state.entries.remove(fingerprint);
            state.lru.remove(tick);
        }
        state.stats.expirations += expired.len() as u64;
        expired.len()
    }

    /// Number of times a completed entry was served, if it is cached.
    pub fn access_count(&self, fingerprint: Fingerprint) -> Option<u64> {
        match self.state.lock().entries.get(&fingerprint) {
            Some(CacheEntry::Ready(entry)) => Some(entry.access_count),
            _ => None,
        }
    }

    pub fn contains(&self, fingerprint: Fingerprint) -> bool {
        matches!(
            self.state.lock().entries.get(&fingerprint),
            Some(CacheEntry::Ready(_))
        )
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let pending = state
            .entries
            .values()
            .filter(|entry| matches!(entry, CacheEntry::Pending(_)))
            .count();
        CacheStats {
            ready: state.entries.len() - pending,
            pending,
            ..state.stats
        }
    }
}

/// Removes the leader's pending entry if its future is dropped before
/// completing, so waiters do not attach to a computation nobody drives.
struct PendingGuard<'a> {
    cache: &'a ResultCache,
    fingerprint: Fingerprint,
    id: Uuid,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.cache.state.lock();
        let owned = matches!(
            state.entries.get(&self.fingerprint),
            Some(CacheEntry::Pending(pending)) if pending.id == self.id
        );
        if owned {
            state.entries.remove(&self.fingerprint);
            debug!(fingerprint = ?self.fingerprint, "Leader cancelled; pending entry released");
        }
    }
}
