//! The finger table: this node's view of group membership.
//!
//! Tracks which sites are alive, reconciles updates by Lamport time stamp,
//! evicts sites that go silent past the timeout, and designates a leader.
//!
//! # Locking
//!
//! Entries live behind a single `RwLock`. Every mutation (upsert, removal,
//! failure sweep) is one write-lock critical section that leaves the entries
//! sorted. Queries take the read lock and return owned copies, so they never
//! see a half-applied mutation and are unaffected by later ones.
//!
//! # Events
//!
//! A mutation first enters the bus's dispatch section, then takes the write
//! lock, releases it and delivers its events before leaving the section. A
//! concurrent mutation waits at the section entry, so every subscriber sees an
//! event while the table still reflects it. Subscribers may query or mutate
//! the table from their callback; a nested mutation's events are delivered
//! after the current one.

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, TableConfig};
use crate::entry::SiteEntry;
use crate::events::{EventBus, Subscription, TableEvent};
use crate::site::{Site, SiteId};
use crate::sweeper::Sweeper;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info};

pub struct FingerTable {
    /// Sorted ascending by id, at most one entry per id
    entries: RwLock<Vec<SiteEntry>>,
    config: TableConfig,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    ready: AtomicBool,
}

impl FingerTable {
    /// Create a table using the system wall clock.
    pub fn new(config: TableConfig) -> Result<Arc<Self>, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a table with a custom clock (e.g. `ManualClock` in tests).
    pub fn with_clock(config: TableConfig, clock: Arc<dyn Clock>) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        Ok(Arc::new(Self {
            entries: RwLock::new(Vec::new()),
            config,
            clock,
            events: Arc::new(EventBus::new()),
            ready: AtomicBool::new(false),
        }))
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub fn sweep_interval(&self) -> Duration {
        self.config.sweep_interval()
    }

    /// Subscribe to join/failure/ready events.
    pub fn subscribe(
        &self,
        callback: impl Fn(&TableEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.subscribe(callback)
    }

    /// Signal that the table is initialized. Emits `Ready` only the first time.
    pub fn start(&self) {
        if self.ready.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(timeout = ?self.config.timeout, "Finger table ready");
        self.events.begin().publish([TableEvent::Ready]);
    }

    /// Start the periodic failure sweep for this table.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Sweeper {
        Sweeper::spawn(self)
    }

    /// Insert or update the entry for `site`.
    ///
    /// A new id creates an entry and emits `Join`. A known id is refreshed:
    /// the stored time stamp only ever grows. Afterwards the upserted site is
    /// the only one flagged as leader.
    pub fn upsert(&self, site: Site) {
        let dispatch = self.events.begin();
        let mut entries = self.write_entries();
        let now = self.clock.now();
        let id = site.id;

        let is_new = match entries.iter().position(|e| e.id() == id) {
            Some(index) => {
                entries[index].refresh(&site, now);
                debug!(%id, time_stamp = entries[index].site().time_stamp, "Refreshed site");
                false
            }
            None => {
                entries.push(SiteEntry::create(site, now));
                true
            }
        };

        entries.sort_by_key(SiteEntry::id);
        for entry in entries.iter_mut() {
            entry.set_leader(entry.id() == id);
        }

        let joined = match find(&entries, id) {
            Some(entry) if is_new => {
                info!(%id, address = %entry.site().address(), "Site joined");
                Some(TableEvent::Join(entry.clone()))
            }
            _ => None,
        };

        drop(entries);
        dispatch.publish(joined);
    }

    /// Snapshot of all entries, ascending by id.
    pub fn entries(&self) -> Vec<SiteEntry> {
        self.read_entries().clone()
    }

    pub fn entry_by_id(&self, id: SiteId) -> Option<SiteEntry> {
        find(&self.read_entries(), id).cloned()
    }

    pub fn contains(&self, id: SiteId) -> bool {
        find(&self.read_entries(), id).is_some()
    }

    /// Member ids and the current leader, read under one lock.
    pub fn summary(&self) -> TableSummary {
        let entries = self.read_entries();
        TableSummary {
            members: entries.iter().map(SiteEntry::id).collect(),
            leader: entries.iter().find(|e| e.is_leader()).map(SiteEntry::id),
        }
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    /// Remove an entry without emitting any event.
    ///
    /// Returns the removed entry if it existed.
    pub fn remove_entry_by_id(&self, id: SiteId) -> Option<SiteEntry> {
        // Waits for in-flight deliveries so a Join is never observed after
        // its entry is already gone.
        let _dispatch = self.events.begin();
        let mut entries = self.write_entries();
        let index = entries.iter().position(|e| e.id() == id)?;
        let removed = entries.remove(index);
        debug!(%id, "Removed site");
        Some(removed)
    }

    /// Evict every entry not heard from within the timeout.
    ///
    /// An entry whose clock sits exactly on the cutoff survives. Emits one
    /// `Failure` per evicted entry and returns them, ascending by id.
    pub fn remove_failured_entries(&self) -> Vec<SiteEntry> {
        let dispatch = self.events.begin();
        let mut entries = self.write_entries();
        let now = self.clock.now();

        // Nothing can be older than the epoch
        let Some(cutoff) = now.checked_sub(self.config.timeout) else {
            return Vec::new();
        };

        let (failed, mut live): (Vec<_>, Vec<_>) = std::mem::take(&mut *entries)
            .into_iter()
            .partition(|e| e.is_stale(cutoff));
        live.sort_by_key(SiteEntry::id);
        *entries = live;

        drop(entries);

        for entry in &failed {
            info!(id = %entry.id(), address = %entry.site().address(), "Site failed");
        }
        dispatch.publish(failed.iter().cloned().map(TableEvent::Failure));
        failed
    }

    /// Pick a random entry that is neither us nor the sender of a message.
    ///
    /// Used to choose the next hop when relaying gossip.
    pub fn randomly_pick_entry(&self, local: SiteId, sender: SiteId) -> Option<SiteEntry> {
        use rand::seq::IndexedRandom;

        let entries = self.read_entries();
        let candidates: Vec<_> = entries
            .iter()
            .filter(|e| e.id() != local && e.id() != sender)
            .collect();
        candidates.choose(&mut rand::rng()).map(|e| (*e).clone())
    }

    /// Routing-capable entries with an id strictly below `id`.
    pub fn entries_with_smaller_id(&self, id: SiteId) -> Vec<SiteEntry> {
        self.routable(|other| other < id)
    }

    /// Routing-capable entries with an id strictly above `id`.
    pub fn entries_with_greater_id(&self, id: SiteId) -> Vec<SiteEntry> {
        self.routable(|other| other > id)
    }

    /// Next routing-capable site clockwise from `id` on the ring.
    ///
    /// Wraps to the smallest id when nothing is greater. Never returns `id`.
    pub fn successor(&self, id: SiteId) -> Option<SiteEntry> {
        let ring = self.routable(|other| other != id);
        ring.iter()
            .find(|e| e.id() > id)
            .or_else(|| ring.first())
            .cloned()
    }

    /// Next routing-capable site counter-clockwise from `id` on the ring.
    ///
    /// Wraps to the largest id when nothing is smaller. Never returns `id`.
    pub fn predecessor(&self, id: SiteId) -> Option<SiteEntry> {
        let ring = self.routable(|other| other != id);
        ring.iter()
            .rev()
            .find(|e| e.id() < id)
            .or_else(|| ring.last())
            .cloned()
    }

    /// The entry currently flagged as leader, if any.
    pub fn leader(&self) -> Option<SiteEntry> {
        self.read_entries().iter().find(|e| e.is_leader()).cloned()
    }

    fn routable(&self, keep: impl Fn(SiteId) -> bool) -> Vec<SiteEntry> {
        self.read_entries()
            .iter()
            .filter(|e| !e.is_client() && keep(e.id()))
            .cloned()
            .collect()
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Vec<SiteEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Vec<SiteEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Consistent view of membership for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    /// Ascending by id
    pub members: Vec<SiteId>,
    pub leader: Option<SiteId>,
}

impl TableSummary {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

fn find(entries: &[SiteEntry], id: SiteId) -> Option<&SiteEntry> {
    entries
        .binary_search_by_key(&id, SiteEntry::id)
        .ok()
        .map(|index| &entries[index])
}
