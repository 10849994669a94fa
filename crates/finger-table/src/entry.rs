//! Finger table entries: a site plus the local time we last heard of it.

use crate::site::{Site, SiteId};
use serde::{Serialize, Serializer};
use web_time::{SystemTime, UNIX_EPOCH};

/// An entry in the finger table.
///
/// `clock` is local to this node and is never sent to other peers; it only
/// drives failure detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteEntry {
    #[serde(flatten)]
    site: Site,
    /// When this entry was created or last refreshed, local wall clock
    #[serde(serialize_with = "serialize_clock")]
    clock: SystemTime,
}

impl SiteEntry {
    pub fn create(site: Site, now: SystemTime) -> Self {
        Self { site, clock: now }
    }

    /// Merge newer status from `site` into this entry.
    ///
    /// The logical time stamp never moves backwards; leader and client flags
    /// are taken as given.
    pub fn refresh(&mut self, site: &Site, now: SystemTime) {
        self.site.time_stamp = self.site.time_stamp.max(site.time_stamp);
        self.site.leader = site.leader;
        self.site.client = site.client;
        self.clock = now;
    }

    /// True if this entry was last heard from strictly before `cutoff`.
    pub fn is_stale(&self, cutoff: SystemTime) -> bool {
        self.clock < cutoff
    }

    pub fn id(&self) -> SiteId {
        self.site.id
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn into_site(self) -> Site {
        self.site
    }

    pub fn clock(&self) -> SystemTime {
        self.clock
    }

    /// Milliseconds since the Unix epoch.
    pub fn clock_ms(&self) -> f64 {
        millis_since_epoch(self.clock)
    }

    pub fn is_leader(&self) -> bool {
        self.site.leader
    }

    pub fn is_client(&self) -> bool {
        self.site.client
    }

    pub(crate) fn set_leader(&mut self, leader: bool) {
        self.site.leader = leader;
    }
}

fn millis_since_epoch(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

fn serialize_clock<S: Serializer>(clock: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(millis_since_epoch(*clock))
}
