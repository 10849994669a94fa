//! Site: identity and status of a peer in the membership group.
//!
//! A `Site` is the record exchanged at the table boundary. Only `id` is
//! required; the status fields default when a record omits them.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("Site record has no id")]
    MissingId,
    #[error("Invalid site id: expected a non-negative integer, got {0}")]
    InvalidId(String),
    #[error("Invalid site address {0:?}: expected ip:port or id@ip:port")]
    InvalidAddress(String),
    #[error("Malformed site record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Numeric identifier of a site, unique within the group.
///
/// Ordering on `SiteId` is the table's sort key and defines the ring used for
/// successor/predecessor lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(u64);

impl SiteId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for SiteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SiteId {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| SiteError::InvalidId(s.to_string()))
    }
}

impl From<u64> for SiteId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<SiteId> for u64 {
    fn from(id: SiteId) -> u64 {
        id.0
    }
}

/// A peer as seen by the membership table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: SiteId,
    pub ip: String,
    pub port: u16,
    /// True if this site is currently believed to be the leader
    #[serde(default)]
    pub leader: bool,
    /// Lamport-style logical clock; larger means newer
    #[serde(default)]
    pub time_stamp: u64,
    /// Pure clients never act as routing targets
    #[serde(default)]
    pub client: bool,
}

impl Site {
    pub fn new(id: u64, ip: impl Into<String>, port: u16) -> Self {
        Self {
            id: SiteId(id),
            ip: ip.into(),
            port,
            leader: false,
            time_stamp: 0,
            client: false,
        }
    }

    /// Create a client-only site (excluded from ring routing).
    pub fn client(id: u64, ip: impl Into<String>, port: u16) -> Self {
        Self {
            client: true,
            ..Self::new(id, ip, port)
        }
    }

    pub fn with_time_stamp(mut self, time_stamp: u64) -> Self {
        self.time_stamp = time_stamp;
        self
    }

    pub fn with_leader(mut self, leader: bool) -> Self {
        self.leader = leader;
        self
    }

    /// Network address as `ip:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Advance the logical clock for a local event.
    pub fn tick(&mut self) -> u64 {
        self.time_stamp = self.time_stamp.saturating_add(1);
        self.time_stamp
    }

    /// Merge a remote logical clock on message receipt.
    pub fn observe(&mut self, remote: u64) -> u64 {
        self.time_stamp = self.time_stamp.max(remote).saturating_add(1);
        self.time_stamp
    }

    /// Parse and validate an inbound site record.
    ///
    /// Rejects records without a usable `id` before anything reaches the table.
    pub fn from_json(json: &str) -> Result<Self, SiteError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        match value.get("id") {
            None | Some(serde_json::Value::Null) => return Err(SiteError::MissingId),
            Some(id) if id.as_u64().is_none() => return Err(SiteError::InvalidId(id.to_string())),
            Some(_) => {}
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<String, SiteError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Display for Site {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.ip, self.port)
    }
}

/// Parses `id@ip:port`, or `ip:port` with the port doubling as the id.
impl FromStr for Site {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || SiteError::InvalidAddress(s.to_string());

        let (id, address) = match s.split_once('@') {
            Some((id, address)) => (Some(id.parse::<SiteId>()?), address),
            None => (None, s),
        };

        let (ip, port) = address.rsplit_once(':').ok_or_else(invalid)?;
        if ip.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;
        let id = id.unwrap_or(SiteId(u64::from(port)));

        Ok(Site::new(id.as_u64(), ip, port))
    }
}
