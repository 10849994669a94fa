//! finger-table: a node's local view of a peer-to-peer membership group.
//!
//! This crate provides:
//! - `Site` records and Lamport-style time stamps
//! - `FingerTable`, which reconciles site updates, detects failures by
//!   timeout and designates a leader
//! - Join/failure/ready events delivered through a per-table `EventBus`
//! - A Tokio `Sweeper` that runs the failure sweep in the background

pub mod clock;
pub mod config;
pub mod entry;
pub mod events;
pub mod site;
pub mod sweeper;
pub mod table;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, TableConfig};
pub use entry::SiteEntry;
pub use events::{EventBus, Subscription, TableEvent};
pub use site::{Site, SiteError, SiteId};
pub use sweeper::Sweeper;
pub use table::{FingerTable, TableSummary};
