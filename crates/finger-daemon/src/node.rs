//! A running node: finger table, event logging and failure sweeper.

use crate::args::NodeConfig;
use anyhow::Result;
use finger_table::{FingerTable, Site, Subscription, Sweeper, TableEvent, TableSummary};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Node {
    local: Site,
    table: Arc<FingerTable>,
    sweeper: Sweeper,
    _events: Subscription,
}

impl Node {
    /// Build the table, attach the event logger, seed peers and start sweeping.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: NodeConfig) -> Result<Self> {
        let table = FingerTable::new(config.table)?;
        let events = table.subscribe(log_event);

        table.start();
        for seed in config.seeds {
            debug!("Seeding peer {}", seed);
            table.upsert(seed);
        }

        let sweeper = table.spawn_sweeper();
        info!(
            "Node {} ({}) tracking {} peer(s)",
            config.local.id,
            config.local.address(),
            table.summary().len()
        );

        Ok(Self {
            local: config.local,
            table,
            sweeper,
            _events: events,
        })
    }

    pub fn local(&self) -> &Site {
        &self.local
    }

    pub fn table(&self) -> &Arc<FingerTable> {
        &self.table
    }

    /// Log a one-line summary of current membership.
    pub fn report(&self) {
        info!("{}", status_line(&self.table.summary()));
    }

    /// Stop the sweeper and release the table.
    pub async fn shutdown(self) {
        self.sweeper.stop().await;
        info!("Node {} stopped", self.local.id);
    }
}

fn status_line(summary: &TableSummary) -> String {
    let members: Vec<_> = summary.members.iter().map(|id| id.to_string()).collect();
    let leader = summary
        .leader
        .map(|id| id.to_string())
        .unwrap_or_else(|| "none".into());
    format!("Members [{}], leader {}", members.join(", "), leader)
}

fn log_event(event: &TableEvent) {
    match event {
        TableEvent::Join(entry) => info!("Peer joined: {}", entry.site()),
        TableEvent::Failure(entry) => warn!("Peer failed: {}", entry.site()),
        TableEvent::Ready => info!("Finger table ready"),
    }
    match serde_json::to_string(event) {
        Ok(json) => debug!("Table event {}", json),
        Err(e) => warn!("Failed to serialize table event: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Args;
    use clap::Parser;
    use finger_table::SiteId;

    #[tokio::test]
    async fn test_start_seeds_peers() {
        let args = Args::try_parse_from([
            "finger-daemon",
            "-p",
            "9000",
            "-o",
            "1@127.0.0.1:9001,2@127.0.0.1:9002",
        ])
        .unwrap();
        let node = Node::start(NodeConfig::from_args(&args).unwrap()).unwrap();

        assert_eq!(node.local().id, SiteId::from(9000));
        assert_eq!(node.table().len(), 2);
        // Last seed upserted holds the leader flag
        assert_eq!(node.table().leader().unwrap().id(), SiteId::from(2));

        node.report();
        node.shutdown().await;
    }

    #[test]
    fn test_status_line_lists_members_and_leader() {
        let summary = TableSummary {
            members: vec![SiteId::from(1), SiteId::from(4)],
            leader: Some(SiteId::from(4)),
        };
        assert_eq!(status_line(&summary), "Members [1, 4], leader 4");

        let empty = TableSummary {
            members: Vec::new(),
            leader: None,
        };
        assert_eq!(status_line(&empty), "Members [], leader none");
    }

    #[tokio::test]
    async fn test_report_reflects_latest_membership() {
        let args = Args::try_parse_from(["finger-daemon", "-p", "9000", "-o", "127.0.0.1:9001"]).unwrap();
        let node = Node::start(NodeConfig::from_args(&args).unwrap()).unwrap();

        node.table().upsert(Site::new(3, "127.0.0.1", 9003));
        node.table().remove_entry_by_id(SiteId::from(3));

        assert_eq!(
            status_line(&node.table().summary()),
            "Members [9001], leader none"
        );
        node.shutdown().await;
    }
}
