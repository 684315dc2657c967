//! Per-peer state.

use std::sync::Arc;

use crate::checksum::{Checksum, ChecksumRecord, Observation};
use crate::domain::{Domain, PerDomain};
use crate::metrics::NodeMetrics;
use crate::rows::ChecksumRow;
use crate::types::{NodeId, PeerAddress};

/// Everything tracked for one peer.
///
/// Metrics are double-buffered: [`NodeEntry::set_metrics`] fills the idle
/// slot with a fresh immutable snapshot and then flips the index, so a
/// handle obtained from [`NodeEntry::metrics_curr`] is always a complete
/// snapshot.
#[derive(Debug, Clone)]
pub struct NodeEntry {
    id: NodeId,
    address: PeerAddress,
    /// Tie-break priority during peer selection (higher wins).
    pub weight: u64,
    pub comment: String,
    /// Liveness flag, used as the mark bit during reconciliation.
    pub active: bool,
    metrics: [Arc<NodeMetrics>; 2],
    metrics_idx: usize,
    metrics_version: u64,
    advertised_global: Checksum,
    global_checksum: Checksum,
    checksums: PerDomain<ChecksumRecord>,
}

impl NodeEntry {
    pub fn new(address: PeerAddress, weight: u64, comment: impl Into<String>) -> Self {
        let empty = Arc::new(NodeMetrics::default());
        let checksums = PerDomain::<ChecksumRecord>::default();
        let global_checksum = Checksum::combine(checksums.iter().map(|(_, r)| r.checksum()));
        Self {
            id: address.node_id(),
            address,
            weight,
            comment: comment.into(),
            active: true,
            metrics: [Arc::clone(&empty), empty],
            metrics_idx: 0,
            metrics_version: 0,
            advertised_global: Checksum::ZERO,
            global_checksum,
            checksums,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    /// Publish a new metrics snapshot.
    pub fn set_metrics(&mut self, metrics: NodeMetrics) {
        let next = self.metrics_idx ^ 1;
        self.metrics[next] = Arc::new(metrics);
        self.metrics_idx = next;
        self.metrics_version += 1;
    }

    pub fn metrics_curr(&self) -> Arc<NodeMetrics> {
        Arc::clone(&self.metrics[self.metrics_idx])
    }

    pub fn metrics_prev(&self) -> Arc<NodeMetrics> {
        Arc::clone(&self.metrics[self.metrics_idx ^ 1])
    }

    /// Number of snapshots published so far.
    pub fn metrics_version(&self) -> u64 {
        self.metrics_version
    }

    pub fn checksum(&self, domain: Domain) -> &ChecksumRecord {
        self.checksums.get(domain)
    }

    pub fn checksums(&self) -> &PerDomain<ChecksumRecord> {
        &self.checksums
    }

    /// Aggregate of every domain checksum this entry holds.
    pub fn global_checksum(&self) -> Checksum {
        self.global_checksum
    }

    /// The global checksum last advertised by the peer itself.
    pub fn advertised_global(&self) -> Checksum {
        self.advertised_global
    }

    /// Record an advertised global checksum; returns `true` if it changed.
    pub fn observe_global(&mut self, checksum: Checksum) -> bool {
        let changed = self.advertised_global != checksum;
        self.advertised_global = checksum;
        changed
    }

    /// Apply checksum rows. Domains absent from `rows` are left untouched.
    ///
    /// Returns the domains whose stored checksum changed.
    pub fn set_checksums(
        &mut self,
        rows: &[ChecksumRow],
        local: &PerDomain<Checksum>,
        now: i64,
    ) -> Vec<Domain> {
        let mut changed = Vec::new();
        for row in rows {
            let record = self.checksums.get_mut(row.domain);
            if record.observe(row.value, *local.get(row.domain), now) == Observation::Changed {
                changed.push(row.domain);
            }
        }
        self.recompute_global();
        changed
    }

    /// Re-observe every domain with its stored value.
    ///
    /// Used when the peer's global checksum is unchanged: nothing needs
    /// fetching, but pending differences keep accruing polls.
    pub fn touch_checksums(&mut self, local: &PerDomain<Checksum>, now: i64) {
        for domain in Domain::ALL {
            let record = self.checksums.get_mut(domain);
            let value = record.value;
            record.observe(value, *local.get(domain), now);
        }
    }

    /// Clear hysteresis on `domain` if this peer now matches `local`.
    pub fn resync_local(&mut self, domain: Domain, local: Checksum) {
        self.checksums.get_mut(domain).resync_local(local);
    }

    pub fn recompute_global(&mut self) {
        self.global_checksum = Checksum::combine(self.checksums.iter().map(|(_, r)| r.checksum()));
    }
}
