//! The peer registry.
//!
//! Every structural change and lookup goes through one mutex. The lock is
//! held only for map operations and field writes on entries; nothing in
//! this module performs I/O.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use fleetsync_core::rows::{parse_checksum_rows, parse_global_checksum, parse_server_rows};
use fleetsync_core::{
    Checksum, ChecksumRecord, ChecksumValue, Domain, NodeEntry, NodeId, NodeMetrics, PeerAddress,
    PerDomain, ResultSet, ServerRow,
};
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::local::LocalChecksums;
use crate::selection::{select, SyncCandidate, SyncDecision};

/// Hysteresis threshold applied when none is configured.
pub const DEFAULT_DIFFS_BEFORE_SYNC: u32 = 3;

/// Changes made by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<PeerAddress>,
    pub updated: Vec<PeerAddress>,
    pub removed: Vec<PeerAddress>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Read-only copy of a peer's state, detached from the registry lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub id: NodeId,
    pub address: PeerAddress,
    pub weight: u64,
    pub comment: String,
    pub active: bool,
    pub metrics: Arc<NodeMetrics>,
    pub prev_metrics: Arc<NodeMetrics>,
    pub global_checksum: Checksum,
    pub checksums: PerDomain<ChecksumRecord>,
}

impl From<&NodeEntry> for PeerSnapshot {
    fn from(entry: &NodeEntry) -> Self {
        Self {
            id: entry.id(),
            address: entry.address().clone(),
            weight: entry.weight,
            comment: entry.comment.clone(),
            active: entry.active,
            metrics: entry.metrics_curr(),
            prev_metrics: entry.metrics_prev(),
            global_checksum: entry.global_checksum(),
            checksums: entry.checksums().clone(),
        }
    }
}

/// Identity → state map for every known peer.
pub struct NodeRegistry {
    nodes: Mutex<HashMap<NodeId, NodeEntry>>,
    local: Arc<LocalChecksums>,
    self_ids: RwLock<HashSet<NodeId>>,
    thresholds: RwLock<PerDomain<u32>>,
}

impl NodeRegistry {
    pub fn new(local: Arc<LocalChecksums>) -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
            local,
            self_ids: RwLock::new(HashSet::new()),
            thresholds: RwLock::new(PerDomain::from_fn(|_| DEFAULT_DIFFS_BEFORE_SYNC)),
        }
    }

    fn nodes(&self) -> MutexGuard<'_, HashMap<NodeId, NodeEntry>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn local(&self) -> &Arc<LocalChecksums> {
        &self.local
    }

    /// Declare the addresses this instance listens on.
    ///
    /// Peers at these addresses are tracked like any other but are never
    /// chosen as a sync source.
    pub fn set_admin_interfaces(&self, addresses: &[PeerAddress]) {
        let ids = addresses.iter().map(PeerAddress::node_id).collect();
        *self.self_ids.write().unwrap_or_else(PoisonError::into_inner) = ids;
    }

    pub fn is_self(&self, id: NodeId) -> bool {
        self.self_ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    pub fn set_diffs_before_sync(&self, domain: Domain, threshold: u32) {
        *self
            .thresholds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(domain) = threshold;
    }

    pub fn diffs_before_sync(&self, domain: Domain) -> u32 {
        *self
            .thresholds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(domain)
    }

    pub fn len(&self) -> usize {
        self.nodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes().is_empty()
    }

    pub fn contains(&self, address: &PeerAddress) -> bool {
        self.nodes().contains_key(&address.node_id())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────

    /// Align the registry with an authoritative list (mark and sweep).
    ///
    /// Existing entries keep their metrics and checksum history; entries
    /// absent from `rows` are removed. The whole pass runs under the lock.
    pub fn load_servers_list(&self, rows: &[ServerRow]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut nodes = self.nodes();

        for entry in nodes.values_mut() {
            entry.active = false;
        }

        for row in rows {
            let address = row.address();
            let id = address.node_id();
            match nodes.get_mut(&id) {
                Some(entry) => {
                    if !entry.active
                        && (entry.weight != row.weight || entry.comment != row.comment)
                    {
                        report.updated.push(address);
                    }
                    entry.weight = row.weight;
                    entry.comment.clone_from(&row.comment);
                    entry.active = true;
                }
                None => {
                    nodes.insert(id, NodeEntry::new(address.clone(), row.weight, row.comment.clone()));
                    report.added.push(address);
                }
            }
        }

        nodes.retain(|_, entry| {
            if !entry.active {
                report.removed.push(entry.address().clone());
            }
            entry.active
        });
        drop(nodes);

        if !report.is_noop() {
            info!(
                added = report.added.len(),
                updated = report.updated.len(),
                removed = report.removed.len(),
                "reconciled peer list"
            );
        }
        report
    }

    /// Parse a server-list result set and reconcile against it.
    ///
    /// Malformed rows are skipped; `OFFLINE_HARD` rows are treated as absent.
    pub fn load_servers_result(&self, set: &ResultSet) -> ReconcileReport {
        let rows: Vec<ServerRow> = parse_server_rows(set)
            .into_iter()
            .filter_map(|row| match row {
                Ok(row) if row.is_offline_hard() => None,
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(error = %e, "skipping malformed server row");
                    None
                }
            })
            .collect();
        self.load_servers_list(&rows)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inbound reports
    // ─────────────────────────────────────────────────────────────────────

    /// Store a metrics snapshot reported by `address`.
    ///
    /// The result set is validated in full before the entry is touched.
    pub fn update_node_metrics(
        &self,
        address: &PeerAddress,
        set: &ResultSet,
        response_time_us: u64,
        now_us: u64,
    ) -> Result<()> {
        let metrics = NodeMetrics::from_status(set, now_us, response_time_us).map_err(|source| {
            RegistryError::Malformed {
                address: address.clone(),
                source,
            }
        })?;

        let mut nodes = self.nodes();
        let entry = nodes
            .get_mut(&address.node_id())
            .ok_or_else(|| unknown(address))?;
        entry.set_metrics(metrics);
        Ok(())
    }

    /// Record the global checksum advertised by `address`.
    ///
    /// Returns `true` when it changed, meaning per-domain checksums should
    /// be fetched. When unchanged, every domain is re-observed so pending
    /// differences keep counting towards the hysteresis threshold.
    pub fn update_global_checksum(
        &self,
        address: &PeerAddress,
        set: &ResultSet,
        now: i64,
    ) -> Result<bool> {
        let checksum = parse_global_checksum(set).map_err(|source| RegistryError::Malformed {
            address: address.clone(),
            source,
        })?;
        let local = self.local.checksums();

        let mut nodes = self.nodes();
        let entry = nodes
            .get_mut(&address.node_id())
            .ok_or_else(|| unknown(address))?;
        let changed = entry.observe_global(checksum);
        if !changed {
            entry.touch_checksums(&local, now);
        }
        Ok(changed)
    }

    /// Apply the per-domain checksum rows reported by `address`.
    ///
    /// Each row is validated on its own; malformed rows are skipped and the
    /// rest applied. Returns the domains whose checksum changed.
    pub fn update_node_checksums(
        &self,
        address: &PeerAddress,
        set: &ResultSet,
        now: i64,
    ) -> Result<Vec<Domain>> {
        let rows: Vec<_> = parse_checksum_rows(set)
            .into_iter()
            .filter_map(|row| match row {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(peer = %address, error = %e, "skipping malformed checksum row");
                    None
                }
            })
            .collect();
        let local = self.local.checksums();

        let mut nodes = self.nodes();
        let entry = nodes
            .get_mut(&address.node_id())
            .ok_or_else(|| unknown(address))?;
        let changed = entry.set_checksums(&rows, &local, now);
        drop(nodes);

        for domain in &changed {
            debug!(peer = %address, domain = %domain, "peer checksum changed");
        }
        Ok(changed)
    }

    /// Clear hysteresis for `domain` on every peer that now matches us.
    ///
    /// Called after the local copy of `domain` changed.
    pub fn resync_local(&self, domain: Domain) {
        let local = self.local.checksum(domain);
        for entry in self.nodes().values_mut() {
            entry.resync_local(domain, local);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Choose the sync source for `domain` using the configured threshold.
    pub fn peer_to_sync(&self, domain: Domain) -> SyncDecision {
        self.peer_to_sync_with(domain, self.diffs_before_sync(domain))
    }

    pub fn peer_to_sync_with(&self, domain: Domain, threshold: u32) -> SyncDecision {
        let local = self.local.get(domain);
        let exclude = self
            .self_ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let nodes = self.nodes();
        select(nodes.values(), domain, local, threshold, &exclude)
    }

    pub fn get_peer_to_sync_mysql_query_rules(&self) -> Option<SyncCandidate> {
        self.peer_to_sync(Domain::MysqlQueryRules).candidate()
    }

    pub fn get_peer_to_sync_mysql_servers(&self) -> Option<SyncCandidate> {
        self.peer_to_sync(Domain::MysqlServers).candidate()
    }

    pub fn get_peer_to_sync_mysql_users(&self) -> Option<SyncCandidate> {
        self.peer_to_sync(Domain::MysqlUsers).candidate()
    }

    pub fn get_peer_to_sync_mysql_variables(&self) -> Option<SyncCandidate> {
        self.peer_to_sync(Domain::MysqlVariables).candidate()
    }

    pub fn get_peer_to_sync_admin_variables(&self) -> Option<SyncCandidate> {
        self.peer_to_sync(Domain::AdminVariables).candidate()
    }

    pub fn get_peer_to_sync_ldap_variables(&self) -> Option<SyncCandidate> {
        self.peer_to_sync(Domain::LdapVariables).candidate()
    }

    pub fn get_peer_to_sync_proxysql_servers(&self) -> Option<SyncCandidate> {
        self.peer_to_sync(Domain::ProxysqlServers).candidate()
    }

    /// Current advertised value of one peer's domain.
    pub fn peer_checksum(&self, id: NodeId, domain: Domain) -> Option<ChecksumValue> {
        self.nodes().get(&id).map(|e| e.checksum(domain).value)
    }

    pub fn get(&self, address: &PeerAddress) -> Option<PeerSnapshot> {
        self.nodes().get(&address.node_id()).map(PeerSnapshot::from)
    }

    /// Snapshot of every peer, ordered by address.
    pub fn peers(&self) -> Vec<PeerSnapshot> {
        let mut peers: Vec<PeerSnapshot> = self.nodes().values().map(PeerSnapshot::from).collect();
        peers.sort_by(|a, b| a.address.cmp(&b.address));
        peers
    }

    /// Addresses of every peer, ordered.
    pub fn addresses(&self) -> Vec<PeerAddress> {
        let mut addresses: Vec<PeerAddress> =
            self.nodes().values().map(|e| e.address().clone()).collect();
        addresses.sort();
        addresses
    }

    pub(crate) fn with_nodes<R>(&self, f: impl FnOnce(&HashMap<NodeId, NodeEntry>) -> R) -> R {
        f(&self.nodes())
    }
}

fn unknown(address: &PeerAddress) -> RegistryError {
    warn!(peer = %address, "report from unknown peer dropped");
    RegistryError::UnknownPeer {
        address: address.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_core::{ChecksumValue, Row};
    use proptest::prelude::*;
    use std::thread;

    fn registry() -> NodeRegistry {
        NodeRegistry::new(Arc::new(LocalChecksums::new()))
    }

    fn server(host: &str) -> ServerRow {
        ServerRow::new(host, 6032, 1, "")
    }

    fn addr(host: &str) -> PeerAddress {
        PeerAddress::new(host, 6032)
    }

    fn status(n: u64) -> ResultSet {
        let mut set = ResultSet::new(["Variable_Name", "Variable_Value"]);
        for name in fleetsync_core::metrics::variables::ALL {
            set.push(Row::from_values([name.to_string(), n.to_string()]));
        }
        set
    }

    fn checksums(domain: Domain, c: u64) -> ResultSet {
        checksums_at(domain, c, 1)
    }

    fn checksums_at(domain: Domain, c: u64, epoch: i64) -> ResultSet {
        ResultSet::new(["name", "version", "epoch", "checksum"]).with_row(Row::from_values([
            domain.as_str().to_string(),
            "2".to_string(),
            epoch.to_string(),
            Checksum(c).to_hex(),
        ]))
    }

    #[test]
    fn test_reconcile_adds_and_removes() {
        let reg = registry();
        let report = reg.load_servers_list(&[server("a"), server("b"), server("c")]);
        assert_eq!(report.added.len(), 3);

        let report = reg.load_servers_list(&[server("a"), server("c")]);
        assert_eq!(report.removed, vec![addr("b")]);
        assert!(report.added.is_empty());
        assert_eq!(reg.addresses(), vec![addr("a"), addr("c")]);
    }

    #[test]
    fn test_reconcile_preserves_history() {
        let reg = registry();
        reg.load_servers_list(&[server("a"), server("b"), server("c")]);
        reg.update_node_metrics(&addr("a"), &status(7), 10, 1).unwrap();
        reg.update_node_checksums(&addr("c"), &checksums(Domain::MysqlUsers, 9), 100)
            .unwrap();

        reg.load_servers_list(&[server("c"), server("a")]);
        assert_eq!(reg.get(&addr("a")).unwrap().metrics.questions, 7);
        let c = reg.get(&addr("c")).unwrap();
        assert_eq!(c.checksums.get(Domain::MysqlUsers).checksum(), Checksum(9));
        assert_eq!(c.checksums.get(Domain::MysqlUsers).last_changed, 100);
    }

    #[test]
    fn test_reconcile_updates_weight() {
        let reg = registry();
        reg.load_servers_list(&[server("a")]);
        let report = reg.load_servers_list(&[ServerRow::new("a", 6032, 9, "primary")]);
        assert_eq!(report.updated, vec![addr("a")]);
        let a = reg.get(&addr("a")).unwrap();
        assert_eq!(a.weight, 9);
        assert_eq!(a.comment, "primary");
    }

    #[test]
    fn test_load_servers_result_skips_bad_rows() {
        let reg = registry();
        let set = ResultSet::new(["hostname", "port", "weight", "comment", "status"])
            .with_row(Row::from_values(["a", "6032", "1", "", "ONLINE"]))
            .with_row(Row::from_values(["b", "6032", "1", "", "OFFLINE_HARD"]))
            .with_row(Row::from_values(["c", "nope", "1", "", "ONLINE"]));
        let report = reg.load_servers_result(&set);
        assert_eq!(report.added, vec![addr("a")]);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_unknown_peer_leaves_registry_unchanged() {
        let reg = registry();
        reg.load_servers_list(&[server("a")]);
        let before = reg.peers();

        let err = reg.update_node_metrics(&addr("zz"), &status(1), 1, 1).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownPeer { .. }));
        assert!(reg
            .update_node_checksums(&addr("zz"), &checksums(Domain::MysqlUsers, 3), 1)
            .is_err());
        assert_eq!(reg.peers(), before);
    }

    #[test]
    fn test_malformed_metrics_not_applied() {
        let reg = registry();
        reg.load_servers_list(&[server("a")]);
        reg.update_node_metrics(&addr("a"), &status(5), 1, 1).unwrap();

        let partial = ResultSet::new(["Variable_Name", "Variable_Value"])
            .with_row(Row::from_values(["Questions", "99"]));
        let err = reg.update_node_metrics(&addr("a"), &partial, 1, 2).unwrap_err();
        assert!(matches!(err, RegistryError::Malformed { .. }));
        assert_eq!(reg.get(&addr("a")).unwrap().metrics.questions, 5);
    }

    #[test]
    fn test_global_checksum_drives_hysteresis() {
        let reg = registry();
        reg.set_diffs_before_sync(Domain::MysqlUsers, 3);
        reg.load_servers_list(&[server("a")]);
        let global = ResultSet::new(["global_checksum"]).with_row(Row::from_values(["0x0000000000000042"]));

        assert!(reg.update_global_checksum(&addr("a"), &global, 1).unwrap());
        reg.update_node_checksums(&addr("a"), &checksums(Domain::MysqlUsers, 9), 1)
            .unwrap();
        assert!(reg.get_peer_to_sync_mysql_users().is_none());

        assert!(!reg.update_global_checksum(&addr("a"), &global, 2).unwrap());
        assert!(matches!(
            reg.peer_to_sync(Domain::MysqlUsers),
            SyncDecision::Delayed { pending: 1 }
        ));
        assert!(!reg.update_global_checksum(&addr("a"), &global, 3).unwrap());
        let c = reg.get_peer_to_sync_mysql_users().unwrap();
        assert_eq!(c.address, addr("a"));
        assert_eq!(c.value.checksum, Checksum(9));
    }

    #[test]
    fn test_self_never_selected() {
        let reg = registry();
        reg.set_diffs_before_sync(Domain::MysqlUsers, 1);
        reg.load_servers_list(&[server("me")]);
        reg.update_node_checksums(&addr("me"), &checksums(Domain::MysqlUsers, 9), 1)
            .unwrap();
        assert!(reg.get_peer_to_sync_mysql_users().is_some());

        reg.set_admin_interfaces(&[addr("me")]);
        assert_eq!(reg.peer_to_sync(Domain::MysqlUsers), SyncDecision::InSync);
    }

    #[test]
    fn test_resync_local_clears_matching_peers() {
        let reg = registry();
        reg.set_diffs_before_sync(Domain::MysqlUsers, 1);
        reg.load_servers_list(&[server("a")]);
        reg.update_node_checksums(&addr("a"), &checksums(Domain::MysqlUsers, 9), 1)
            .unwrap();

        reg.local()
            .set(Domain::MysqlUsers, ChecksumValue::new(Checksum(9), 1, 1));
        reg.resync_local(Domain::MysqlUsers);
        let a = reg.get(&addr("a")).unwrap();
        assert_eq!(a.checksums.get(Domain::MysqlUsers).diff_check, 0);
        assert_eq!(reg.peer_to_sync(Domain::MysqlUsers), SyncDecision::InSync);
    }

    #[test]
    fn test_local_load_outranks_older_peer_change() {
        let reg = registry();
        reg.set_diffs_before_sync(Domain::MysqlUsers, 3);
        reg.load_servers_list(&[server("a")]);
        let rows = checksums_at(Domain::MysqlUsers, 0xAB, 1_700_000_000);
        reg.update_node_checksums(&addr("a"), &rows, 1).unwrap();
        reg.update_node_checksums(&addr("a"), &rows, 2).unwrap();

        reg.local()
            .record_load(Domain::MysqlUsers, Checksum(0x77), 1_800_000_000);
        reg.resync_local(Domain::MysqlUsers);
        reg.update_node_checksums(&addr("a"), &rows, 3).unwrap();

        assert_eq!(
            reg.peer_to_sync(Domain::MysqlUsers),
            SyncDecision::LocalNewer { peers: 1 }
        );
        assert!(reg.get_peer_to_sync_mysql_users().is_none());
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let reg = Arc::new(registry());
        reg.load_servers_list(&[server("a")]);

        let writer = {
            let reg = Arc::clone(&reg);
            thread::spawn(move || {
                for n in 1..500u64 {
                    reg.update_node_metrics(&addr("a"), &status(n), n, n).unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let m = reg.get(&addr("a")).unwrap().metrics;
                        assert_eq!(m.questions, m.uptime);
                        assert_eq!(m.questions, m.client_connections_created);
                        assert_eq!(m.questions, m.servers_table_version);
                        assert_eq!(m.questions, m.response_time_us);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }

    proptest! {
        #[test]
        fn test_reconcile_idempotent(hosts in prop::collection::btree_set("[a-f]{1,3}", 0..8)) {
            let reg = registry();
            let rows: Vec<ServerRow> = hosts.iter().map(|h| server(h)).collect();
            reg.load_servers_list(&rows);
            for row in &rows {
                reg.update_node_metrics(&row.address(), &status(3), 1, 1).unwrap();
            }
            let before = reg.peers();

            let report = reg.load_servers_list(&rows);
            prop_assert!(report.is_noop());
            prop_assert_eq!(reg.peers(), before);
        }
    }
}
