//! Status polling.
//!
//! Each cycle every known peer is asked for its global checksum. Per-domain
//! checksums are only fetched when that changes (or on the first contact),
//! and metrics every `check_status_frequency` cycles.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use fleetsync_core::{now_micros, now_millis, Domain, NodeId, PeerAddress};
use fleetsync_registry::NodeRegistry;

use crate::config::ConfigCell;
use crate::error::Result;
use crate::peer::{bounded, PeerConnection, PeerConnector};
use crate::queries;

/// What one poll of one peer found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub address: PeerAddress,
    pub global_changed: bool,
    /// Whether per-domain checksums were fetched.
    pub checksums_fetched: bool,
    pub changed_domains: Vec<Domain>,
    /// Round-trip of the metrics query, when metrics were polled.
    pub response_time_us: Option<u64>,
}

/// Polls peers and feeds the registry.
pub struct PeerMonitor<C: PeerConnector> {
    registry: Arc<NodeRegistry>,
    connector: Arc<C>,
    config: Arc<ConfigCell>,
    /// Peers whose checksums match their last advertised global.
    seen: Mutex<HashSet<NodeId>>,
}

impl<C: PeerConnector + 'static> PeerMonitor<C> {
    pub fn new(registry: Arc<NodeRegistry>, connector: Arc<C>, config: Arc<ConfigCell>) -> Self {
        Self {
            registry,
            connector,
            config,
            seen: Mutex::new(HashSet::new()),
        }
    }

    fn seen(&self) -> std::sync::MutexGuard<'_, HashSet<NodeId>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Poll one peer for cycle number `tick`.
    pub async fn poll_peer(&self, address: &PeerAddress, tick: u64) -> Result<PollReport> {
        let config = self.config.load();
        let limit = config.query_timeout();
        let mut conn = bounded(
            address,
            limit,
            self.connector.connect(address, &config.credentials),
        )
        .await?;

        let global = bounded(address, limit, conn.query(queries::GLOBAL_CHECKSUM)).await?;
        let global_changed = self
            .registry
            .update_global_checksum(address, &global, now_millis())?;

        // A peer stays unseen until its checksums for the current global
        // have been stored, so a failed fetch is retried on the next poll.
        let id = address.node_id();
        let stale = {
            let mut seen = self.seen();
            if global_changed {
                seen.remove(&id);
            }
            !seen.contains(&id)
        };
        let mut changed_domains = Vec::new();
        let checksums_fetched = stale;
        if checksums_fetched {
            let set = bounded(address, limit, conn.query(queries::CHECKSUMS)).await?;
            changed_domains = self
                .registry
                .update_node_checksums(address, &set, now_millis())?;
            self.seen().insert(id);
        }

        let mut response_time_us = None;
        if tick % config.check_status_frequency.max(1) == 0 {
            let started = Instant::now();
            let set = bounded(address, limit, conn.query(queries::METRICS)).await?;
            let elapsed = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
            self.registry
                .update_node_metrics(address, &set, elapsed, now_micros())?;
            response_time_us = Some(elapsed);
        }

        debug!(
            peer = %address,
            tick,
            global_changed,
            changed = changed_domains.len(),
            "polled peer"
        );
        Ok(PollReport {
            address: address.clone(),
            global_changed,
            checksums_fetched,
            changed_domains,
            response_time_us,
        })
    }

    /// Poll every registered peer concurrently.
    ///
    /// Failures are logged and returned per peer; one unreachable peer
    /// does not affect the others. Results are ordered by address.
    pub async fn poll_all(self: &Arc<Self>, tick: u64) -> Vec<(PeerAddress, Result<PollReport>)> {
        let addresses = self.registry.addresses();
        let live: HashSet<NodeId> = addresses.iter().map(PeerAddress::node_id).collect();
        self.seen().retain(|id| live.contains(id));

        let mut tasks = JoinSet::new();
        for address in addresses {
            let monitor = Arc::clone(self);
            tasks.spawn(async move {
                let result = monitor.poll_peer(&address, tick).await;
                (address, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((address, result)) => {
                    if let Err(e) = &result {
                        warn!(peer = %address, error = %e, "peer poll failed");
                    }
                    results.push((address, result));
                }
                Err(e) => warn!(error = %e, "peer poll task aborted"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::error::SyncError;
    use crate::peer::memory::{MemoryNetwork, MemoryPeer};
    use fleetsync_core::{Checksum, ResultSet, Row, ServerRow};
    use fleetsync_registry::LocalChecksums;

    fn addr(host: &str) -> PeerAddress {
        PeerAddress::new(host, 6032)
    }

    fn global(checksum: Checksum) -> ResultSet {
        ResultSet::new(["global_checksum"]).with_row(Row::from_values([checksum.to_hex()]))
    }

    fn checksums(users: Checksum) -> ResultSet {
        ResultSet::new(["name", "version", "epoch", "checksum"]).with_row(Row::from_values([
            "mysql_users".to_string(),
            "2".to_string(),
            "1700000000".to_string(),
            users.to_hex(),
        ]))
    }

    fn metrics(uptime: u64) -> ResultSet {
        let mut set = ResultSet::new(["Variable_Name", "Variable_Value"]);
        for (name, value) in [
            ("ProxySQL_Uptime", uptime),
            ("Questions", 100),
            ("Client_Connections_created", 7),
            ("Client_Connections_connected", 3),
            ("Servers_table_version", 2),
        ] {
            set.push(Row::from_values([name.to_string(), value.to_string()]));
        }
        set
    }

    fn script(peer: &MemoryPeer, global_value: Checksum, users: Checksum) {
        peer.respond(queries::GLOBAL_CHECKSUM, global(global_value));
        peer.respond(queries::CHECKSUMS, checksums(users));
        peer.respond(queries::METRICS, metrics(60));
    }

    fn setup(hosts: &[&str]) -> (Arc<NodeRegistry>, Arc<MemoryNetwork>, Arc<PeerMonitor<MemoryNetwork>>) {
        let registry = Arc::new(NodeRegistry::new(Arc::new(LocalChecksums::new())));
        let rows: Vec<ServerRow> = hosts
            .iter()
            .map(|h| ServerRow::new(*h, 6032, 1, ""))
            .collect();
        registry.load_servers_list(&rows);
        let network = MemoryNetwork::new();
        let config = Arc::new(ConfigCell::new(ClusterConfig {
            check_status_frequency: 2,
            ..ClusterConfig::default()
        }));
        let monitor = Arc::new(PeerMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&network),
            config,
        ));
        (registry, network, monitor)
    }

    fn count(peer: &MemoryPeer, sql: &str) -> usize {
        peer.queries().iter().filter(|q| q.as_str() == sql).count()
    }

    #[tokio::test]
    async fn test_first_poll_fetches_everything() {
        let (registry, network, monitor) = setup(&["10.0.0.2"]);
        let peer = network.add_peer(addr("10.0.0.2"));
        script(&peer, Checksum(1), Checksum(0xAB));

        let report = monitor.poll_peer(&addr("10.0.0.2"), 0).await.unwrap();
        assert!(report.checksums_fetched);
        assert_eq!(report.changed_domains, vec![Domain::MysqlUsers]);
        assert!(report.response_time_us.is_some());

        let snapshot = registry.get(&addr("10.0.0.2")).unwrap();
        assert_eq!(snapshot.metrics.uptime, 60);
        assert_eq!(snapshot.checksums.get(Domain::MysqlUsers).checksum(), Checksum(0xAB));
    }

    #[tokio::test]
    async fn test_checksums_only_on_global_change() {
        let (_registry, network, monitor) = setup(&["10.0.0.2"]);
        let peer = network.add_peer(addr("10.0.0.2"));
        script(&peer, Checksum(1), Checksum(0xAB));

        monitor.poll_peer(&addr("10.0.0.2"), 1).await.unwrap();
        let report = monitor.poll_peer(&addr("10.0.0.2"), 2).await.unwrap();
        assert!(!report.checksums_fetched);
        assert_eq!(count(&peer, queries::CHECKSUMS), 1);

        peer.respond(queries::GLOBAL_CHECKSUM, global(Checksum(2)));
        let report = monitor.poll_peer(&addr("10.0.0.2"), 3).await.unwrap();
        assert!(report.global_changed);
        assert!(report.checksums_fetched);
        assert_eq!(count(&peer, queries::CHECKSUMS), 2);
    }

    #[tokio::test]
    async fn test_failed_checksum_fetch_is_retried() {
        let (registry, network, monitor) = setup(&["10.0.0.2"]);
        let peer = network.add_peer(addr("10.0.0.2"));
        script(&peer, Checksum(1), Checksum(0xAB));
        monitor.poll_peer(&addr("10.0.0.2"), 1).await.unwrap();

        peer.respond(queries::GLOBAL_CHECKSUM, global(Checksum(2)));
        peer.fail(queries::CHECKSUMS);
        assert!(monitor.poll_peer(&addr("10.0.0.2"), 2).await.is_err());

        peer.respond(queries::CHECKSUMS, checksums(Checksum(0xCD)));
        let report = monitor.poll_peer(&addr("10.0.0.2"), 3).await.unwrap();
        assert!(!report.global_changed);
        assert!(report.checksums_fetched);
        assert_eq!(report.changed_domains, vec![Domain::MysqlUsers]);

        let users = *registry
            .get(&addr("10.0.0.2"))
            .unwrap()
            .checksums
            .get(Domain::MysqlUsers);
        assert_eq!(users.checksum(), Checksum(0xCD));
        assert_eq!(users.diff_check, 1);

        let report = monitor.poll_peer(&addr("10.0.0.2"), 5).await.unwrap();
        assert!(!report.checksums_fetched);
    }

    #[tokio::test]
    async fn test_metrics_follow_status_frequency() {
        let (_registry, network, monitor) = setup(&["10.0.0.2"]);
        let peer = network.add_peer(addr("10.0.0.2"));
        script(&peer, Checksum(1), Checksum(0xAB));

        for tick in 0..4 {
            monitor.poll_peer(&addr("10.0.0.2"), tick).await.unwrap();
        }
        assert_eq!(count(&peer, queries::METRICS), 2);
    }

    #[tokio::test]
    async fn test_unchanged_global_advances_hysteresis() {
        let (registry, network, monitor) = setup(&["10.0.0.2"]);
        let peer = network.add_peer(addr("10.0.0.2"));
        script(&peer, Checksum(1), Checksum(0xAB));

        for tick in 1..4 {
            monitor.poll_peer(&addr("10.0.0.2"), tick).await.unwrap();
        }
        let snapshot = registry.get(&addr("10.0.0.2")).unwrap();
        assert_eq!(snapshot.checksums.get(Domain::MysqlUsers).diff_check, 3);
        assert!(registry.get_peer_to_sync_mysql_users().is_some());
    }

    #[tokio::test]
    async fn test_poll_all_isolates_failures() {
        let (registry, network, monitor) = setup(&["10.0.0.2", "10.0.0.3"]);
        let peer = network.add_peer(addr("10.0.0.2"));
        script(&peer, Checksum(1), Checksum(0xAB));

        let results = monitor.poll_all(0).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, addr("10.0.0.2"));
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(SyncError::Connect { .. })));
        assert_eq!(
            registry
                .get(&addr("10.0.0.2"))
                .unwrap()
                .checksums
                .get(Domain::MysqlUsers)
                .checksum(),
            Checksum(0xAB)
        );
    }

    #[tokio::test]
    async fn test_malformed_metrics_keep_previous_snapshot() {
        let (registry, network, monitor) = setup(&["10.0.0.2"]);
        let peer = network.add_peer(addr("10.0.0.2"));
        script(&peer, Checksum(1), Checksum(0xAB));
        monitor.poll_peer(&addr("10.0.0.2"), 0).await.unwrap();

        peer.respond(
            queries::METRICS,
            ResultSet::new(["Variable_Name", "Variable_Value"])
                .with_row(Row::from_values(["ProxySQL_Uptime", "soon"])),
        );
        let err = monitor.poll_peer(&addr("10.0.0.2"), 2).await.unwrap_err();
        assert!(matches!(err, SyncError::Registry(_)));
        assert_eq!(registry.get(&addr("10.0.0.2")).unwrap().metrics.uptime, 60);
    }
}
