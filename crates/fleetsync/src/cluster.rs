//! The Cluster: one instance's view of the fleet.
//!
//! Wires the registry, the peer monitor and the pull coordinator into a
//! periodic cycle: poll every peer, then try to pull every domain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use fleetsync_core::{now_millis, ChecksumValue, Domain, PeerAddress, ResultSet};
use fleetsync_registry::{LocalChecksums, NodeRegistry, ReconcileReport};
use fleetsync_store::{ConfigStore, DomainPayload};
use fleetsync_sync::{
    ClusterConfig, ClusterCoordinator, MetricsRecorder, PeerConnector, PeerMonitor, PollReport,
    PullOutcome,
};

use crate::error::Result;

/// Outcome of one polling-and-pull cycle.
#[derive(Debug)]
pub struct TickReport {
    pub tick: u64,
    pub polls: Vec<(PeerAddress, fleetsync_sync::Result<PollReport>)>,
    pub pulls: Vec<(Domain, fleetsync_sync::Result<PullOutcome>)>,
}

impl TickReport {
    /// Domains applied during this cycle.
    pub fn applied(&self) -> Vec<Domain> {
        self.pulls
            .iter()
            .filter(|(_, r)| matches!(r, Ok(PullOutcome::Applied { .. })))
            .map(|(d, _)| *d)
            .collect()
    }

    /// Number of peers that could not be polled.
    pub fn failed_polls(&self) -> usize {
        self.polls.iter().filter(|(_, r)| r.is_err()).count()
    }
}

/// One fleet member.
pub struct Cluster<C: PeerConnector + 'static, S: ConfigStore> {
    registry: Arc<NodeRegistry>,
    coordinator: ClusterCoordinator<C, S>,
    monitor: Arc<PeerMonitor<C>>,
    ticks: AtomicU64,
}

impl<C: PeerConnector + 'static, S: ConfigStore> Cluster<C, S> {
    /// Create a cluster member with empty local configuration.
    pub fn new(connector: C, store: S, config: ClusterConfig) -> Result<Self> {
        let registry = Arc::new(NodeRegistry::new(Arc::new(LocalChecksums::new())));
        let connector = Arc::new(connector);
        let coordinator = ClusterCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&connector),
            Arc::new(store),
            config,
        )?;
        let monitor = Arc::new(PeerMonitor::new(
            Arc::clone(&registry),
            connector,
            Arc::clone(coordinator.config_cell()),
        ));
        Ok(Self {
            registry,
            coordinator,
            monitor,
            ticks: AtomicU64::new(0),
        })
    }

    /// Deliver pull counters to `recorder`.
    pub fn with_recorder(mut self, recorder: Arc<dyn MetricsRecorder>) -> Self {
        self.coordinator = self.coordinator.with_recorder(recorder);
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn local(&self) -> &Arc<LocalChecksums> {
        self.registry.local()
    }

    pub fn coordinator(&self) -> &ClusterCoordinator<C, S> {
        &self.coordinator
    }

    pub fn monitor(&self) -> &Arc<PeerMonitor<C>> {
        &self.monitor
    }

    pub fn store(&self) -> &Arc<S> {
        self.coordinator.store()
    }

    pub fn connector(&self) -> &Arc<C> {
        self.coordinator.connector()
    }

    pub fn update_config(&self, config: ClusterConfig) -> Result<()> {
        self.coordinator.update_config(config)?;
        Ok(())
    }

    /// Replace the peer list from a `proxysql_servers`-shaped result set.
    pub fn load_servers(&self, set: &ResultSet) -> ReconcileReport {
        self.registry.load_servers_result(set)
    }

    /// Load a domain edited locally into the runtime.
    ///
    /// Serialized against pulls of the same domain. The new checksum is
    /// advertised to peers from the next poll on, with an epoch newer than
    /// any earlier local load.
    pub async fn load_local(&self, payload: DomainPayload) -> Result<ChecksumValue> {
        self.load(payload, false).await
    }

    /// Load the configuration read at startup.
    ///
    /// It is advertised as version 1, which peers never pull from: a fresh
    /// instance waits to be brought up to date instead of overwriting the
    /// fleet with its config file.
    pub async fn load_boot(&self, payload: DomainPayload) -> Result<ChecksumValue> {
        self.load(payload, true).await
    }

    async fn load(&self, payload: DomainPayload, boot: bool) -> Result<ChecksumValue> {
        let domain = payload.domain;
        let _guard = self.coordinator.domain_lock(domain).await;

        let checksum = self.store().apply_runtime(&payload).await?;
        let epoch = now_millis() / 1000;
        let value = if boot {
            self.local().record_boot(domain, checksum, epoch)
        } else {
            self.local().record_load(domain, checksum, epoch)
        };
        self.registry.resync_local(domain);

        if domain == Domain::ProxysqlServers {
            if let Some(set) = payload.table("proxysql_servers") {
                self.registry.load_servers_result(set);
            }
        }

        info!(
            domain = %domain,
            checksum = %checksum,
            version = value.version,
            epoch = value.epoch,
            boot,
            "loaded local configuration"
        );
        Ok(value)
    }

    /// Run one cycle: poll every peer, then pull every domain.
    pub async fn tick(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed);
        let polls = self.monitor.poll_all(tick).await;
        let pulls = self.coordinator.sync_all().await;
        let report = TickReport { tick, polls, pulls };
        debug!(
            tick,
            peers = report.polls.len(),
            failed = report.failed_polls(),
            applied = report.applied().len(),
            "cycle complete"
        );
        report
    }

    /// Drive [`Cluster::tick`] every `check_interval_ms` until `shutdown`
    /// becomes `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut period = self.coordinator.config().check_interval();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        info!(interval_ms, "cluster sync started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                    let next = self.coordinator.config().check_interval();
                    if next != period {
                        period = next;
                        interval = tokio::time::interval(period);
                        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("cluster sync stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_core::Row;
    use fleetsync_store::MemoryConfigStore;
    use fleetsync_sync::MemoryNetwork;

    fn cluster() -> Cluster<MemoryNetwork, MemoryConfigStore> {
        let config = ClusterConfig {
            admin_interfaces: "10.0.0.1:6032".into(),
            ..ClusterConfig::default()
        };
        Cluster::new(MemoryNetwork::default(), MemoryConfigStore::new(), config).unwrap()
    }

    #[tokio::test]
    async fn test_load_local_advertises_new_checksum() {
        let cluster = cluster();
        let payload = DomainPayload::new(Domain::MysqlQueryRules).with_table(
            "mysql_query_rules",
            ResultSet::new(["rule_id", "match_pattern"])
                .with_row(Row::from_values(["1", "^SELECT"])),
        );
        let expected = payload.checksum();

        let value = cluster.load_local(payload).await.unwrap();
        assert_eq!(value.checksum, expected);
        assert_eq!(value.version, 2);
        assert_eq!(cluster.local().checksum(Domain::MysqlQueryRules), expected);
        assert!(cluster
            .store()
            .runtime(Domain::MysqlQueryRules)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_boot_load_then_edit() {
        let cluster = cluster();
        let rules = |pattern: &str| {
            DomainPayload::new(Domain::MysqlQueryRules).with_table(
                "mysql_query_rules",
                ResultSet::new(["rule_id", "match_pattern"])
                    .with_row(Row::from_values(["1", pattern])),
            )
        };

        let boot = cluster.load_boot(rules("^SELECT")).await.unwrap();
        assert_eq!(boot.version, 1);
        assert!(boot.is_boot_load());

        let edit = cluster.load_local(rules("^UPDATE")).await.unwrap();
        assert_eq!(edit.version, 2);
        assert!(edit.epoch > boot.epoch);

        let again = cluster.load_local(rules("^DELETE")).await.unwrap();
        assert_eq!(again.version, 3);
        assert!(again.epoch > edit.epoch);
    }

    #[tokio::test]
    async fn test_load_local_membership_reconciles() {
        let cluster = cluster();
        let servers = ResultSet::new(["hostname", "port", "weight", "comment"])
            .with_row(Row::from_values(["10.0.0.1", "6032", "1", ""]))
            .with_row(Row::from_values(["10.0.0.2", "6032", "1", ""]));
        cluster
            .load_local(DomainPayload::new(Domain::ProxysqlServers).with_table("proxysql_servers", servers))
            .await
            .unwrap();
        assert_eq!(cluster.registry().len(), 2);
    }

    #[tokio::test]
    async fn test_tick_counts_unreachable_peers() {
        let cluster = cluster();
        cluster.load_servers(
            &ResultSet::new(["hostname", "port", "weight", "comment"])
                .with_row(Row::from_values(["10.0.0.9", "6032", "1", ""])),
        );
        let first = cluster.tick().await;
        let second = cluster.tick().await;
        assert_eq!(first.tick, 0);
        assert_eq!(second.tick, 1);
        assert_eq!(first.failed_polls(), 1);
        assert!(first.applied().is_empty());
        assert_eq!(first.pulls.len(), Domain::COUNT);
    }
}
