//! Pull orchestration.
//!
//! A pull moves one domain from the selected peer into the local store:
//!
//! 1. Ask the registry for a sync source (hysteresis and epoch order apply).
//! 2. Take the domain lock and re-check that the source is still newer.
//! 3. Fetch every query in the domain's [`DomainPlan`].
//! 4. Re-validate that the source did not change while we were reading.
//! 5. Apply the payload as a whole, adopt the source's checksum and epoch
//!    as our own, then optionally save it to disk.
//!
//! No registry lock is held across a network call.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use fleetsync_core::rows::parse_server_rows;
use fleetsync_core::{Checksum, Domain, PerDomain, PeerAddress, ResultSet, ServerRow};
use fleetsync_registry::{NodeRegistry, SyncCandidate, SyncDecision};
use fleetsync_store::{ConfigStore, DomainPayload};

use crate::config::{ClusterConfig, ConfigCell};
use crate::error::{Result, SyncError};
use crate::peer::{bounded, PeerConnection, PeerConnector};
use crate::queries::{DomainPlan, FetchQuery};
use crate::telemetry::{CounterKey, MetricsRecorder, NoopRecorder};

/// How a pull ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// No peer advertises a different checksum, or we already caught up.
    InSync,
    /// Syncing of this domain is turned off.
    Disabled,
    /// Peers differ but none has passed the hysteresis threshold.
    Delayed { pending: usize },
    /// Peers passed the threshold but still run their boot configuration.
    VersionOne { peers: usize },
    /// Peers passed the threshold with our epoch and another checksum.
    ShareEpoch { peers: usize },
    /// Our copy was loaded after every differing peer's.
    LocalNewer { peers: usize },
    /// The source changed while the pull was in flight; nothing applied.
    Conflict {
        peer: PeerAddress,
        expected: Checksum,
        found: Option<Checksum>,
    },
    /// The payload was applied.
    Applied {
        peer: PeerAddress,
        checksum: Checksum,
        rows: usize,
    },
}

/// Which global-variables domain to pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableType {
    Mysql,
    Admin,
    Ldap,
}

impl VariableType {
    pub const fn domain(&self) -> Domain {
        match self {
            VariableType::Mysql => Domain::MysqlVariables,
            VariableType::Admin => Domain::AdminVariables,
            VariableType::Ldap => Domain::LdapVariables,
        }
    }
}

/// Decides when to pull each domain, and from whom, and carries it out.
pub struct ClusterCoordinator<C: PeerConnector, S: ConfigStore> {
    registry: Arc<NodeRegistry>,
    connector: Arc<C>,
    store: Arc<S>,
    recorder: Arc<dyn MetricsRecorder>,
    config: Arc<ConfigCell>,
    /// At most one pull (or local reload) per domain at a time.
    locks: PerDomain<Mutex<()>>,
}

impl<C: PeerConnector, S: ConfigStore> ClusterCoordinator<C, S> {
    /// Create a coordinator and push `config` into the registry.
    pub fn new(
        registry: Arc<NodeRegistry>,
        connector: Arc<C>,
        store: Arc<S>,
        config: ClusterConfig,
    ) -> Result<Self> {
        let coordinator = Self {
            registry,
            connector,
            store,
            recorder: Arc::new(NoopRecorder),
            config: Arc::new(ConfigCell::default()),
            locks: PerDomain::from_fn(|_| Mutex::new(())),
        };
        coordinator.update_config(config)?;
        Ok(coordinator)
    }

    /// Deliver counters to `recorder`.
    pub fn with_recorder(mut self, recorder: Arc<dyn MetricsRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn connector(&self) -> &Arc<C> {
        &self.connector
    }

    pub fn recorder(&self) -> &Arc<dyn MetricsRecorder> {
        &self.recorder
    }

    /// The shared configuration cell.
    pub fn config_cell(&self) -> &Arc<ConfigCell> {
        &self.config
    }

    pub fn config(&self) -> Arc<ClusterConfig> {
        self.config.load()
    }

    /// Validate and install a new configuration.
    ///
    /// Thresholds and admin interfaces take effect in the registry
    /// immediately; pulls already in flight keep their snapshot.
    pub fn update_config(&self, config: ClusterConfig) -> Result<()> {
        config.validate()?;
        let admin = config.admin_addresses()?;
        for domain in Domain::ALL {
            self.registry
                .set_diffs_before_sync(domain, config.domain(domain).diffs_before_sync);
        }
        self.registry.set_admin_interfaces(&admin);
        self.config.store(config);
        Ok(())
    }

    /// Serialize against pulls of `domain`.
    ///
    /// A local reload of the domain should hold this guard for its duration.
    pub async fn domain_lock(&self, domain: Domain) -> MutexGuard<'_, ()> {
        self.locks.get(domain).lock().await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Per-domain entry points
    // ─────────────────────────────────────────────────────────────────────

    pub async fn pull_mysql_query_rules_from_peer(&self) -> Result<PullOutcome> {
        self.pull(Domain::MysqlQueryRules, None).await
    }

    pub async fn pull_mysql_servers_from_peer(&self) -> Result<PullOutcome> {
        self.pull(Domain::MysqlServers, None).await
    }

    pub async fn pull_mysql_users_from_peer(&self) -> Result<PullOutcome> {
        self.pull(Domain::MysqlUsers, None).await
    }

    pub async fn pull_global_variables_from_peer(
        &self,
        variables: VariableType,
    ) -> Result<PullOutcome> {
        self.pull(variables.domain(), None).await
    }

    /// Pull the fleet membership list.
    ///
    /// The pulled rows must hash to `expected` (by default the checksum the
    /// source advertised). On success the registry is reconciled against
    /// the new list.
    pub async fn pull_proxysql_servers_from_peer(
        &self,
        expected: Option<Checksum>,
    ) -> Result<PullOutcome> {
        self.pull(Domain::ProxysqlServers, expected).await
    }

    pub async fn pull_domain(&self, domain: Domain) -> Result<PullOutcome> {
        self.pull(domain, None).await
    }

    /// Pull every domain concurrently.
    ///
    /// Results are in `Domain::ALL` order.
    pub async fn sync_all(&self) -> Vec<(Domain, Result<PullOutcome>)> {
        let [a, b, c, d, e, f, g] = Domain::ALL;
        let (ra, rb, rc, rd, re, rf, rg) = tokio::join!(
            self.pull_domain(a),
            self.pull_domain(b),
            self.pull_domain(c),
            self.pull_domain(d),
            self.pull_domain(e),
            self.pull_domain(f),
            self.pull_domain(g),
        );
        vec![(a, ra), (b, rb), (c, rc), (d, rd), (e, re), (f, rf), (g, rg)]
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pull protocol
    // ─────────────────────────────────────────────────────────────────────

    async fn pull(&self, domain: Domain, expected: Option<Checksum>) -> Result<PullOutcome> {
        let candidate = match self.registry.peer_to_sync(domain) {
            SyncDecision::Disabled => return Ok(PullOutcome::Disabled),
            SyncDecision::InSync => return Ok(PullOutcome::InSync),
            SyncDecision::Delayed { pending } => {
                self.recorder.increment(CounterKey::delayed(domain));
                debug!(domain = %domain, pending, "sync delayed");
                return Ok(PullOutcome::Delayed { pending });
            }
            SyncDecision::VersionOne { peers } => {
                self.recorder.increment(CounterKey::version_one(domain));
                info!(domain = %domain, peers, "sync delayed: peers still run their boot configuration");
                return Ok(PullOutcome::VersionOne { peers });
            }
            SyncDecision::ShareEpoch { peers } => {
                self.recorder.increment(CounterKey::share_epoch(domain));
                warn!(
                    domain = %domain,
                    peers,
                    "peers share our epoch with a different checksum, not syncing"
                );
                return Ok(PullOutcome::ShareEpoch { peers });
            }
            SyncDecision::LocalNewer { peers } => {
                debug!(domain = %domain, peers, "local configuration is newer than every peer");
                return Ok(PullOutcome::LocalNewer { peers });
            }
            SyncDecision::Sync(candidate) => candidate,
        };

        let _guard = self.domain_lock(domain).await;

        // Another pull, or a local load, may have landed while we waited.
        let local = self.registry.local().get(domain);
        if local.checksum == candidate.value.checksum {
            return Ok(PullOutcome::InSync);
        }
        if local.epoch >= candidate.value.epoch {
            debug!(domain = %domain, local_epoch = local.epoch, "local load overtook the sync source");
            return Ok(PullOutcome::LocalNewer { peers: 1 });
        }

        let config = self.config.load();
        let plan = DomainPlan::for_domain(domain);
        let peer = candidate.address.clone();
        info!(
            peer = %peer,
            domain = %domain,
            checksum = %candidate.value.checksum,
            version = candidate.value.version,
            diff_check = candidate.diff_check,
            "pulling configuration from peer"
        );

        // Phase 1: connect
        let connect = self.connector.connect(&peer, &config.credentials);
        let mut conn = match bounded(&peer, config.query_timeout(), connect).await {
            Ok(conn) => conn,
            Err(e) => {
                self.recorder
                    .increment(CounterKey::pulled(plan.primary(), false));
                warn!(peer = %peer, domain = %domain, error = %e, "cannot connect to sync source");
                return Err(e);
            }
        };

        // Phase 2: fetch
        let mut payload = DomainPayload::new(domain);
        for fetch in &plan.fetches {
            let set = self.fetch_and_store(&mut conn, fetch, &peer).await?;
            payload.push_table(fetch.table, set);
        }

        // Phase 3: re-validate
        if let Some(found) = self
            .revalidate(&mut conn, &plan, &candidate, &payload, expected)
            .await?
        {
            let expected = expected.unwrap_or(candidate.value.checksum);
            self.recorder.increment(CounterKey::conflict(domain));
            warn!(
                peer = %peer,
                domain = %domain,
                expected = %expected,
                found = ?found,
                "sync source changed during pull, discarding"
            );
            return Ok(PullOutcome::Conflict {
                peer,
                expected,
                found,
            });
        }

        // Phase 4: validate membership
        let servers = if domain == Domain::ProxysqlServers {
            let set = payload.table(plan.fetches[0].table);
            Some(active_servers(&peer, set)?)
        } else {
            None
        };

        // Phase 5: apply, adopt, persist
        let applied = match self.store.apply_runtime(&payload).await {
            Ok(checksum) => checksum,
            Err(e) => {
                error!(peer = %peer, domain = %domain, error = %e, "applying pulled configuration failed");
                return Err(e.into());
            }
        };

        // Runtime now holds the peer's copy; advertise it whatever the
        // disk save does.
        let local = self.registry.local().record_load(
            domain,
            candidate.value.checksum,
            candidate.value.epoch,
        );
        self.registry.resync_local(domain);
        if let Some(servers) = servers {
            self.registry.load_servers_list(&servers);
        }

        if config.domain(domain).save_to_disk {
            if let Err(e) = self.store.save_to_disk(domain).await {
                error!(
                    peer = %peer,
                    domain = %domain,
                    checksum = %local.checksum,
                    error = %e,
                    "applied configuration from peer but saving to disk failed"
                );
                return Err(e.into());
            }
        }

        info!(
            peer = %peer,
            domain = %domain,
            checksum = %local.checksum,
            version = local.version,
            content = %applied,
            rows = payload.row_count(),
            "applied configuration from peer"
        );
        Ok(PullOutcome::Applied {
            peer,
            checksum: local.checksum,
            rows: payload.row_count(),
        })
    }

    /// Run one fetch and count its outcome exactly once.
    pub async fn fetch_and_store(
        &self,
        conn: &mut C::Connection,
        fetch: &FetchQuery,
        peer: &PeerAddress,
    ) -> Result<ResultSet> {
        let limit = self.config.load().query_timeout();
        let result = bounded(peer, limit, conn.query(fetch.query)).await;
        self.recorder
            .increment(CounterKey::pulled(fetch.kind, result.is_ok()));
        match &result {
            Ok(set) => debug!(peer = %peer, table = fetch.table, rows = set.len(), "fetched"),
            Err(e) => warn!(peer = %peer, table = fetch.table, error = %e, "fetch failed"),
        }
        result
    }

    /// Returns the checksum actually found when the source moved.
    async fn revalidate(
        &self,
        conn: &mut C::Connection,
        plan: &DomainPlan,
        candidate: &SyncCandidate,
        payload: &DomainPayload,
        expected: Option<Checksum>,
    ) -> Result<Option<Option<Checksum>>> {
        let advertised = candidate.value.checksum;

        if let Some(check) = &plan.runtime_check {
            let set = self.fetch_and_store(conn, check, &candidate.address).await?;
            let found = runtime_checksum(&candidate.address, &set)?;
            if found != Some(advertised) {
                return Ok(Some(found));
            }
        }

        let current = self
            .registry
            .peer_checksum(candidate.id, plan.domain)
            .map(|v| v.checksum);
        if current != Some(advertised) {
            return Ok(Some(current));
        }

        if plan.domain == Domain::ProxysqlServers {
            let content = payload.checksum();
            if content != expected.unwrap_or(advertised) {
                return Ok(Some(Some(content)));
            }
        }

        Ok(None)
    }
}

/// Parse a pulled membership list, keeping the nodes that are not
/// `OFFLINE_HARD`.
///
/// Any malformed row rejects the whole list, as does a list with no active
/// node: reconciling against it would drop every peer.
fn active_servers(peer: &PeerAddress, set: Option<&ResultSet>) -> Result<Vec<ServerRow>> {
    let mut servers = Vec::new();
    if let Some(set) = set {
        for row in parse_server_rows(set) {
            let row = row.map_err(|source| SyncError::Malformed {
                peer: peer.clone(),
                source,
            })?;
            if !row.is_offline_hard() {
                servers.push(row);
            }
        }
    }
    if servers.is_empty() {
        return Err(SyncError::EmptyMembership(peer.clone()));
    }
    Ok(servers)
}

fn runtime_checksum(peer: &PeerAddress, set: &ResultSet) -> Result<Option<Checksum>> {
    let Some(record) = set.records().next() else {
        return Ok(None);
    };
    record
        .parse::<Checksum>("checksum", 0)
        .map(Some)
        .map_err(|source| SyncError::Malformed {
            peer: peer.clone(),
            source,
        })
}
