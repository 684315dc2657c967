//! Cluster configuration.
//!
//! Every field has a default, so a partial JSON document is valid:
//!
//! ```json
//! { "check_interval_ms": 500, "mysql_users": { "diffs_before_sync": 5 } }
//! ```

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fleetsync_core::{Domain, PeerAddress};

use crate::error::{Result, SyncError};
use crate::peer::Credentials;

/// Per-domain sync settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainSettings {
    /// Consecutive differing polls required before pulling; 0 disables.
    pub diffs_before_sync: u32,
    /// Persist the domain after applying a pull.
    pub save_to_disk: bool,
}

impl Default for DomainSettings {
    fn default() -> Self {
        Self {
            diffs_before_sync: 3,
            save_to_disk: true,
        }
    }
}

/// Configuration for the cluster sync loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Interval between polling cycles.
    pub check_interval_ms: u64,
    /// Metrics are polled every N cycles.
    pub check_status_frequency: u64,
    /// Bound on a single connect or query.
    pub query_timeout_ms: u64,
    pub credentials: Credentials,
    /// This instance's admin listen addresses, `;` or `,` separated.
    pub admin_interfaces: String,

    pub admin_variables: DomainSettings,
    pub mysql_query_rules: DomainSettings,
    pub mysql_servers: DomainSettings,
    pub mysql_users: DomainSettings,
    pub mysql_variables: DomainSettings,
    pub proxysql_servers: DomainSettings,
    pub ldap_variables: DomainSettings,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1000,
            check_status_frequency: 10,
            query_timeout_ms: 5000,
            credentials: Credentials::default(),
            admin_interfaces: "0.0.0.0:6032".to_string(),
            admin_variables: DomainSettings::default(),
            mysql_query_rules: DomainSettings::default(),
            mysql_servers: DomainSettings::default(),
            mysql_users: DomainSettings::default(),
            mysql_variables: DomainSettings::default(),
            proxysql_servers: DomainSettings::default(),
            ldap_variables: DomainSettings::default(),
        }
    }
}

impl ClusterConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval_ms == 0 {
            return Err(SyncError::Config("check_interval_ms must be positive".into()));
        }
        if self.check_status_frequency == 0 {
            return Err(SyncError::Config(
                "check_status_frequency must be positive".into(),
            ));
        }
        if self.query_timeout_ms == 0 {
            return Err(SyncError::Config("query_timeout_ms must be positive".into()));
        }
        self.admin_addresses()?;
        Ok(())
    }

    pub fn domain(&self, domain: Domain) -> DomainSettings {
        match domain {
            Domain::AdminVariables => self.admin_variables,
            Domain::MysqlQueryRules => self.mysql_query_rules,
            Domain::MysqlServers => self.mysql_servers,
            Domain::MysqlUsers => self.mysql_users,
            Domain::MysqlVariables => self.mysql_variables,
            Domain::ProxysqlServers => self.proxysql_servers,
            Domain::LdapVariables => self.ldap_variables,
        }
    }

    pub fn domain_mut(&mut self, domain: Domain) -> &mut DomainSettings {
        match domain {
            Domain::AdminVariables => &mut self.admin_variables,
            Domain::MysqlQueryRules => &mut self.mysql_query_rules,
            Domain::MysqlServers => &mut self.mysql_servers,
            Domain::MysqlUsers => &mut self.mysql_users,
            Domain::MysqlVariables => &mut self.mysql_variables,
            Domain::ProxysqlServers => &mut self.proxysql_servers,
            Domain::LdapVariables => &mut self.ldap_variables,
        }
    }

    /// Parsed `admin_interfaces`.
    pub fn admin_addresses(&self) -> Result<Vec<PeerAddress>> {
        self.admin_interfaces
            .split([';', ','])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<PeerAddress>()
                    .map_err(|e| SyncError::Config(e.to_string()))
            })
            .collect()
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Shared, atomically replaced configuration snapshot.
#[derive(Debug, Default)]
pub struct ConfigCell {
    current: RwLock<Arc<ClusterConfig>>,
}

impl ConfigCell {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn load(&self) -> Arc<ClusterConfig> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn store(&self, config: ClusterConfig) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }
}
