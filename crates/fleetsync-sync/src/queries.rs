//! Admin queries issued against peers.
//!
//! Pull queries read a peer's runtime tables; each domain has an ordered
//! [`DomainPlan`] describing which queries make up its payload.

use fleetsync_core::Domain;

pub const MYSQL_SERVERS: &str = "SELECT hostgroup_id, hostname, port, gtid_port, status, weight, compression, max_connections, max_replication_lag, use_ssl, max_latency_ms, comment FROM runtime_mysql_servers WHERE status<>'OFFLINE_HARD'";

pub const MYSQL_REPLICATION_HOSTGROUPS: &str =
    "SELECT writer_hostgroup, reader_hostgroup, comment FROM runtime_mysql_replication_hostgroups";

pub const MYSQL_GROUP_REPLICATION_HOSTGROUPS: &str = "SELECT writer_hostgroup, backup_writer_hostgroup, reader_hostgroup, offline_hostgroup, active, max_writers, writer_is_also_reader, max_transactions_behind, comment FROM runtime_mysql_group_replication_hostgroups";

pub const MYSQL_GALERA_HOSTGROUPS: &str = "SELECT writer_hostgroup, backup_writer_hostgroup, reader_hostgroup, offline_hostgroup, active, max_writers, writer_is_also_reader, max_transactions_behind, comment FROM runtime_mysql_galera_hostgroups";

pub const MYSQL_AWS_AURORA_HOSTGROUPS: &str = "SELECT writer_hostgroup, reader_hostgroup, active, aurora_port, domain_name, max_lag_ms, check_interval_ms, check_timeout_ms, writer_is_also_reader, new_reader_weight, add_lag_ms, min_lag_ms, lag_num_checks, comment FROM runtime_mysql_aws_aurora_hostgroups";

/// The peer's own view of its mysql_servers checksum, read after the pull.
pub const MYSQL_SERVERS_RUNTIME_CHECK: &str =
    "SELECT checksum FROM runtime_checksums_values WHERE name='mysql_servers' LIMIT 1";

pub const MYSQL_QUERY_RULES: &str = "SELECT rule_id, username, schemaname, flagIN, client_addr, proxy_addr, proxy_port, digest, match_digest, match_pattern, negate_match_pattern, re_modifiers, flagOUT, replace_pattern, destination_hostgroup, cache_ttl, cache_empty_result, cache_timeout, reconnect, timeout, retries, delay, next_query_flagIN, mirror_flagOUT, mirror_hostgroup, error_msg, OK_msg, sticky_conn, multiplex, gtid_from_hostgroup, log, apply, comment FROM runtime_mysql_query_rules ORDER BY rule_id";

pub const MYSQL_QUERY_RULES_FAST_ROUTING: &str = "SELECT username, schemaname, flagIN, destination_hostgroup, comment FROM runtime_mysql_query_rules_fast_routing ORDER BY username, schemaname, flagIN";

pub const MYSQL_USERS: &str = "SELECT username, password, use_ssl, default_hostgroup, default_schema, schema_locked, transaction_persistent, fast_forward, backend, frontend, max_connections, attributes, comment FROM runtime_mysql_users";

pub const MYSQL_LDAP_MAPPING: &str = "SELECT priority, frontend_entity, backend_entity, comment FROM runtime_mysql_ldap_mapping ORDER BY priority";

pub const MYSQL_VARIABLES: &str = "SELECT variable_name, variable_value FROM runtime_global_variables WHERE variable_name LIKE 'mysql-%' AND variable_name NOT IN ('mysql-threads') ORDER BY variable_name";

pub const ADMIN_VARIABLES: &str = "SELECT variable_name, variable_value FROM runtime_global_variables WHERE variable_name LIKE 'admin-%' AND variable_name NOT IN ('admin-cluster_username', 'admin-cluster_password', 'admin-mysql_ifaces', 'admin-version') ORDER BY variable_name";

pub const LDAP_VARIABLES: &str = "SELECT variable_name, variable_value FROM runtime_global_variables WHERE variable_name LIKE 'ldap-%' ORDER BY variable_name";

pub const PROXYSQL_SERVERS: &str =
    "SELECT hostname, port, weight, comment FROM runtime_proxysql_servers ORDER BY hostname, port";

/// Status polling.
pub const GLOBAL_CHECKSUM: &str = "SELECT GLOBAL_CHECKSUM() AS global_checksum";

pub const CHECKSUMS: &str =
    "SELECT name, version, epoch, checksum FROM runtime_checksums_values ORDER BY name";

pub const METRICS: &str = "SELECT Variable_Name, Variable_Value FROM stats_mysql_global WHERE Variable_Name IN ('Client_Connections_connected', 'Client_Connections_created', 'ProxySQL_Uptime', 'Questions', 'Servers_table_version')";

/// Identifies a pull query for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKind {
    MysqlQueryRules,
    MysqlQueryRulesFastRouting,
    MysqlServers,
    MysqlServersReplicationHostgroups,
    MysqlServersGroupReplicationHostgroups,
    MysqlServersGaleraHostgroups,
    MysqlServersAwsAuroraHostgroups,
    MysqlServersRuntimeChecks,
    MysqlUsers,
    MysqlLdapMapping,
    ProxysqlServers,
    MysqlVariables,
    AdminVariables,
    LdapVariables,
}

impl QueryKind {
    /// Stem used in counter names: `pulled_<stem>_success`.
    pub const fn stem(&self) -> &'static str {
        match self {
            QueryKind::MysqlQueryRules => "mysql_query_rules",
            QueryKind::MysqlQueryRulesFastRouting => "mysql_query_rules_fast_routing",
            QueryKind::MysqlServers => "mysql_servers",
            QueryKind::MysqlServersReplicationHostgroups => "mysql_servers_replication_hostgroups",
            QueryKind::MysqlServersGroupReplicationHostgroups => {
                "mysql_servers_group_replication_hostgroups"
            }
            QueryKind::MysqlServersGaleraHostgroups => "mysql_servers_galera_hostgroups",
            QueryKind::MysqlServersAwsAuroraHostgroups => "mysql_servers_aws_aurora_hostgroups",
            QueryKind::MysqlServersRuntimeChecks => "mysql_servers_runtime_checks",
            QueryKind::MysqlUsers => "mysql_users",
            QueryKind::MysqlLdapMapping => "mysql_ldap_mapping",
            QueryKind::ProxysqlServers => "proxysql_servers",
            QueryKind::MysqlVariables => "mysql_variables",
            QueryKind::AdminVariables => "admin_variables",
            QueryKind::LdapVariables => "ldap_variables",
        }
    }

    /// Domain this query feeds.
    pub const fn domain(&self) -> Domain {
        match self {
            QueryKind::MysqlQueryRules | QueryKind::MysqlQueryRulesFastRouting => {
                Domain::MysqlQueryRules
            }
            QueryKind::MysqlServers
            | QueryKind::MysqlServersReplicationHostgroups
            | QueryKind::MysqlServersGroupReplicationHostgroups
            | QueryKind::MysqlServersGaleraHostgroups
            | QueryKind::MysqlServersAwsAuroraHostgroups
            | QueryKind::MysqlServersRuntimeChecks => Domain::MysqlServers,
            QueryKind::MysqlUsers | QueryKind::MysqlLdapMapping => Domain::MysqlUsers,
            QueryKind::ProxysqlServers => Domain::ProxysqlServers,
            QueryKind::MysqlVariables => Domain::MysqlVariables,
            QueryKind::AdminVariables => Domain::AdminVariables,
            QueryKind::LdapVariables => Domain::LdapVariables,
        }
    }
}

/// One query, the counters it feeds, and the table its rows land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchQuery {
    pub query: &'static str,
    pub kind: QueryKind,
    pub table: &'static str,
}

impl FetchQuery {
    pub const fn new(query: &'static str, kind: QueryKind, table: &'static str) -> Self {
        Self { query, kind, table }
    }
}

/// Ordered fetches making up one domain's pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPlan {
    pub domain: Domain,
    /// Payload queries; the first one is the domain's primary query.
    pub fetches: Vec<FetchQuery>,
    /// Read after the payload and used only for re-validation.
    pub runtime_check: Option<FetchQuery>,
}

impl DomainPlan {
    pub fn for_domain(domain: Domain) -> Self {
        use QueryKind as K;

        let (fetches, runtime_check) = match domain {
            Domain::MysqlQueryRules => (
                vec![
                    FetchQuery::new(MYSQL_QUERY_RULES, K::MysqlQueryRules, "mysql_query_rules"),
                    FetchQuery::new(
                        MYSQL_QUERY_RULES_FAST_ROUTING,
                        K::MysqlQueryRulesFastRouting,
                        "mysql_query_rules_fast_routing",
                    ),
                ],
                None,
            ),
            Domain::MysqlServers => (
                vec![
                    FetchQuery::new(MYSQL_SERVERS, K::MysqlServers, "mysql_servers"),
                    FetchQuery::new(
                        MYSQL_REPLICATION_HOSTGROUPS,
                        K::MysqlServersReplicationHostgroups,
                        "mysql_replication_hostgroups",
                    ),
                    FetchQuery::new(
                        MYSQL_GROUP_REPLICATION_HOSTGROUPS,
                        K::MysqlServersGroupReplicationHostgroups,
                        "mysql_group_replication_hostgroups",
                    ),
                    FetchQuery::new(
                        MYSQL_GALERA_HOSTGROUPS,
                        K::MysqlServersGaleraHostgroups,
                        "mysql_galera_hostgroups",
                    ),
                    FetchQuery::new(
                        MYSQL_AWS_AURORA_HOSTGROUPS,
                        K::MysqlServersAwsAuroraHostgroups,
                        "mysql_aws_aurora_hostgroups",
                    ),
                ],
                Some(FetchQuery::new(
                    MYSQL_SERVERS_RUNTIME_CHECK,
                    K::MysqlServersRuntimeChecks,
                    "runtime_checksums_values",
                )),
            ),
            Domain::MysqlUsers => (
                vec![
                    FetchQuery::new(MYSQL_USERS, K::MysqlUsers, "mysql_users"),
                    FetchQuery::new(MYSQL_LDAP_MAPPING, K::MysqlLdapMapping, "mysql_ldap_mapping"),
                ],
                None,
            ),
            Domain::ProxysqlServers => (
                vec![FetchQuery::new(PROXYSQL_SERVERS, K::ProxysqlServers, "proxysql_servers")],
                None,
            ),
            Domain::MysqlVariables => (
                vec![FetchQuery::new(MYSQL_VARIABLES, K::MysqlVariables, "global_variables")],
                None,
            ),
            Domain::AdminVariables => (
                vec![FetchQuery::new(ADMIN_VARIABLES, K::AdminVariables, "global_variables")],
                None,
            ),
            Domain::LdapVariables => (
                vec![FetchQuery::new(LDAP_VARIABLES, K::LdapVariables, "global_variables")],
                None,
            ),
        };

        Self {
            domain,
            fetches,
            runtime_check,
        }
    }

    /// The query whose failure counter absorbs connection failures.
    pub fn primary(&self) -> QueryKind {
        match self.domain {
            Domain::MysqlQueryRules => QueryKind::MysqlQueryRules,
            Domain::MysqlServers => QueryKind::MysqlServers,
            Domain::MysqlUsers => QueryKind::MysqlUsers,
            Domain::ProxysqlServers => QueryKind::ProxysqlServers,
            Domain::MysqlVariables => QueryKind::MysqlVariables,
            Domain::AdminVariables => QueryKind::AdminVariables,
            Domain::LdapVariables => QueryKind::LdapVariables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_domain_has_a_plan() {
        for domain in Domain::ALL {
            let plan = DomainPlan::for_domain(domain);
            assert!(!plan.fetches.is_empty());
            assert_eq!(plan.fetches[0].kind, plan.primary());
            assert_eq!(plan.primary().domain(), domain);
            for f in plan.fetches.iter().chain(plan.runtime_check.iter()) {
                assert_eq!(f.kind.domain(), domain, "{:?}", f.kind);
            }
        }
    }

    #[test]
    fn test_only_servers_has_runtime_check() {
        for domain in Domain::ALL {
            let plan = DomainPlan::for_domain(domain);
            assert_eq!(plan.runtime_check.is_some(), domain == Domain::MysqlServers);
        }
    }

    #[test]
    fn test_server_list_excludes_offline_hard() {
        assert!(MYSQL_SERVERS.contains("status<>'OFFLINE_HARD'"));
    }
}
