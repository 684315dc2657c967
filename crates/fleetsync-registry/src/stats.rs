//! Admin-facing views of the registry.
//!
//! Each method renders one table for the administrative query interface.
//! Rows are ordered by peer address so output is stable between calls.

use fleetsync_core::{Domain, NodeEntry, ResultSet, Row};

use crate::registry::NodeRegistry;

impl NodeRegistry {
    /// `proxysql_servers`: the membership list as currently loaded.
    pub fn dump_table_proxysql_servers(&self) -> ResultSet {
        let mut set = ResultSet::new(["hostname", "port", "weight", "comment"]);
        for entry in self.sorted_entries() {
            set.push(Row::from_values([
                entry.address().hostname.clone(),
                entry.address().port.to_string(),
                entry.weight.to_string(),
                entry.comment.clone(),
            ]));
        }
        set
    }

    /// `stats_proxysql_servers_checksums`: one row per peer and domain.
    pub fn stats_proxysql_servers_checksums(&self) -> ResultSet {
        let mut set = ResultSet::new([
            "hostname",
            "port",
            "name",
            "version",
            "epoch",
            "checksum",
            "changed_at",
            "updated_at",
            "diff_check",
        ]);
        for entry in self.sorted_entries() {
            for domain in Domain::ALL {
                let record = entry.checksum(domain);
                set.push(Row::from_values([
                    entry.address().hostname.clone(),
                    entry.address().port.to_string(),
                    domain.as_str().to_string(),
                    record.value.version.to_string(),
                    record.value.epoch.to_string(),
                    record.checksum().to_hex(),
                    record.last_changed.to_string(),
                    record.last_updated.to_string(),
                    record.diff_check.to_string(),
                ]));
            }
        }
        set
    }

    /// `stats_proxysql_servers_metrics`: the latest snapshot per peer.
    ///
    /// `now_us` is used to render `last_check_ms`.
    pub fn stats_proxysql_servers_metrics(&self, now_us: u64) -> ResultSet {
        let mut set = ResultSet::new([
            "hostname",
            "port",
            "weight",
            "comment",
            "response_time_ms",
            "Uptime_s",
            "last_check_ms",
            "Queries",
            "Client_Connections_connected",
            "Client_Connections_created",
        ]);
        for entry in self.sorted_entries() {
            let m = entry.metrics_curr();
            set.push(Row::from_values([
                entry.address().hostname.clone(),
                entry.address().port.to_string(),
                entry.weight.to_string(),
                entry.comment.clone(),
                (m.response_time_us / 1000).to_string(),
                m.uptime.to_string(),
                (now_us.saturating_sub(m.read_time_us) / 1000).to_string(),
                m.questions.to_string(),
                m.client_connections_connected.to_string(),
                m.client_connections_created.to_string(),
            ]));
        }
        set
    }

    fn sorted_entries(&self) -> Vec<NodeEntry> {
        let mut entries: Vec<NodeEntry> = self.with_nodes(|nodes| nodes.values().cloned().collect());
        entries.sort_by(|a, b| a.address().cmp(b.address()));
        entries
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fleetsync_core::{Checksum, PeerAddress, ServerRow};

    use crate::local::LocalChecksums;
    use crate::registry::NodeRegistry;

    fn registry() -> NodeRegistry {
        let reg = NodeRegistry::new(Arc::new(LocalChecksums::new()));
        reg.load_servers_list(&[
            ServerRow::new("b", 6032, 2, "second"),
            ServerRow::new("a", 6032, 1, "first"),
        ]);
        reg
    }

    #[test]
    fn test_servers_table_sorted() {
        let set = registry().dump_table_proxysql_servers();
        assert_eq!(set.len(), 2);
        let first = set.records().next().unwrap();
        assert_eq!(first.str("hostname", 0).unwrap(), "a");
        assert_eq!(first.str("comment", 3).unwrap(), "first");
    }

    #[test]
    fn test_checksums_table_covers_every_domain() {
        let set = registry().stats_proxysql_servers_checksums();
        assert_eq!(set.len(), 2 * fleetsync_core::Domain::COUNT);
        let first = set.records().next().unwrap();
        assert_eq!(first.str("checksum", 5).unwrap(), Checksum::ZERO.to_hex());
        assert_eq!(first.parse::<u32>("diff_check", 8).unwrap(), 0);
    }

    #[test]
    fn test_metrics_table() {
        let reg = registry();
        let status = fleetsync_core::ResultSet::new(["Variable_Name", "Variable_Value"]);
        let status = fleetsync_core::metrics::variables::ALL
            .iter()
            .fold(status, |s, name| {
                s.with_row(fleetsync_core::Row::from_values([*name, "4"]))
            });
        reg.update_node_metrics(&PeerAddress::new("a", 6032), &status, 3_000, 10_000)
            .unwrap();

        let set = reg.stats_proxysql_servers_metrics(15_000);
        let a = set.records().next().unwrap();
        assert_eq!(a.parse::<u64>("response_time_ms", 4).unwrap(), 3);
        assert_eq!(a.parse::<u64>("last_check_ms", 6).unwrap(), 5);
        assert_eq!(a.parse::<u64>("Queries", 7).unwrap(), 4);
    }
}
