//! Test fixtures and helpers.
//!
//! Result-set builders shaped like the admin tables peers expose, and
//! [`ScriptedPeer`], a peer whose advertised checksums always agree with
//! the rows it serves.

use std::sync::{Arc, Mutex, PoisonError};

use fleetsync_core::{
    now_millis, Checksum, ChecksumValue, Domain, NodeMetrics, PerDomain, PeerAddress, ResultSet,
    Row, ServerRow,
};
use fleetsync_store::DomainPayload;
use fleetsync_sync::{queries, DomainPlan, MemoryNetwork, MemoryPeer};

/// `runtime_checksums_values`-shaped rows.
pub fn checksum_rows<I>(values: I) -> ResultSet
where
    I: IntoIterator<Item = (Domain, ChecksumValue)>,
{
    let mut set = ResultSet::new(["name", "version", "epoch", "checksum"]);
    for (domain, value) in values {
        set.push(Row::from_values([
            domain.as_str().to_string(),
            value.version.to_string(),
            value.epoch.to_string(),
            value.checksum.to_hex(),
        ]));
    }
    set
}

pub fn global_checksum_row(checksum: Checksum) -> ResultSet {
    ResultSet::new(["global_checksum"]).with_row(Row::from_values([checksum.to_hex()]))
}

/// `stats_mysql_global`-shaped rows carrying `metrics`.
pub fn metrics_rows(metrics: &NodeMetrics) -> ResultSet {
    let mut set = ResultSet::new(["Variable_Name", "Variable_Value"]);
    for (name, value) in [
        ("Client_Connections_connected", metrics.client_connections_connected),
        ("Client_Connections_created", metrics.client_connections_created),
        ("ProxySQL_Uptime", metrics.uptime),
        ("Questions", metrics.questions),
        ("Servers_table_version", metrics.servers_table_version),
    ] {
        set.push(Row::from_values([name.to_string(), value.to_string()]));
    }
    set
}

/// `proxysql_servers`-shaped rows.
pub fn server_list(rows: &[ServerRow]) -> ResultSet {
    let mut set = ResultSet::new(["hostname", "port", "weight", "comment"]);
    for row in rows {
        set.push(Row::from_values([
            row.hostname.clone(),
            row.port.to_string(),
            row.weight.to_string(),
            row.comment.clone(),
        ]));
    }
    set
}

/// Peers on port 6032 at the given hosts.
pub fn servers(hosts: &[&str]) -> Vec<ServerRow> {
    hosts
        .iter()
        .map(|h| ServerRow::new(*h, 6032, 1, ""))
        .collect()
}

/// A small payload for `domain`, distinguished by `seed`.
///
/// Tables follow the domain's pull plan, so the payload is exactly what a
/// pull of it would produce.
pub fn sample_payload(domain: Domain, seed: u64) -> DomainPayload {
    let mut payload = DomainPayload::new(domain);
    for fetch in DomainPlan::for_domain(domain).fetches {
        let set = match fetch.table {
            "proxysql_servers" => server_list(&[
                ServerRow::new("10.0.0.1", 6032, 1, format!("seed {seed}")),
                ServerRow::new("10.0.0.2", 6032, 1, ""),
            ]),
            "global_variables" => ResultSet::new(["variable_name", "variable_value"]).with_row(
                Row::from_values([format!("{}-seed", domain_prefix(domain)), seed.to_string()]),
            ),
            table => ResultSet::new(["id", "comment"])
                .with_row(Row::from_values([seed.to_string(), format!("{table} #{seed}")])),
        };
        payload.push_table(fetch.table, set);
    }
    payload
}

fn domain_prefix(domain: Domain) -> &'static str {
    match domain {
        Domain::AdminVariables => "admin",
        Domain::LdapVariables => "ldap",
        _ => "mysql",
    }
}

/// A scripted peer that advertises what it serves.
///
/// Serving a payload updates the table queries, the per-domain checksum
/// rows and the global checksum together. Every domain starts out as a boot
/// load (version 1), and each change advertises a strictly newer epoch.
pub struct ScriptedPeer {
    address: PeerAddress,
    peer: Arc<MemoryPeer>,
    advertised: Mutex<PerDomain<ChecksumValue>>,
}

impl ScriptedPeer {
    /// Register a peer at `address` on `network` with empty configuration.
    pub fn new(network: &MemoryNetwork, address: PeerAddress) -> Self {
        let peer = network.add_peer(address.clone());
        let scripted = Self {
            address,
            peer,
            advertised: Mutex::new(PerDomain::from_fn(|_| ChecksumValue::new(Checksum::ZERO, 1, 0))),
        };
        for domain in Domain::ALL {
            for fetch in DomainPlan::for_domain(domain).fetches {
                scripted.peer.respond(fetch.query, ResultSet::new(["id"]));
            }
        }
        scripted.set_metrics(&NodeMetrics {
            uptime: 60,
            questions: 1000,
            client_connections_created: 10,
            client_connections_connected: 4,
            servers_table_version: 1,
            ..NodeMetrics::default()
        });
        scripted.publish();
        scripted
    }

    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    /// The underlying script handle, for failure injection and hooks.
    pub fn peer(&self) -> &Arc<MemoryPeer> {
        &self.peer
    }

    /// Serve `payload` and advertise its checksum with a bumped version.
    pub fn serve(&self, payload: &DomainPayload) -> ChecksumValue {
        self.serve_at(payload, now_millis() / 1000)
    }

    /// Like [`ScriptedPeer::serve`], advertising `epoch` unless an earlier
    /// change already used it.
    pub fn serve_at(&self, payload: &DomainPayload, epoch: i64) -> ChecksumValue {
        let value = self.bump(payload.domain, payload.checksum(), epoch);
        self.script(payload, value);
        value
    }

    /// Serve `payload` as the configuration the peer booted with.
    pub fn boot(&self, payload: &DomainPayload) -> ChecksumValue {
        let value = ChecksumValue::new(payload.checksum(), 1, now_millis() / 1000);
        *self.advertised().get_mut(payload.domain) = value;
        self.script(payload, value);
        value
    }

    /// Advertise `checksum` for `domain` without changing the served rows.
    pub fn advertise(&self, domain: Domain, checksum: Checksum) -> ChecksumValue {
        let value = self.bump(domain, checksum, now_millis() / 1000);
        self.publish();
        value
    }

    pub fn advertised_value(&self, domain: Domain) -> ChecksumValue {
        *self.advertised().get(domain)
    }

    pub fn set_metrics(&self, metrics: &NodeMetrics) {
        self.peer.respond(queries::METRICS, metrics_rows(metrics));
    }

    fn script(&self, payload: &DomainPayload, value: ChecksumValue) {
        let plan = DomainPlan::for_domain(payload.domain);
        for fetch in &plan.fetches {
            let set = payload
                .table(fetch.table)
                .cloned()
                .unwrap_or_else(|| ResultSet::new(["id"]));
            self.peer.respond(fetch.query, set);
        }
        if let Some(check) = plan.runtime_check {
            self.peer.respond(
                check.query,
                ResultSet::new(["checksum"]).with_row(Row::from_values([value.checksum.to_hex()])),
            );
        }
        self.publish();
    }

    fn bump(&self, domain: Domain, checksum: Checksum, epoch: i64) -> ChecksumValue {
        let mut advertised = self.advertised();
        let slot = advertised.get_mut(domain);
        *slot = ChecksumValue::new(checksum, slot.version + 1, epoch.max(slot.epoch + 1));
        *slot
    }

    fn advertised(&self) -> std::sync::MutexGuard<'_, PerDomain<ChecksumValue>> {
        self.advertised.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self) {
        let advertised = self.advertised().clone();
        let global = Checksum::combine(advertised.iter().map(|(_, v)| v.checksum));
        self.peer.respond(
            queries::CHECKSUMS,
            checksum_rows(advertised.iter().map(|(d, v)| (d, *v))),
        );
        self.peer
            .respond(queries::GLOBAL_CHECKSUM, global_checksum_row(global));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_core::rows::{parse_checksum_rows, parse_global_checksum};
    use fleetsync_sync::{Credentials, PeerConnection, PeerConnector};

    fn addr() -> PeerAddress {
        PeerAddress::new("10.0.0.2", 6032)
    }

    #[tokio::test]
    async fn test_scripted_peer_advertises_what_it_serves() {
        let network = MemoryNetwork::new();
        let scripted = ScriptedPeer::new(&network, addr());
        let payload = sample_payload(Domain::MysqlUsers, 7);
        let value = scripted.serve(&payload);
        assert_eq!(value.checksum, payload.checksum());
        assert_eq!(value.version, 2);

        let next = scripted.serve(&sample_payload(Domain::MysqlUsers, 8));
        assert_eq!(next.version, 3);
        assert!(next.epoch > value.epoch);

        let mut conn = network.connect(&addr(), &Credentials::default()).await.unwrap();
        let rows = conn.query(queries::CHECKSUMS).await.unwrap();
        let users = parse_checksum_rows(&rows)
            .into_iter()
            .map(Result::unwrap)
            .find(|r| r.domain == Domain::MysqlUsers)
            .unwrap();
        assert_eq!(users.value.checksum, payload.checksum());

        let before = parse_global_checksum(&conn.query(queries::GLOBAL_CHECKSUM).await.unwrap())
            .unwrap();
        let advertised = scripted.advertise(Domain::MysqlUsers, Checksum(5));
        assert_eq!(advertised.version, 4);
        let after = parse_global_checksum(&conn.query(queries::GLOBAL_CHECKSUM).await.unwrap())
            .unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_sample_payload_follows_plan() {
        for domain in Domain::ALL {
            let payload = sample_payload(domain, 1);
            let plan = DomainPlan::for_domain(domain);
            assert_eq!(payload.tables.len(), plan.fetches.len());
            assert_ne!(payload.checksum(), sample_payload(domain, 2).checksum());
        }
    }
}
