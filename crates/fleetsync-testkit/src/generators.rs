//! Proptest generators for property-based testing.

use proptest::prelude::*;

use fleetsync_core::{Checksum, ChecksumValue, Domain, PeerAddress, ResultSet, Row, ServerRow};
use fleetsync_store::DomainPayload;
use fleetsync_sync::DomainPlan;

/// Generate a Domain.
pub fn domain() -> impl Strategy<Value = Domain> {
    prop::sample::select(Domain::ALL.to_vec())
}

/// Generate a random Checksum.
pub fn checksum() -> impl Strategy<Value = Checksum> {
    any::<u64>().prop_map(Checksum)
}

/// Generate a checksum from a small alphabet, so repeats are common.
pub fn small_checksum() -> impl Strategy<Value = Checksum> {
    (0u64..4).prop_map(Checksum)
}

/// Generate an advertised checksum tuple.
pub fn checksum_value() -> impl Strategy<Value = ChecksumValue> {
    (checksum(), 0u64..1_000, 1_600_000_000i64..1_900_000_000)
        .prop_map(|(c, version, epoch)| ChecksumValue::new(c, version, epoch))
}

/// Generate a peer address in a small host space.
pub fn peer_address() -> impl Strategy<Value = PeerAddress> {
    (0u8..16, prop::sample::select(vec![6032u16, 6033]))
        .prop_map(|(host, port)| PeerAddress::new(format!("10.0.0.{host}"), port))
}

/// Generate a server row.
pub fn server_row() -> impl Strategy<Value = ServerRow> {
    (peer_address(), 0u64..100, "[a-z]{0,8}").prop_map(|(addr, weight, comment)| {
        ServerRow::new(addr.hostname, addr.port, weight, comment)
    })
}

/// Generate a server list with distinct addresses.
pub fn server_list(max_len: usize) -> impl Strategy<Value = Vec<ServerRow>> {
    prop::collection::vec(server_row(), 0..=max_len).prop_map(|rows| {
        let mut seen = std::collections::HashSet::new();
        rows.into_iter()
            .filter(|r| seen.insert(r.address()))
            .collect()
    })
}

/// Generate a two-column result set with nullable values.
pub fn result_set(max_rows: usize) -> impl Strategy<Value = ResultSet> {
    prop::collection::vec(
        (
            prop::option::of("[a-z0-9]{0,6}"),
            prop::option::of("[a-z0-9]{0,6}"),
        ),
        0..=max_rows,
    )
    .prop_map(|rows| {
        let mut set = ResultSet::new(["k", "v"]);
        for (k, v) in rows {
            set.push(Row(vec![k, v]));
        }
        set
    })
}

/// Generate a payload for `domain` whose tables follow its pull plan.
pub fn domain_payload(domain: Domain, max_rows: usize) -> impl Strategy<Value = DomainPayload> {
    let plan = DomainPlan::for_domain(domain);
    let tables: Vec<&'static str> = plan.fetches.iter().map(|f| f.table).collect();
    prop::collection::vec(result_set(max_rows), tables.len()).prop_map(move |sets| {
        let mut payload = DomainPayload::new(domain);
        for (name, set) in tables.iter().zip(sets) {
            payload.push_table(*name, set);
        }
        payload
    })
}

/// A sequence of checksums a peer advertises over successive polls.
pub fn checksum_history(max_len: usize) -> impl Strategy<Value = Vec<Checksum>> {
    prop::collection::vec(small_checksum(), 1..=max_len)
}
