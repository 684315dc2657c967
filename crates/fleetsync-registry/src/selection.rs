//! Sync-source selection.
//!
//! A peer qualifies as the source for a domain when its checksum differs
//! from ours, has differed for at least `threshold` consecutive polls, and
//! was loaded after ours (last writer wins):
//!
//! - a peer still at version 1 only carries what it booted with and is
//!   never trusted;
//! - a peer whose epoch is older than ours is behind us and will pull from
//!   us instead;
//! - a peer sharing our epoch with a different checksum is a conflict that
//!   neither side can resolve on its own.
//!
//! Among qualifying peers the freshest change wins, then the highest
//! weight, then the lowest identity.

use std::cmp::{Ordering, Reverse};
use std::collections::HashSet;

use fleetsync_core::{ChecksumValue, Domain, NodeEntry, NodeId, PeerAddress};

/// The peer chosen to pull a domain from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCandidate {
    pub id: NodeId,
    pub address: PeerAddress,
    pub domain: Domain,
    /// The peer's advertised value at selection time.
    pub value: ChecksumValue,
    pub last_changed: i64,
    pub diff_check: u32,
    pub weight: u64,
}

/// Outcome of a selection query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDecision {
    /// Syncing of this domain is turned off.
    Disabled,
    /// No active peer advertises a different checksum.
    InSync,
    /// Some peers differ, but none has passed the hysteresis gate yet.
    Delayed { pending: usize },
    /// Peers that passed the gate still carry their boot configuration.
    VersionOne { peers: usize },
    /// Peers that passed the gate share our epoch with another checksum.
    ShareEpoch { peers: usize },
    /// Every differing peer was loaded before our own copy.
    LocalNewer { peers: usize },
    Sync(SyncCandidate),
}

impl SyncDecision {
    pub fn candidate(self) -> Option<SyncCandidate> {
        match self {
            SyncDecision::Sync(c) => Some(c),
            _ => None,
        }
    }
}

/// Pick the sync source for `domain` among `entries`.
///
/// `threshold == 0` disables the domain.
pub fn select<'a, I>(
    entries: I,
    domain: Domain,
    local: ChecksumValue,
    threshold: u32,
    exclude: &HashSet<NodeId>,
) -> SyncDecision
where
    I: IntoIterator<Item = &'a NodeEntry>,
{
    if threshold == 0 {
        return SyncDecision::Disabled;
    }

    let mut pending = 0usize;
    let mut version_one = 0usize;
    let mut share_epoch = 0usize;
    let mut behind = 0usize;
    let mut best: Option<&NodeEntry> = None;

    for entry in entries {
        if !entry.active || exclude.contains(&entry.id()) {
            continue;
        }
        let record = entry.checksum(domain);
        if !record.differs_from(local.checksum) {
            continue;
        }
        if record.diff_check < threshold {
            pending += 1;
            continue;
        }
        if record.value.is_boot_load() {
            version_one += 1;
            continue;
        }
        match record.value.epoch.cmp(&local.epoch) {
            Ordering::Less => {
                behind += 1;
                continue;
            }
            Ordering::Equal => {
                share_epoch += 1;
                continue;
            }
            Ordering::Greater => {}
        }
        best = match best {
            Some(current) if rank(current, domain) >= rank(entry, domain) => Some(current),
            _ => Some(entry),
        };
    }

    if let Some(entry) = best {
        let record = entry.checksum(domain);
        return SyncDecision::Sync(SyncCandidate {
            id: entry.id(),
            address: entry.address().clone(),
            domain,
            value: record.value,
            last_changed: record.last_changed,
            diff_check: record.diff_check,
            weight: entry.weight,
        });
    }
    if share_epoch > 0 {
        SyncDecision::ShareEpoch { peers: share_epoch }
    } else if version_one > 0 {
        SyncDecision::VersionOne { peers: version_one }
    } else if pending > 0 {
        SyncDecision::Delayed { pending }
    } else if behind > 0 {
        SyncDecision::LocalNewer { peers: behind }
    } else {
        SyncDecision::InSync
    }
}

fn rank(entry: &NodeEntry, domain: Domain) -> (i64, u64, Reverse<NodeId>) {
    (
        entry.checksum(domain).last_changed,
        entry.weight,
        Reverse(entry.id()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_core::{Checksum, ChecksumRow, PerDomain};
    use proptest::prelude::*;

    const LOCAL: Checksum = Checksum(1);
    const LOCAL_EPOCH: i64 = 100;

    fn peer(host: &str, weight: u64) -> NodeEntry {
        NodeEntry::new(PeerAddress::new(host, 6032), weight, "")
    }

    fn local_table() -> PerDomain<Checksum> {
        PerDomain::from_fn(|_| LOCAL)
    }

    fn local() -> ChecksumValue {
        ChecksumValue::new(LOCAL, 3, LOCAL_EPOCH)
    }

    /// Report `value` for mysql_users at each of `times`.
    fn report_value(entry: &mut NodeEntry, value: ChecksumValue, times: &[i64]) {
        let row = ChecksumRow {
            domain: Domain::MysqlUsers,
            value,
        };
        for t in times {
            entry.set_checksums(&[row], &local_table(), *t);
        }
    }

    /// Report `checksum`, loaded after ours, at each of `times`.
    fn report(entry: &mut NodeEntry, checksum: u64, times: &[i64]) {
        report_value(
            entry,
            ChecksumValue::new(Checksum(checksum), 2, LOCAL_EPOCH + 1),
            times,
        );
    }

    fn pick(entries: &[NodeEntry], threshold: u32) -> SyncDecision {
        select(entries, Domain::MysqlUsers, local(), threshold, &HashSet::new())
    }

    #[test]
    fn test_disabled_and_in_sync() {
        let mut a = peer("a", 1);
        report(&mut a, 1, &[10]);
        assert_eq!(pick(&[a.clone()], 0), SyncDecision::Disabled);
        assert_eq!(pick(&[a], 3), SyncDecision::InSync);
    }

    #[test]
    fn test_hysteresis_gate() {
        let mut a = peer("a", 1);
        report(&mut a, 7, &[10, 20]);
        assert_eq!(pick(&[a.clone()], 3), SyncDecision::Delayed { pending: 1 });

        report(&mut a, 7, &[30]);
        let c = pick(&[a], 3).candidate().unwrap();
        assert_eq!(c.value.checksum, Checksum(7));
        assert_eq!(c.last_changed, 10);
        assert_eq!(c.diff_check, 3);
    }

    #[test]
    fn test_freshest_change_wins() {
        let mut a = peer("a", 100);
        let mut b = peer("b", 1);
        report(&mut a, 7, &[10, 20, 30, 40]);
        report(&mut b, 8, &[15, 20, 30, 40]);
        let c = pick(&[a, b], 3).candidate().unwrap();
        assert_eq!(c.address.hostname, "b");
    }

    #[test]
    fn test_weight_breaks_timestamp_tie() {
        let mut a = peer("a", 1);
        let mut b = peer("b", 5);
        report(&mut a, 7, &[10, 20, 30]);
        report(&mut b, 8, &[10, 20, 30]);
        let c = pick(&[a, b], 3).candidate().unwrap();
        assert_eq!(c.address.hostname, "b");
    }

    #[test]
    fn test_lowest_id_breaks_full_tie() {
        let mut a = peer("a", 1);
        let mut b = peer("b", 1);
        report(&mut a, 7, &[10, 20, 30]);
        report(&mut b, 7, &[10, 20, 30]);
        let expected = a.id().min(b.id());
        assert_eq!(pick(&[a.clone(), b.clone()], 3).candidate().unwrap().id, expected);
        assert_eq!(pick(&[b, a], 3).candidate().unwrap().id, expected);
    }

    #[test]
    fn test_inactive_and_self_excluded() {
        let mut a = peer("a", 1);
        let mut b = peer("b", 1);
        report(&mut a, 7, &[10, 20, 30]);
        report(&mut b, 7, &[10, 20, 30]);
        a.active = false;
        let exclude: HashSet<_> = [b.id()].into_iter().collect();
        assert_eq!(
            select(&[a, b], Domain::MysqlUsers, local(), 3, &exclude),
            SyncDecision::InSync
        );
    }

    #[test]
    fn test_older_peer_never_overrides_local_load() {
        let mut a = peer("a", 1);
        report_value(&mut a, ChecksumValue::new(Checksum(7), 5, LOCAL_EPOCH - 1), &[10, 20, 30]);
        assert_eq!(pick(&[a], 3), SyncDecision::LocalNewer { peers: 1 });
    }

    #[test]
    fn test_same_epoch_different_checksum_is_a_conflict() {
        let mut a = peer("a", 1);
        let mut b = peer("b", 1);
        report_value(&mut a, ChecksumValue::new(Checksum(7), 5, LOCAL_EPOCH), &[10, 20, 30]);
        assert_eq!(pick(&[a.clone()], 3), SyncDecision::ShareEpoch { peers: 1 });

        // A newer peer still wins over the conflicting one.
        report(&mut b, 8, &[10, 20, 30]);
        let c = pick(&[a, b], 3).candidate().unwrap();
        assert_eq!(c.address.hostname, "b");
    }

    #[test]
    fn test_boot_configuration_is_not_a_source() {
        let mut a = peer("a", 1);
        report_value(&mut a, ChecksumValue::new(Checksum(7), 1, LOCAL_EPOCH + 50), &[10, 20, 30]);
        assert_eq!(pick(&[a.clone()], 3), SyncDecision::VersionOne { peers: 1 });

        report_value(&mut a, ChecksumValue::new(Checksum(7), 2, LOCAL_EPOCH + 60), &[40]);
        assert!(pick(&[a], 3).candidate().is_some());
    }

    #[test]
    fn test_pending_peer_reported_before_older_ones() {
        let mut a = peer("a", 1);
        let mut b = peer("b", 1);
        report_value(&mut a, ChecksumValue::new(Checksum(7), 5, LOCAL_EPOCH - 1), &[10, 20, 30]);
        report(&mut b, 8, &[30]);
        assert_eq!(pick(&[a, b], 3), SyncDecision::Delayed { pending: 1 });
    }

    proptest! {
        /// A checksum that flips back and forth never accrues enough polls.
        #[test]
        fn test_flapping_peer_never_selected(
            flips in prop::collection::vec(prop_oneof![Just(1u64), Just(7u64), Just(8u64)], 1..40),
            threshold in 2u32..6,
        ) {
            let mut a = peer("a", 1);
            let mut prev = None;
            let mut run = 0u32;
            for (i, c) in flips.iter().enumerate() {
                report(&mut a, *c, &[i as i64]);
                run = if prev == Some(*c) { run + 1 } else { 1 };
                prev = Some(*c);
                let decision = pick(std::slice::from_ref(&a), threshold);
                if *c == LOCAL.0 {
                    prop_assert_eq!(decision, SyncDecision::InSync);
                } else if run < threshold {
                    prop_assert_eq!(decision, SyncDecision::Delayed { pending: 1 });
                } else {
                    prop_assert!(decision.candidate().is_some());
                }
            }
        }
    }
}
