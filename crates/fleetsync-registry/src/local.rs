//! This instance's own per-domain checksums.

use std::sync::{PoisonError, RwLock};

use fleetsync_core::{Checksum, ChecksumValue, Domain, PerDomain, ResultSet, Row};

/// The checksums of the configuration currently loaded locally.
///
/// Shared between the registry (selection compares peers against it) and
/// the coordinator (which updates it after applying a pull). Each update
/// replaces one domain's value wholesale.
#[derive(Debug, Default)]
pub struct LocalChecksums {
    values: RwLock<PerDomain<ChecksumValue>>,
}

impl LocalChecksums {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, domain: Domain) -> ChecksumValue {
        *self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(domain)
    }

    pub fn checksum(&self, domain: Domain) -> Checksum {
        self.get(domain).checksum
    }

    /// Snapshot of every domain's checksum.
    pub fn checksums(&self) -> PerDomain<Checksum> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        PerDomain::from_fn(|d| values.get(d).checksum)
    }

    /// Overwrite a domain's value.
    pub fn set(&self, domain: Domain, value: ChecksumValue) {
        *self
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(domain) = value;
    }

    /// Record the configuration `domain` was booted with.
    ///
    /// Boot values carry version 1, which peers never sync from.
    pub fn record_boot(&self, domain: Domain, checksum: Checksum, epoch: i64) -> ChecksumValue {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let slot = values.get_mut(domain);
        *slot = ChecksumValue::new(checksum, 1, epoch);
        *slot
    }

    /// Record a runtime load of `domain` with content `checksum`.
    ///
    /// The version is bumped past the boot value. The epoch (Unix seconds)
    /// never goes backwards: a load is always newer than the one it
    /// replaces, even within the same second.
    pub fn record_load(&self, domain: Domain, checksum: Checksum, epoch: i64) -> ChecksumValue {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let slot = values.get_mut(domain);
        *slot = ChecksumValue::new(
            checksum,
            slot.version.max(1) + 1,
            epoch.max(slot.epoch + 1),
        );
        *slot
    }

    /// Aggregate over all domains.
    pub fn global(&self) -> Checksum {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Checksum::combine(values.iter().map(|(_, v)| v.checksum))
    }

    /// The checksum table this instance advertises to peers.
    pub fn to_result_set(&self) -> ResultSet {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let mut set = ResultSet::new(["name", "version", "epoch", "checksum"]);
        for (domain, value) in values.iter() {
            set.push(Row::from_values([
                domain.as_str().to_string(),
                value.version.to_string(),
                value.epoch.to_string(),
                value.checksum.to_hex(),
            ]));
        }
        set
    }

    /// The single-row global checksum this instance advertises.
    pub fn global_result_set(&self) -> ResultSet {
        ResultSet::new(["global_checksum"]).with_row(Row::from_values([self.global().to_hex()]))
    }
}
