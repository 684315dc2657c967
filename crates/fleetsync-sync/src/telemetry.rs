//! Pull counters.
//!
//! Counters are keyed by (domain, query, outcome) and delivered through
//! [`MetricsRecorder`], so the coordinator can run against an exporter, an
//! in-memory [`CounterSet`], or nothing at all.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use fleetsync_core::Domain;

use crate::queries::QueryKind;

/// What happened to one pull step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Outcome {
    Success,
    Failure,
    /// The source's checksum moved while the pull was in flight.
    Conflict,
    /// A peer differs but has not passed the hysteresis threshold.
    Delayed,
    /// A qualifying peer carries a different checksum under our own epoch.
    ShareEpoch,
    /// A qualifying peer is still on the configuration it booted with.
    VersionOne,
}

/// Identity of one counter.
///
/// `query` is set for `Success` and `Failure`, which are counted per query;
/// Every other outcome is counted per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    pub domain: Domain,
    pub query: Option<QueryKind>,
    pub outcome: Outcome,
}

impl CounterKey {
    pub fn pulled(query: QueryKind, success: bool) -> Self {
        Self {
            domain: query.domain(),
            query: Some(query),
            outcome: if success {
                Outcome::Success
            } else {
                Outcome::Failure
            },
        }
    }

    pub fn conflict(domain: Domain) -> Self {
        Self {
            domain,
            query: None,
            outcome: Outcome::Conflict,
        }
    }

    pub fn delayed(domain: Domain) -> Self {
        Self {
            domain,
            query: None,
            outcome: Outcome::Delayed,
        }
    }

    pub fn share_epoch(domain: Domain) -> Self {
        Self {
            domain,
            query: None,
            outcome: Outcome::ShareEpoch,
        }
    }

    pub fn version_one(domain: Domain) -> Self {
        Self {
            domain,
            query: None,
            outcome: Outcome::VersionOne,
        }
    }

    /// Exported counter name, e.g. `pulled_mysql_users_success`.
    pub fn metric_name(&self) -> String {
        match (self.outcome, self.query) {
            (Outcome::Success, Some(q)) => format!("pulled_{}_success", q.stem()),
            (Outcome::Failure, Some(q)) => format!("pulled_{}_failure", q.stem()),
            (Outcome::Success, None) => format!("pulled_{}_success", self.domain),
            (Outcome::Failure, None) => format!("pulled_{}_failure", self.domain),
            (Outcome::Conflict, _) => format!("sync_conflict_{}", self.domain),
            (Outcome::Delayed, _) => format!("sync_delayed_{}", self.domain),
            (Outcome::ShareEpoch, _) => format!("sync_conflict_{}_share_epoch", self.domain),
            (Outcome::VersionOne, _) => format!("sync_delayed_{}_version_one", self.domain),
        }
    }
}

/// Sink for counter increments.
pub trait MetricsRecorder: Send + Sync {
    fn increment(&self, key: CounterKey);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {
    fn increment(&self, _key: CounterKey) {}
}

/// In-memory counters.
#[derive(Debug, Default)]
pub struct CounterSet {
    counts: Mutex<HashMap<CounterKey, u64>>,
}

impl CounterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: CounterKey) -> u64 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
            .unwrap_or(0)
    }

    /// Look up a counter by its exported name.
    pub fn by_name(&self, name: &str) -> u64 {
        self.snapshot().get(name).copied().unwrap_or(0)
    }

    /// Every non-zero counter by exported name.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = BTreeMap::new();
        for (key, n) in counts.iter() {
            *out.entry(key.metric_name()).or_insert(0) += n;
        }
        out
    }

    pub fn total(&self) -> u64 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }
}

impl MetricsRecorder for CounterSet {
    fn increment(&self, key: CounterKey) {
        *self
            .counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(0) += 1;
    }
}
