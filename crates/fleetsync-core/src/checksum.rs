//! Domain checksums and per-peer change tracking.
//!
//! A [`Checksum`] summarizes the full content of one configuration domain.
//! A [`ChecksumRecord`] tracks how a peer's advertised checksum for a domain
//! has evolved across polls, and carries the hysteresis counter
//! (`diff_check`) used to decide when that peer is a trustworthy sync source.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::canonical::{canonical_tables, TableRef};
use crate::error::CoreError;

const GLOBAL_CHECKSUM_DOMAIN: &[u8] = b"fleetsync-global-v0:";

/// A 64-bit digest of a configuration domain.
///
/// Rendered as `0x` followed by 16 upper-case hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Checksum(pub u64);

impl Checksum {
    /// The checksum of "no configuration loaded".
    pub const ZERO: Self = Self(0);

    /// Checksum of a set of named tables, via their canonical encoding.
    pub fn of_tables<'a, I>(tables: I) -> Self
    where
        I: IntoIterator<Item = TableRef<'a>>,
    {
        Self::from_digest(blake3::hash(&canonical_tables(tables)).as_bytes())
    }

    /// Fold domain checksums into a single aggregate.
    ///
    /// Order matters: callers pass domains in `Domain::ALL` order.
    pub fn combine<I>(checksums: I) -> Self
    where
        I: IntoIterator<Item = Checksum>,
    {
        let mut hasher = blake3::Hasher::new();
        hasher.update(GLOBAL_CHECKSUM_DOMAIN);
        for c in checksums {
            hasher.update(&c.0.to_be_bytes());
        }
        Self::from_digest(hasher.finalize().as_bytes())
    }

    fn from_digest(digest: &[u8; 32]) -> Self {
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest[..8]);
        Self(u64::from_le_bytes(word))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parse the `0x…` textual form (prefix and case optional).
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.len() != 16 {
            return Err(CoreError::InvalidChecksum(s.to_string()));
        }
        let bytes = hex::decode(digits).map_err(|_| CoreError::InvalidChecksum(s.to_string()))?;
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes);
        Ok(Self(u64::from_be_bytes(word)))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode_upper(self.0.to_be_bytes()))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Checksum {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// An advertised checksum together with its load metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChecksumValue {
    pub checksum: Checksum,
    /// How many times the owner has loaded this domain.
    pub version: u64,
    /// Unix seconds of the owner's last load.
    pub epoch: i64,
}

impl ChecksumValue {
    pub fn new(checksum: Checksum, version: u64, epoch: i64) -> Self {
        Self {
            checksum,
            version,
            epoch,
        }
    }

    /// Whether the owner has only ever loaded its boot configuration.
    ///
    /// Such a value is never used as a sync source.
    pub fn is_boot_load(&self) -> bool {
        self.version <= 1
    }
}

/// One peer's checksum for one domain, plus change tracking.
///
/// Invariant: `last_changed <= last_updated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChecksumRecord {
    pub value: ChecksumValue,
    /// When this checksum was last observed (Unix ms).
    pub last_updated: i64,
    /// When a different checksum was last observed (Unix ms).
    pub last_changed: i64,
    /// Consecutive polls observing a checksum that differs from ours.
    /// Zero when the peer agrees with the local checksum.
    pub diff_check: u32,
}

/// How a record reacted to an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Checksum identical to the stored one.
    Unchanged,
    /// Checksum differs from the stored one.
    Changed,
}

impl ChecksumRecord {
    pub fn checksum(&self) -> Checksum {
        self.value.checksum
    }

    /// Apply one poll result.
    ///
    /// `local` is this instance's own checksum for the same domain.
    pub fn observe(&mut self, incoming: ChecksumValue, local: Checksum, now: i64) -> Observation {
        let observation = if incoming.checksum == self.value.checksum {
            self.value.version = incoming.version;
            self.value.epoch = incoming.epoch;
            self.last_updated = self.last_updated.max(now);
            if self.diff_check > 0 {
                self.diff_check = self.diff_check.saturating_add(1);
            }
            Observation::Unchanged
        } else {
            self.value = incoming;
            self.last_updated = self.last_updated.max(now);
            self.last_changed = self.last_updated;
            self.diff_check = 1;
            Observation::Changed
        };

        if self.value.checksum == local {
            self.diff_check = 0;
        }
        observation
    }

    /// Clear the hysteresis counter if the peer now agrees with `local`.
    ///
    /// A disagreement is never re-armed here: a peer whose checksum stopped
    /// matching because the local side changed is stale, not a sync source.
    pub fn resync_local(&mut self, local: Checksum) {
        if self.value.checksum == local {
            self.diff_check = 0;
        }
    }

    /// Whether the peer advertises something other than `local`.
    pub fn differs_from(&self, local: Checksum) -> bool {
        self.value.checksum != local
    }
}
