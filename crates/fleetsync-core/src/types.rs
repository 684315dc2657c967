//! Peer identity types.
//!
//! A peer is addressed by `(hostname, port)` and identified by a 64-bit
//! hash of that pair. The hash must not depend on process state, so it is
//! derived with blake3 rather than the std `RandomState` hasher.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

const NODE_ID_DOMAIN: &[u8] = b"fleetsync-node-v0:";

/// Identity of a peer: a deterministic hash of its hostname and port.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Derive the identity of `hostname:port`.
    pub fn generate(hostname: &str, port: u16) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(NODE_ID_DOMAIN);
        hasher.update(hostname.as_bytes());
        hasher.update(b":");
        hasher.update(&port.to_be_bytes());
        let digest = hasher.finalize();
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        Self(u64::from_le_bytes(word))
    }

    /// Get the raw value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:016x})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Network address of a peer's administrative interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerAddress {
    pub hostname: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// The identity this address hashes to.
    pub fn node_id(&self) -> NodeId {
        NodeId::generate(&self.hostname, self.port)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

impl FromStr for PeerAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| CoreError::InvalidAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(CoreError::InvalidAddress(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| CoreError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}
