//! Admin connections to peers.
//!
//! The wire protocol is a collaborator: anything that can run a SQL string
//! against a peer's admin interface and return a [`ResultSet`] can back
//! these traits.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fleetsync_core::{PeerAddress, ResultSet};

use crate::error::{Result, SyncError};

/// Credentials for peer admin interfaces.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opens connections to peers.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    type Connection: PeerConnection;

    async fn connect(
        &self,
        address: &PeerAddress,
        credentials: &Credentials,
    ) -> Result<Self::Connection>;
}

/// An open admin connection.
#[async_trait]
pub trait PeerConnection: Send {
    async fn query(&mut self, sql: &str) -> Result<ResultSet>;
}

/// Run a peer operation with a deadline.
pub(crate) async fn bounded<T, F>(peer: &PeerAddress, limit: Duration, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, op)
        .await
        .map_err(|_| SyncError::Timeout(peer.clone()))?
}

/// A scripted in-memory fleet for testing.
///
/// Each [`MemoryPeer`] answers a fixed set of queries. Responses, failures
/// and hooks can be changed at any time, including mid-pull.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex, PoisonError, RwLock};

    type Hook = Arc<dyn Fn() + Send + Sync>;

    /// One scripted peer.
    #[derive(Default)]
    pub struct MemoryPeer {
        state: Mutex<PeerState>,
    }

    #[derive(Default)]
    struct PeerState {
        responses: HashMap<String, ResultSet>,
        failing: HashSet<String>,
        hooks: HashMap<String, Hook>,
        down: bool,
        log: Vec<String>,
    }

    impl MemoryPeer {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn state(&self) -> std::sync::MutexGuard<'_, PeerState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Answer `sql` with `result`.
        pub fn respond(&self, sql: &str, result: ResultSet) {
            let mut state = self.state();
            state.failing.remove(sql);
            state.responses.insert(sql.to_string(), result);
        }

        /// Make `sql` fail until it is scripted again.
        pub fn fail(&self, sql: &str) {
            self.state().failing.insert(sql.to_string());
        }

        /// Run `hook` after `sql` is answered.
        pub fn on_query(&self, sql: &str, hook: impl Fn() + Send + Sync + 'static) {
            self.state().hooks.insert(sql.to_string(), Arc::new(hook));
        }

        /// Refuse new connections.
        pub fn set_down(&self, down: bool) {
            self.state().down = down;
        }

        /// Every query received, in order.
        pub fn queries(&self) -> Vec<String> {
            self.state().log.clone()
        }

        fn answer(&self, address: &PeerAddress, sql: &str) -> Result<ResultSet> {
            let (result, hook) = {
                let mut state = self.state();
                state.log.push(sql.to_string());
                let result = if state.failing.contains(sql) {
                    Err(SyncError::Query {
                        peer: address.clone(),
                        reason: "injected failure".into(),
                    })
                } else {
                    state.responses.get(sql).cloned().ok_or_else(|| SyncError::Query {
                        peer: address.clone(),
                        reason: format!("no response scripted for: {sql}"),
                    })
                };
                (result, state.hooks.get(sql).cloned())
            };
            if result.is_ok() {
                if let Some(hook) = hook {
                    hook();
                }
            }
            result
        }
    }

    /// Address book of scripted peers.
    #[derive(Default)]
    pub struct MemoryNetwork {
        peers: RwLock<HashMap<PeerAddress, Arc<MemoryPeer>>>,
        credentials: RwLock<Option<Credentials>>,
    }

    impl MemoryNetwork {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Register a peer at `address`, returning its script handle.
        pub fn add_peer(&self, address: PeerAddress) -> Arc<MemoryPeer> {
            let peer = MemoryPeer::new();
            self.peers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(address, Arc::clone(&peer));
            peer
        }

        pub fn peer(&self, address: &PeerAddress) -> Option<Arc<MemoryPeer>> {
            self.peers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(address)
                .cloned()
        }

        /// Require these credentials on connect.
        pub fn require_credentials(&self, credentials: Credentials) {
            *self
                .credentials
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(credentials);
        }
    }

    /// An open connection to a [`MemoryPeer`].
    pub struct MemoryConnection {
        address: PeerAddress,
        peer: Arc<MemoryPeer>,
    }

    #[async_trait]
    impl PeerConnector for MemoryNetwork {
        type Connection = MemoryConnection;

        async fn connect(
            &self,
            address: &PeerAddress,
            credentials: &Credentials,
        ) -> Result<MemoryConnection> {
            let required = self
                .credentials
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if required.is_some_and(|c| &c != credentials) {
                return Err(SyncError::Connect {
                    peer: address.clone(),
                    reason: "access denied".into(),
                });
            }
            let peer = self.peer(address).ok_or_else(|| SyncError::Connect {
                peer: address.clone(),
                reason: "host unreachable".into(),
            })?;
            if peer.state().down {
                return Err(SyncError::Connect {
                    peer: address.clone(),
                    reason: "connection refused".into(),
                });
            }
            Ok(MemoryConnection {
                address: address.clone(),
                peer,
            })
        }
    }

    #[async_trait]
    impl PeerConnection for MemoryConnection {
        async fn query(&mut self, sql: &str) -> Result<ResultSet> {
            self.peer.answer(&self.address, sql)
        }
    }
}
