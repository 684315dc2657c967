//! Property tests for peer-list reconciliation through the facade.

use fleetsync::store::MemoryConfigStore;
use fleetsync::sync::MemoryNetwork;
use fleetsync::{Cluster, ClusterConfig, PeerAddress};
use fleetsync_testkit::generators;
use fleetsync_testkit::server_list;
use proptest::prelude::*;

fn cluster() -> Cluster<MemoryNetwork, MemoryConfigStore> {
    let config = ClusterConfig {
        admin_interfaces: "10.0.0.1:6032".into(),
        ..ClusterConfig::default()
    };
    Cluster::new(MemoryNetwork::default(), MemoryConfigStore::new(), config).unwrap()
}

proptest! {
    #[test]
    fn last_list_wins(first in generators::server_list(12), second in generators::server_list(12)) {
        let cluster = cluster();
        cluster.load_servers(&server_list(&first));
        cluster.load_servers(&server_list(&second));

        let mut expected: Vec<PeerAddress> = second.iter().map(|r| r.address()).collect();
        expected.sort();
        prop_assert_eq!(cluster.registry().addresses(), expected);

        for row in &second {
            let peer = cluster.registry().get(&row.address()).unwrap();
            prop_assert_eq!(peer.weight, row.weight);
        }
    }

    #[test]
    fn reloading_the_same_list_is_a_noop(rows in generators::server_list(12)) {
        let cluster = cluster();
        let set = server_list(&rows);
        let first = cluster.load_servers(&set);
        prop_assert_eq!(first.added.len(), rows.len());

        let again = cluster.load_servers(&set);
        prop_assert!(again.is_noop());
        prop_assert_eq!(cluster.registry().len(), rows.len());
    }
}
