//! Peer Directory
//!
//! The ordered list of admin peers, built once at startup. The local node
//! is always first; remote peers follow in the order their addresses first
//! appear among the cluster endpoints.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::config::{endpoint_host, WolfAdminConfig};
use crate::network::AuthRpcClient;
use crate::runner::{CommandRunner, RemoteRunner};

/// One cluster node reachable through a command runner
#[derive(Clone)]
pub struct Peer {
    pub address: String,
    pub runner: Arc<dyn CommandRunner>,
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer").field("address", &self.address).finish()
    }
}

/// Ordered, deduplicated set of admin peers
#[derive(Debug)]
pub struct AdminPeers {
    peers: Vec<Peer>,
    distributed: bool,
}

impl AdminPeers {
    /// Build the directory from endpoint strings.
    ///
    /// Endpoints without a host (local paths, empty strings) and addresses
    /// already present, the local one included, are skipped. `connect`
    /// creates the runner for each remote address.
    pub fn build<F>(
        local_address: &str,
        local: Arc<dyn CommandRunner>,
        endpoints: &[String],
        mut connect: F,
    ) -> Self
    where
        F: FnMut(&str) -> Arc<dyn CommandRunner>,
    {
        let mut peers = vec![Peer {
            address: local_address.to_string(),
            runner: local,
        }];

        let mut seen = HashSet::new();
        seen.insert(local_address.to_string());

        for host in endpoints.iter().filter_map(|ep| endpoint_host(ep)) {
            if seen.insert(host.clone()) {
                let runner = connect(&host);
                peers.push(Peer {
                    address: host,
                    runner,
                });
            }
        }

        let distributed = peers.len() > 1;
        Self { peers, distributed }
    }

    /// Build the directory for a node, wiring remote peers to
    /// authenticated RPC clients
    pub fn from_config(config: &WolfAdminConfig, local: Arc<dyn CommandRunner>) -> Self {
        let credential = config.credential.clone();
        let connect_timeout = config.connect_timeout();
        let request_timeout = config.request_timeout();

        Self::build(&config.node.address, local, &config.cluster.endpoints, |address| {
            let client = AuthRpcClient::new(
                address.to_string(),
                credential.clone(),
                connect_timeout,
                request_timeout,
            );
            Arc::new(RemoteRunner::new(Arc::new(client)))
        })
    }

    /// Use an explicit peer list and deployment mode
    pub fn from_peers(peers: Vec<Peer>, distributed: bool) -> Self {
        Self { peers, distributed }
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn local(&self) -> Option<&Peer> {
        self.peers.first()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Whether this node is part of a multi-node deployment
    pub fn is_distributed(&self) -> bool {
        self.distributed
    }

    pub fn addresses(&self) -> Vec<&str> {
        self.peers.iter().map(|p| p.address.as_str()).collect()
    }
}

static GLOBAL_ADMIN_PEERS: OnceLock<Arc<AdminPeers>> = OnceLock::new();

/// Install the process-wide directory. Returns false if one is already set.
pub fn init_global_admin_peers(peers: Arc<AdminPeers>) -> bool {
    GLOBAL_ADMIN_PEERS.set(peers).is_ok()
}

/// The process-wide directory, if initialized
pub fn global_admin_peers() -> Option<Arc<AdminPeers>> {
    GLOBAL_ADMIN_PEERS.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::LockRegistry;
    use crate::node::NodeContext;
    use crate::runner::LocalRunner;

    fn local_runner() -> Arc<dyn CommandRunner> {
        let (ctx, _rx) = NodeContext::new(Arc::new(LockRegistry::new()), None);
        Arc::new(LocalRunner::new(Arc::new(ctx)))
    }

    fn endpoints(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_local_first_and_deduplicated() {
        let eps = endpoints(&[
            "http://node-2:9000/export1",
            "http://node-1:9000/export1",
            "/mnt/export2",
            "",
            "http://node-3:9000/export1",
            "http://node-2:9000/export2",
            "node-1:9000",
        ]);

        let mut connected = Vec::new();
        let dir = AdminPeers::build("node-1:9000", local_runner(), &eps, |addr| {
            connected.push(addr.to_string());
            local_runner()
        });

        assert_eq!(dir.addresses(), vec!["node-1:9000", "node-2:9000", "node-3:9000"]);
        assert_eq!(connected, vec!["node-2:9000", "node-3:9000"]);
        assert!(dir.is_distributed());

        let unique: HashSet<_> = dir.addresses().into_iter().collect();
        assert_eq!(unique.len(), dir.len());
    }

    #[test]
    fn test_single_node() {
        let eps = endpoints(&["/mnt/export1", "/mnt/export2"]);
        let dir = AdminPeers::build("node-1:9000", local_runner(), &eps, |_| local_runner());

        assert_eq!(dir.len(), 1);
        assert_eq!(dir.local().unwrap().address, "node-1:9000");
        assert!(!dir.is_distributed());
    }

    #[test]
    fn test_from_config() {
        let config = WolfAdminConfig::from_str(
            r#"
[node]
address = "node-1:9000"

[cluster]
endpoints = ["http://node-1:9000/a", "http://node-2:9000/a", "http://node-3:9000/a"]

[credential]
access_key = "admin"
secret_key = "secret123"
"#,
        )
        .unwrap();

        let dir = AdminPeers::from_config(&config, local_runner());
        assert_eq!(dir.addresses(), vec!["node-1:9000", "node-2:9000", "node-3:9000"]);
        assert_eq!(dir.len(), config.node_count());
    }

    #[test]
    fn test_global_directory_set_once() {
        let first = Arc::new(AdminPeers::from_peers(Vec::new(), false));
        let second = Arc::new(AdminPeers::from_peers(Vec::new(), true));

        // other tests never touch the global, so the first set wins here
        assert!(init_global_admin_peers(Arc::clone(&first)));
        assert!(!init_global_admin_peers(second));
        assert!(!global_admin_peers().unwrap().is_distributed());
    }
}
