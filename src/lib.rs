//! WolfAdmin - Cluster Administration for WolfScale Storage Nodes
//!
//! Lets any node broadcast administrative operations (restart, disk
//! reinitialization, uptime, config fetch, lock inventory) to every node in
//! the cluster, itself included, and reconciles the per-node answers into
//! one cluster-wide answer using quorum arithmetic.
//!
//! # Architecture
//!
//! Every node keeps an ordered directory of admin peers built once at
//! startup, with itself first. Each peer is reached through a
//! [`runner::CommandRunner`]: in-process for the local node, over
//! authenticated RPC for the others. Aggregate operations fan out to all
//! peers and feed the collected answers to a reducer:
//!
//! - lock listings must pass a read quorum of `n/2 + 1`
//! - cluster uptime is the `n/2`-th smallest node uptime
//! - the config document must be shared by a write quorum of `n/2 + 1`

pub mod admin;
pub mod config;
pub mod error;
pub mod gather;
pub mod locks;
pub mod network;
pub mod node;
pub mod peers;
pub mod quorum;
pub mod reconcile;
pub mod rpc;
pub mod runner;

pub use config::WolfAdminConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfAdminConfig;
    pub use crate::error::{Error, Result};
    pub use crate::gather::AggregateResult;
    pub use crate::locks::{LockInventory, LockRecord, LockRegistry};
    pub use crate::node::{NodeContext, ServiceSignal};
    pub use crate::peers::{global_admin_peers, init_global_admin_peers, AdminPeers, Peer};
    pub use crate::reconcile::ConfigSnapshot;
    pub use crate::runner::{CommandRunner, LocalRunner, RemoteRunner};
}
