//! Cluster Admin Operations
//!
//! Broadcasts admin operations to every peer in the directory and reduces
//! the per-peer answers into one cluster-wide answer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::gather::{gather_all, gather_remote_then_local, AggregateResult};
use crate::locks::LockRecord;
use crate::peers::AdminPeers;
use crate::quorum;
use crate::reconcile::{self, ConfigSnapshot};
use crate::runner::CommandRunner;

impl AdminPeers {
    fn local_runner(&self) -> Result<&Arc<dyn CommandRunner>> {
        self.local()
            .map(|peer| &peer.runner)
            .ok_or_else(|| Error::Internal("admin peer directory is empty".into()))
    }

    /// Restart every node: remote peers first, then this one.
    ///
    /// Failures are logged and returned per peer; nothing is retried.
    pub async fn send_restart(&self) -> AggregateResult<()> {
        tracing::info!("Sending restart to {} peers", self.len());

        let aggregate = gather_remote_then_local(self.peers(), |runner| async move {
            runner.restart().await
        })
        .await;

        for (peer, err) in self.peers().iter().zip(&aggregate.errors) {
            if let Some(e) = err {
                tracing::warn!("Restart of {} failed: {}", peer.address, e);
            }
        }
        aggregate
    }

    /// Locks held across the cluster in `namespace` under `prefix` for at
    /// least `min_age`. The order of the returned records is unspecified.
    pub async fn list_locks(
        &self,
        namespace: &str,
        prefix: &str,
        min_age: Duration,
    ) -> Result<Vec<LockRecord>> {
        let ns = namespace.to_string();
        let pfx = prefix.to_string();
        let aggregate = gather_remote_then_local(self.peers(), move |runner| {
            let ns = ns.clone();
            let pfx = pfx.clone();
            async move { runner.list_locks(&ns, &pfx, min_age).await }
        })
        .await;

        let AggregateResult { results, errors } = aggregate;
        quorum::reduce_read_quorum_errs(errors, quorum::lock_read_quorum(self.len()))?;

        Ok(merge_locks(results))
    }

    /// Tell every node to reinitialize its disks after a format change.
    ///
    /// Always reports success: per-peer failures are only logged.
    // TODO: surface per-peer failures once the heal handler can act on them
    pub async fn reinit_disks(&self) -> Result<()> {
        let aggregate = gather_all(self.peers(), |runner| async move {
            runner.reinit_disks().await
        })
        .await;

        for (peer, err) in self.peers().iter().zip(&aggregate.errors) {
            if let Some(e) = err {
                tracing::warn!("Reinitializing disks on {} failed: {}", peer.address, e);
            }
        }
        Ok(())
    }

    /// Cluster uptime: the time since read quorum was last established.
    ///
    /// On a single node this is simply the local uptime.
    pub async fn uptime(&self) -> Result<Duration> {
        if !self.is_distributed() {
            return self.local_runner()?.uptime().await;
        }

        let aggregate = gather_all(self.peers(), |runner| async move {
            runner.uptime().await
        })
        .await;

        let mut uptimes = Vec::with_capacity(aggregate.len());
        for (peer, outcome) in self.peers().iter().zip(aggregate.into_outcomes()) {
            match outcome {
                Ok(uptime) => uptimes.push(uptime),
                Err(e) => tracing::warn!("Unable to fetch uptime from {}: {}", peer.address, e),
            }
        }

        quorum_uptime(uptimes, quorum::uptime_read_quorum(self.len()))
    }

    /// The config document a write quorum of nodes agree on, serialized.
    ///
    /// On a single node the local document is returned as is.
    pub async fn get_config(&self) -> Result<Vec<u8>> {
        if !self.is_distributed() {
            return self.local_runner()?.get_config().await;
        }

        let aggregate = gather_all(self.peers(), |runner| async move {
            runner.get_config().await
        })
        .await;

        let mut snapshots = Vec::with_capacity(aggregate.len());
        for (peer, outcome) in self.peers().iter().zip(aggregate.into_outcomes()) {
            match outcome {
                Ok(bytes) => match ConfigSnapshot::from_bytes(&bytes) {
                    Ok(snapshot) => snapshots.push(Some(snapshot)),
                    Err(e) => {
                        // one malformed document fails the whole call
                        tracing::error!("Failed to decode config from {}: {}", peer.address, e);
                        return Err(e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Unable to fetch config from {}: {}", peer.address, e);
                    snapshots.push(None);
                }
            }
        }

        match reconcile::reconcile(&snapshots) {
            Ok(snapshot) => snapshot.to_bytes(),
            Err(e) => {
                tracing::error!("Unable to find a valid server config: {}", e);
                Err(e)
            }
        }
    }
}

/// Pick the `quorum`-th smallest uptime: the most recent moment at which
/// `quorum` nodes were up at the same time.
pub fn quorum_uptime(mut uptimes: Vec<Duration>, quorum: usize) -> Result<Duration> {
    uptimes.sort_unstable();

    let mut valid = 0;
    let mut latest = Duration::ZERO;
    for uptime in uptimes {
        valid += 1;
        if valid >= quorum {
            latest = uptime;
            break;
        }
    }

    if valid < quorum {
        return Err(Error::InsufficientReadQuorum);
    }
    Ok(latest)
}

/// Flatten per-peer lock listings, keeping records of the same
/// `(namespace, path)` next to each other
fn merge_locks(per_peer: Vec<Vec<LockRecord>>) -> Vec<LockRecord> {
    let mut grouped: HashMap<(String, String), Vec<LockRecord>> = HashMap::new();
    for record in per_peer.into_iter().flatten() {
        grouped
            .entry((record.namespace.clone(), record.path.clone()))
            .or_default()
            .push(record);
    }
    grouped.into_values().flatten().collect()
}
