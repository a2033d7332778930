//! Fan-out / Gather
//!
//! Dispatches one operation to every peer and collects per-peer outcomes
//! in peer order. Two dispatch orders exist and callers pick one on
//! purpose:
//!
//! - [`gather_remote_then_local`]: remote peers run concurrently, the local
//!   peer runs only after all of them finished (restart, list-locks).
//! - [`gather_all`]: every peer, local included, runs concurrently
//!   (reinit-disks, uptime, get-config).
//!
//! Neither imposes a timeout; a stalled peer stalls the whole gather.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::peers::Peer;
use crate::runner::CommandRunner;

/// Per-peer outcomes of one fan-out, indexed like the peer list
#[derive(Debug)]
pub struct AggregateResult<T> {
    /// Value from each peer (default where the peer failed)
    pub results: Vec<T>,
    /// Error from each peer (`None` where the peer succeeded)
    pub errors: Vec<Option<Error>>,
}

impl<T: Default> AggregateResult<T> {
    fn with_len(n: usize) -> Self {
        Self {
            results: std::iter::repeat_with(T::default).take(n).collect(),
            errors: std::iter::repeat_with(|| None).take(n).collect(),
        }
    }

    fn set(&mut self, idx: usize, outcome: Result<T>) {
        match outcome {
            Ok(value) => self.results[idx] = value,
            Err(e) => self.errors[idx] = Some(e),
        }
    }
}

impl<T> AggregateResult<T> {
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of peers that answered successfully
    pub fn success_count(&self) -> usize {
        self.errors.iter().filter(|e| e.is_none()).count()
    }

    /// Pair each peer's value with its error
    pub fn into_outcomes(self) -> Vec<Result<T>> {
        self.results
            .into_iter()
            .zip(self.errors)
            .map(|(value, err)| match err {
                Some(e) => Err(e),
                None => Ok(value),
            })
            .collect()
    }
}

fn spawn_op<T, F, Fut>(peer: &Peer, op: &F) -> JoinHandle<Result<T>>
where
    T: Send + 'static,
    F: Fn(Arc<dyn CommandRunner>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    tokio::spawn(op(Arc::clone(&peer.runner)))
}

fn joined<T>(outcome: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    outcome.unwrap_or_else(|e| Err(Error::Internal(format!("peer task failed: {e}"))))
}

/// Run `op` on every peer concurrently and wait for all of them
pub async fn gather_all<T, F, Fut>(peers: &[Peer], op: F) -> AggregateResult<T>
where
    T: Default + Send + 'static,
    F: Fn(Arc<dyn CommandRunner>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let handles: Vec<_> = peers.iter().map(|peer| spawn_op(peer, &op)).collect();

    let mut aggregate = AggregateResult::with_len(peers.len());
    for (idx, outcome) in join_all(handles).await.into_iter().enumerate() {
        aggregate.set(idx, joined(outcome));
    }
    aggregate
}

/// Run `op` on the remote peers concurrently, wait for all of them, then
/// run it on the local peer (index 0) in the calling task
pub async fn gather_remote_then_local<T, F, Fut>(peers: &[Peer], op: F) -> AggregateResult<T>
where
    T: Default + Send + 'static,
    F: Fn(Arc<dyn CommandRunner>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let mut aggregate = AggregateResult::with_len(peers.len());
    let Some((local, remotes)) = peers.split_first() else {
        return aggregate;
    };

    let handles: Vec<_> = remotes.iter().map(|peer| spawn_op(peer, &op)).collect();
    for (idx, outcome) in join_all(handles).await.into_iter().enumerate() {
        // remotes is shifted by one relative to peers
        aggregate.set(idx + 1, joined(outcome));
    }

    aggregate.set(0, op(Arc::clone(&local.runner)).await);
    aggregate
}
