//! Config Reconciliation
//!
//! Picks the configuration document that a write quorum of peers agree on.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::quorum;

/// Configuration document fetched from one peer.
///
/// Compared by value: mapping keys are unordered, so two documents that
/// differ only in key order are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSnapshot(serde_json::Value);

impl ConfigSnapshot {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Build a snapshot from any serializable document
    pub fn from_document<T: Serialize>(document: &T) -> Result<Self> {
        Ok(Self(serde_json::to_value(document)?))
    }

    /// Decode a serialized snapshot
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self(serde_json::from_slice(bytes)?))
    }

    /// Serialize for the wire
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Count how many peers agree with each distinct snapshot.
///
/// Each distinct value is counted at the lowest index it appears in; all
/// later copies keep a zero count. `None` marks a peer that failed to
/// answer and does not vote. For `[c1, c2, c1, c1]` this yields `[3, 1, 0, 0]`.
pub fn count_occurrences(snapshots: &[Option<ConfigSnapshot>]) -> Vec<usize> {
    let mut counter = vec![0usize; snapshots.len()];

    // At the start of iteration i, the non-zero entries of counter[..i]
    // are exactly the distinct snapshots seen so far, and they sum to the
    // number of voting peers seen so far.
    for (i, slot) in snapshots.iter().enumerate() {
        let Some(current) = slot else {
            continue;
        };

        for j in 0..=i {
            if j == i {
                counter[i] = 1;
                break;
            }
            if counter[j] == 0 {
                // snapshots[j] already counted under a lower index
                continue;
            }
            if snapshots[j].as_ref() == Some(current) {
                counter[j] += 1;
                break;
            }
        }
    }

    counter
}

/// Select the snapshot held by at least a write quorum of the peers.
///
/// The quorum is taken over all peers, including the ones that failed.
/// On equal counts the group discovered first wins, which only matters
/// when that count also reaches quorum.
pub fn reconcile(snapshots: &[Option<ConfigSnapshot>]) -> Result<ConfigSnapshot> {
    let quorum = quorum::write_quorum(snapshots.len());
    let counter = count_occurrences(snapshots);

    let mut winner: Option<(usize, usize)> = None;
    for (i, &count) in counter.iter().enumerate() {
        if count > winner.map_or(0, |(_, max)| max) {
            winner = Some((i, count));
        }
    }

    match winner {
        Some((index, count)) if count >= quorum => {
            tracing::debug!(
                "Config agreed on by {}/{} peers (quorum {})",
                count,
                snapshots.len(),
                quorum
            );
            snapshots[index]
                .clone()
                .ok_or_else(|| Error::Internal("winning config slot is empty".into()))
        }
        _ => Err(Error::InsufficientWriteQuorum),
    }
}
