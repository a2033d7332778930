//! Quorum Arithmetic
//!
//! Quorum sizes for `n` peers and the reduction of per-peer error arrays
//! into one verdict.

use crate::error::{Error, Result};

/// Agreeing peers needed to accept a reconciled config
pub fn write_quorum(n: usize) -> usize {
    n / 2 + 1
}

/// Successful peers needed to accept a lock listing
pub fn lock_read_quorum(n: usize) -> usize {
    n / 2 + 1
}

/// Peers that must be up for the cluster to be readable.
///
/// One less strict than [`lock_read_quorum`]: uptime is measured from the
/// moment half of the nodes were up.
pub fn uptime_read_quorum(n: usize) -> usize {
    n / 2
}

/// Find the most frequent outcome in `errs`.
///
/// Errors are grouped by cause (their rendered message) and successes form
/// a group of their own. Returns the size of the largest group together
/// with its error, or `None` if success is the most frequent outcome.
/// Success wins ties; between errors the one seen first wins.
pub fn reduce_errs(errs: Vec<Option<Error>>) -> (usize, Option<Error>) {
    let mut groups: Vec<(Option<String>, usize, Option<Error>)> = Vec::new();

    for err in errs {
        let cause = err.as_ref().map(|e| e.to_string());
        match groups.iter_mut().find(|(key, _, _)| *key == cause) {
            Some(group) => group.1 += 1,
            None => groups.push((cause, 1, err)),
        }
    }

    let mut best: Option<usize> = None;
    let mut max = 0;
    for (i, (cause, count, _)) in groups.iter().enumerate() {
        if *count > max || (*count == max && cause.is_none()) {
            max = *count;
            best = Some(i);
        }
    }

    match best {
        Some(i) => {
            let (_, count, err) = groups.swap_remove(i);
            (count, err)
        }
        None => (0, None),
    }
}

/// Decide whether a read across peers can be trusted.
///
/// Passes when success is the dominant outcome. Otherwise the dominant
/// error is surfaced if it reached `quorum` peers, and
/// [`Error::InsufficientReadQuorum`] is returned if it did not.
pub fn reduce_read_quorum_errs(errs: Vec<Option<Error>>, quorum: usize) -> Result<()> {
    match reduce_errs(errs) {
        (_, None) => Ok(()),
        (count, Some(err)) if count >= quorum => Err(err),
        (count, Some(err)) => {
            tracing::debug!(
                "Dominant error '{}' seen on {} peers, below read quorum {}",
                err,
                count,
                quorum
            );
            Err(Error::InsufficientReadQuorum)
        }
    }
}
