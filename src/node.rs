//! Local Node Context
//!
//! Process-wide state the local command runner reads: boot time, the
//! served config document, the lock inventory and the channel into the
//! service supervisor.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::locks::LockInventory;
use crate::reconcile::ConfigSnapshot;

/// Requests handled by the service supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceSignal {
    /// Tear the node down and start it again
    Restart,
    /// Shut the node down
    Stop,
    /// Reinitialize the storage layer after a format change
    ReinitDisks,
}

/// Current configuration document of this node
#[derive(Debug, Default)]
pub struct ConfigStore {
    current: RwLock<Option<ConfigSnapshot>>,
}

impl ConfigStore {
    pub fn new(initial: Option<ConfigSnapshot>) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn get(&self) -> Option<ConfigSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, snapshot: ConfigSnapshot) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }
}

/// State of the local node shared with the admin layer
pub struct NodeContext {
    boot_time: OnceLock<Instant>,
    config: ConfigStore,
    locks: Arc<dyn LockInventory>,
    signals: mpsc::UnboundedSender<ServiceSignal>,
}

impl NodeContext {
    /// Create a context; the receiver belongs to the service supervisor
    pub fn new(
        locks: Arc<dyn LockInventory>,
        config: Option<ConfigSnapshot>,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Self {
            boot_time: OnceLock::new(),
            config: ConfigStore::new(config),
            locks,
            signals: tx,
        };
        (ctx, rx)
    }

    /// Record that the node finished booting. Only the first call counts.
    pub fn mark_booted(&self) -> bool {
        self.mark_booted_at(Instant::now())
    }

    pub fn mark_booted_at(&self, at: Instant) -> bool {
        self.boot_time.set(at).is_ok()
    }

    pub fn boot_time(&self) -> Option<Instant> {
        self.boot_time.get().copied()
    }

    /// Time since boot
    pub fn uptime(&self) -> Result<Duration> {
        self.boot_time
            .get()
            .map(Instant::elapsed)
            .ok_or(Error::NotInitialized)
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn locks(&self) -> &dyn LockInventory {
        self.locks.as_ref()
    }

    /// Hand a request to the supervisor without waiting for it
    pub fn send_signal(&self, signal: ServiceSignal) -> Result<()> {
        self.signals
            .send(signal)
            .map_err(|_| Error::ShuttingDown)
    }
}

/// Wait for the next signal that ends the current node run.
///
/// `ReinitDisks` is handled in place; `Restart` and `Stop` are returned to
/// the caller, which owns the actual restart sequence. A closed channel
/// counts as `Stop`.
pub async fn supervise(signals: &mut mpsc::UnboundedReceiver<ServiceSignal>) -> ServiceSignal {
    while let Some(signal) = signals.recv().await {
        match signal {
            ServiceSignal::ReinitDisks => {
                tracing::info!("Reinitializing storage layer on request from peer");
            }
            ServiceSignal::Restart | ServiceSignal::Stop => {
                tracing::info!("Service supervisor received {:?}", signal);
                return signal;
            }
        }
    }
    ServiceSignal::Stop
}
