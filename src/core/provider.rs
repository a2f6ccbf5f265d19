// src/core/provider.rs

//! Holds the currently active configuration snapshot behind an atomic pointer.

use crate::core::snapshot::Snapshot;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// The single owner of the active [`Snapshot`].
///
/// `get` and `replace` are lock-free; `replace` is the only write path and is
/// called from the reload operation. Every subsystem reads its configuration
/// through a provider reference; nothing reaches for a process global.
#[derive(Debug)]
pub struct ConfigProvider {
    current: ArcSwap<Snapshot>,
}

impl ConfigProvider {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    /// Returns the current snapshot. The returned `Arc` stays valid across a
    /// concurrent `replace`; callers wanting fresh values must call `get`
    /// again.
    pub fn get(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Atomically publishes a new snapshot. In-flight readers keep the
    /// snapshot they already loaded.
    pub fn replace(&self, snapshot: Snapshot) {
        self.current.store(Arc::new(snapshot));
    }
}
