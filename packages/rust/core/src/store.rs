//! Atomically swapped handle to the current content snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::debug;

use gitblog_shared::ContentSnapshot;

/// Readers call [`load`](ContentStore::load) and keep the `Arc` for as long
/// as they need a consistent view; a publish never touches a snapshot that
/// is already out.
#[derive(Debug)]
pub struct ContentStore {
    current: ArcSwap<ContentSnapshot>,
    generation: AtomicU64,
    published: watch::Sender<u64>,
}

impl ContentStore {
    pub fn new(initial: ContentSnapshot) -> Self {
        let (published, _) = watch::channel(0);
        Self {
            current: ArcSwap::from_pointee(initial),
            generation: AtomicU64::new(0),
            published,
        }
    }

    /// The current snapshot.
    pub fn load(&self) -> Arc<ContentSnapshot> {
        self.current.load_full()
    }

    /// Replace the current snapshot. Returns the handle now being served.
    pub fn publish(&self, snapshot: ContentSnapshot) -> Arc<ContentSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.current.store(Arc::clone(&snapshot));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.published.send_replace(generation);
        debug!(
            generation,
            sequence = snapshot.sequence,
            "published content snapshot"
        );
        snapshot
    }

    /// Number of publishes since construction.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Watch publishes; the value is the generation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.published.subscribe()
    }
}
