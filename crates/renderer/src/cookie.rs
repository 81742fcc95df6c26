use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use render_protocol::TileProgress;

/// Per-tile handle shared between a running tile render and the outside
/// world: an abort flag polled at checkpoints plus progress counters.
#[derive(Debug, Default)]
pub struct RenderCookie {
    abort: AtomicBool,
    progress: AtomicU64,
    progress_max: AtomicU64,
}

impl RenderCookie {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset(&self) {
        self.abort.store(false, Ordering::Release);
        self.progress.store(0, Ordering::Relaxed);
        self.progress_max.store(0, Ordering::Relaxed);
    }

    pub fn abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    pub fn set_progress_max(&self, max: u64) {
        self.progress_max.store(max, Ordering::Relaxed);
    }

    pub fn advance(&self, amount: u64) {
        self.progress.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TileProgress {
        TileProgress {
            progress: self.progress.load(Ordering::Relaxed),
            max: self.progress_max.load(Ordering::Relaxed),
        }
    }
}
