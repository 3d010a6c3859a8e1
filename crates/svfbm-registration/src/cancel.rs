use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared abort flag.
///
/// Clones observe the same flag. Workers poll it between blocks; blocks
/// already in flight finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag for every clone.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
