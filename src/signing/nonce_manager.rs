use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// In-process nonce allocator for the live Order Executor.
///
/// The exchange only requires nonces to be unique per maker address, not
/// strictly sequential, so a monotonic counter seeded from wall-clock time
/// is sufficient here; there is no persisted nonce ledger to recover from
/// on restart.
pub struct NonceManager {
    next: AtomicU64,
}

impl NonceManager {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            next: AtomicU64::new(seed),
        }
    }

    /// Allocate the next nonce. Never blocks, never fails.
    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    pub fn stats(&self) -> NonceStats {
        NonceStats {
            next: self.next.load(Ordering::SeqCst),
        }
    }
}

impl Default for NonceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NonceStats {
    pub next: u64,
}
