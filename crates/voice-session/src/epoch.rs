use std::sync::atomic::{AtomicU64, Ordering};

/// Monotone operation counter (§4.1, §9). `start()`/`stop()` bump it; any
/// long-running step captures the value at the moment it began and must
/// re-check before mutating shared state, the same re-check-at-every-
/// resumption-point discipline `turn_listener.rs` applies via its
/// `CancellationToken`, expressed here as a plain integer comparison.
#[derive(Default)]
pub struct Epoch(AtomicU64);

impl Epoch {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Bumps the epoch, invalidating every operation still holding an older
    /// value, and returns the new value.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, captured: u64) -> bool {
        self.current() == captured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_invalidates_previously_captured_epoch() {
        let epoch = Epoch::new();
        let captured = epoch.current();
        assert!(epoch.is_current(captured));
        epoch.advance();
        assert!(!epoch.is_current(captured));
    }
}
