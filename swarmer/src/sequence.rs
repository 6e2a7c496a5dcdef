use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared monotonically increasing counter.
///
/// Clones observe the same counter, so a sequence handed to a user class is
/// shared by every user of that class. Useful for round-robin assignment of
/// test accounts.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    next: Arc<AtomicU64>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Next position in a ring of `len` items. Returns 0 for an empty ring.
    pub fn next_index(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        (self.next() % len as u64) as usize
    }
}
