use std::sync::atomic::{AtomicI32, Ordering};

use rand::Rng;

/// Generates strictly positive 31-bit request IDs.
///
/// Wraps from `i32::MAX` back to `1`, skipping `0` (reserved as
/// "unassigned"). Seeded at a random starting value so that independent
/// counters in the same process — one per client, one per server handler —
/// don't produce identical ID sequences in interleaved logs.
pub struct RequestIdCounter {
    next: AtomicI32,
}

impl RequestIdCounter {
    /// A counter seeded at a random positive value.
    pub fn new() -> Self {
        let seed = rand::thread_rng().gen_range(1..=i32::MAX);
        Self {
            next: AtomicI32::new(seed),
        }
    }

    /// A counter seeded at a specific value, for deterministic tests.
    /// `seed` must be in `1..=i32::MAX`.
    pub fn with_seed(seed: i32) -> Self {
        assert!(seed > 0, "request-ID seed must be strictly positive");
        Self {
            next: AtomicI32::new(seed),
        }
    }

    /// Returns the next ID, advancing the counter. Lock-free.
    pub fn next_id(&self) -> i32 {
        loop {
            let current = self.next.load(Ordering::Relaxed);
            let advanced = if current == i32::MAX { 1 } else { current + 1 };
            if self
                .next
                .compare_exchange_weak(current, advanced, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return current;
            }
        }
    }
}

impl Default for RequestIdCounter {
    fn default() -> Self {
        Self::new()
    }
}
