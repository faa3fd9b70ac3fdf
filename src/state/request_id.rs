use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Cheap per-request ids: a random process seed xor a sequence number.
/// Unique within a process, not unguessable.
pub(crate) struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    pub(crate) fn new() -> Self {
        Self::with_seed((u128::from(fastrand::u64(..)) << 64) | u128::from(fastrand::u64(..)))
    }

    fn with_seed(seed: u128) -> Self {
        Self {
            seed,
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_id(&self) -> Uuid {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        Uuid::from_u128(self.seed ^ u128::from(seq))
    }
}
