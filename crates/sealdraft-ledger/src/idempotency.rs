//! Applied-key guard for budget adjustments.
//!
//! Each settlement step carries a deterministic key. The guard remembers the
//! keys already applied so that a re-driven step becomes a no-op. Memory is
//! bounded: once `max_size` keys are held, the oldest is evicted.

use std::collections::{HashSet, VecDeque};

/// Bounded set of applied idempotency keys with oldest-first eviction.
pub struct IdempotencyGuard {
    applied: HashSet<String>,
    /// Insertion order (front = oldest).
    order: VecDeque<String>,
    max_size: usize,
}

impl IdempotencyGuard {
    /// # Panics
    /// Panics if `max_size` is zero.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "IdempotencyGuard max_size must be > 0");
        Self {
            applied: HashSet::new(),
            order: VecDeque::new(),
            max_size,
        }
    }

    /// Record `key`. Returns `false` if it was already applied.
    pub fn mark_applied(&mut self, key: &str) -> bool {
        if self.applied.contains(key) {
            return false;
        }
        if self.applied.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.applied.remove(&oldest);
            }
        }
        self.applied.insert(key.to_string());
        self.order.push_back(key.to_string());
        true
    }

    #[must_use]
    pub fn is_applied(&self, key: &str) -> bool {
        self.applied.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}
