//! Per-round settlement lock.
//!
//! Finalize, reverse, and delete of the same round must not overlap. The
//! lock is a set of rounds with a pass in flight; acquiring a busy round
//! fails fast instead of waiting.

use std::collections::HashSet;

use parking_lot::Mutex;
use sealdraft_types::{AuctionError, Result, RoundId};

#[derive(Default)]
pub struct RoundLock {
    in_flight: Mutex<HashSet<RoundId>>,
}

impl RoundLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `round_id` until the returned guard drops.
    ///
    /// # Errors
    /// [`AuctionError::SettlementInProgress`] if another pass holds it.
    pub fn acquire(&self, round_id: RoundId) -> Result<RoundLockGuard<'_>> {
        if !self.in_flight.lock().insert(round_id) {
            return Err(AuctionError::SettlementInProgress(round_id));
        }
        Ok(RoundLockGuard {
            lock: self,
            round_id,
        })
    }

    #[must_use]
    pub fn is_held(&self, round_id: RoundId) -> bool {
        self.in_flight.lock().contains(&round_id)
    }
}

/// Releases the round on drop.
pub struct RoundLockGuard<'a> {
    lock: &'a RoundLock,
    round_id: RoundId,
}

impl RoundLockGuard<'_> {
    #[must_use]
    pub fn round_id(&self) -> RoundId {
        self.round_id
    }
}

impl Drop for RoundLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.in_flight.lock().remove(&self.round_id);
    }
}
