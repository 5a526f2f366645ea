//! Spend conservation for reversals.
//!
//! Invariant checked after every reversal pass:
//! ```text
//! ∀ team in round: Σ(debits) - Σ(refunds) == 0
//! ```
//!
//! A non-zero balance means a reversal refunded more or less than the
//! finalization debited.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use sealdraft_types::{AuctionError, Result, RoundId, TeamId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Flow {
    debited: Decimal,
    refunded: Decimal,
}

/// Net settlement spend per (round, team).
#[derive(Default)]
pub struct SpendTracker {
    flows: Mutex<BTreeMap<(RoundId, TeamId), Flow>>,
}

impl SpendTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_debit(&self, round_id: RoundId, team_id: TeamId, amount: Decimal) {
        self.flows.lock().entry((round_id, team_id)).or_default().debited += amount;
    }

    pub fn record_refund(&self, round_id: RoundId, team_id: TeamId, amount: Decimal) {
        self.flows.lock().entry((round_id, team_id)).or_default().refunded += amount;
    }

    /// Debits minus refunds for one team in one round.
    #[must_use]
    pub fn net_spend(&self, round_id: RoundId, team_id: TeamId) -> Decimal {
        self.flows
            .lock()
            .get(&(round_id, team_id))
            .map_or(Decimal::ZERO, |f| f.debited - f.refunded)
    }

    /// Net spend of every team that settled in `round_id`.
    #[must_use]
    pub fn per_team(&self, round_id: RoundId) -> BTreeMap<TeamId, Decimal> {
        self.flows
            .lock()
            .iter()
            .filter(|((round, _), _)| *round == round_id)
            .map(|((_, team), f)| (*team, f.debited - f.refunded))
            .collect()
    }

    /// Verify every team's net spend for `round_id` is back to zero.
    ///
    /// # Errors
    /// [`AuctionError::SpendInvariantViolation`] naming the first team that
    /// does not balance.
    pub fn verify_zero(&self, round_id: RoundId) -> Result<()> {
        let flows = self.flows.lock();
        let unbalanced = flows
            .iter()
            .find(|((round, _), f)| *round == round_id && f.debited != f.refunded);
        if let Some(((_, team), f)) = unbalanced {
            return Err(AuctionError::SpendInvariantViolation {
                reason: format!(
                    "round {round_id}, {team}: debited {} but refunded {}",
                    f.debited, f.refunded
                ),
            });
        }
        Ok(())
    }

    /// Drop the round's records once it is gone.
    pub fn forget_round(&self, round_id: RoundId) {
        self.flows.lock().retain(|(round, _), _| *round != round_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_round_balances() {
        let tracker = SpendTracker::new();
        assert!(tracker.verify_zero(RoundId::new()).is_ok());
    }

    #[test]
    fn debit_then_refund_balances() {
        let tracker = SpendTracker::new();
        let (round, team) = (RoundId::new(), TeamId::new());
        tracker.record_debit(round, team, Decimal::new(120, 0));
        assert_eq!(tracker.net_spend(round, team), Decimal::new(120, 0));
        assert!(tracker.verify_zero(round).is_err());

        tracker.record_refund(round, team, Decimal::new(120, 0));
        assert_eq!(tracker.net_spend(round, team), Decimal::ZERO);
        assert!(tracker.verify_zero(round).is_ok());
    }

    #[test]
    fn partial_refund_is_a_violation() {
        let tracker = SpendTracker::new();
        let (round, team) = (RoundId::new(), TeamId::new());
        tracker.record_debit(round, team, Decimal::new(50, 0));
        tracker.record_refund(round, team, Decimal::new(40, 0));
        let err = tracker.verify_zero(round).unwrap_err();
        assert!(matches!(err, AuctionError::SpendInvariantViolation { .. }));
    }

    #[test]
    fn rounds_are_independent() {
        let tracker = SpendTracker::new();
        let team = TeamId::new();
        let (a, b) = (RoundId::new(), RoundId::new());
        tracker.record_debit(a, team, Decimal::new(10, 0));
        assert!(tracker.verify_zero(b).is_ok());
        assert_eq!(tracker.per_team(a).get(&team), Some(&Decimal::new(10, 0)));

        tracker.forget_round(a);
        assert!(tracker.verify_zero(a).is_ok());
    }
}
