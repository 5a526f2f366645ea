//! Team budget record types.
//!
//! The budget record lives in an external store; settlement is the only
//! writer. Every mutation is expressed as a [`BudgetAdjustment`] carrying an
//! idempotency key, so a retried settlement step never debits twice.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{SeasonId, TeamId};

/// A team's spending record for one season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamBudget {
    pub team_id: TeamId,
    pub season_id: SeasonId,
    pub team_name: String,
    /// Remaining spendable budget.
    pub budget: Decimal,
    pub total_spent: Decimal,
    pub players_count: u32,
    /// Players held per position, e.g. `{"DEF": 2, "MID": 1}`.
    #[serde(default)]
    pub position_counts: BTreeMap<String, u32>,
}

impl TeamBudget {
    /// Open a fresh record with `budget` to spend.
    #[must_use]
    pub fn new(
        team_id: TeamId,
        season_id: SeasonId,
        team_name: impl Into<String>,
        budget: Decimal,
    ) -> Self {
        Self {
            team_id,
            season_id,
            team_name: team_name.into(),
            budget,
            total_spent: Decimal::ZERO,
            players_count: 0,
            position_counts: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn can_afford(&self, amount: Decimal) -> bool {
        self.budget >= amount
    }

    #[must_use]
    pub fn position_count(&self, position: &str) -> u32 {
        self.position_counts.get(position).copied().unwrap_or(0)
    }
}

/// A change to a [`TeamBudget`].
///
/// `spend` is positive for a debit and negative for a refund. Count deltas
/// are floored at zero when applied. A position key that reaches zero stays
/// in the map unless `drop_empty_position` is set, which a refund uses to
/// remove a key its debit created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetAdjustment {
    /// Applying the same key twice is a no-op.
    pub idempotency_key: String,
    pub spend: Decimal,
    pub players_delta: i32,
    pub position: Option<String>,
    pub position_delta: i32,
    #[serde(default)]
    pub drop_empty_position: bool,
}

impl BudgetAdjustment {
    /// Debit for one acquired player.
    #[must_use]
    pub fn debit(key: impl Into<String>, amount: Decimal, position: Option<String>) -> Self {
        Self {
            idempotency_key: key.into(),
            spend: amount,
            players_delta: 1,
            position_delta: i32::from(position.is_some()),
            position,
            drop_empty_position: false,
        }
    }

    /// Refund for one released player.
    #[must_use]
    pub fn refund(key: impl Into<String>, amount: Decimal, position: Option<String>) -> Self {
        Self {
            idempotency_key: key.into(),
            spend: -amount,
            players_delta: -1,
            position_delta: -i32::from(position.is_some()),
            position,
            drop_empty_position: false,
        }
    }

    /// Remove the position key if this adjustment brings it to zero.
    #[must_use]
    pub fn dropping_empty_position(mut self) -> Self {
        self.drop_empty_position = true;
        self
    }

    /// Apply to `budget` in place.
    pub fn apply_to(&self, budget: &mut TeamBudget) {
        budget.budget -= self.spend;
        budget.total_spent += self.spend;
        budget.players_count = apply_delta(budget.players_count, self.players_delta);
        if let Some(position) = &self.position {
            let count = apply_delta(budget.position_count(position), self.position_delta);
            if count == 0 && self.drop_empty_position {
                budget.position_counts.remove(position);
            } else {
                budget.position_counts.insert(position.clone(), count);
            }
        }
    }
}

fn apply_delta(count: u32, delta: i32) -> u32 {
    if delta >= 0 {
        count.saturating_add(delta.unsigned_abs())
    } else {
        count.saturating_sub(delta.unsigned_abs())
    }
}
