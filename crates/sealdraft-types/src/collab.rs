//! Interfaces to the collaborators the auction engine consumes but does not
//! own: the team budget store, the player registry, the broadcast channel,
//! and the bid codec.
//!
//! All collaborators are shared across request handlers through `Arc`, so
//! every trait requires `Send + Sync`.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::{
    BidPayload, BudgetAdjustment, PlayerId, PlayerRecord, RoundEvent, SealContext, SealedBid,
    SeasonId, TeamBudget, TeamId, TeamPlayer,
};

/// External store of per-season team budget records.
pub trait BudgetStore: Send + Sync {
    fn get_budget(&self, team_id: TeamId, season_id: SeasonId) -> Result<TeamBudget>;

    /// Apply `adjustment` and return the updated record.
    ///
    /// Implementations must treat a repeated `idempotency_key` as a no-op and
    /// return the current record unchanged.
    fn adjust_budget(
        &self,
        team_id: TeamId,
        season_id: SeasonId,
        adjustment: &BudgetAdjustment,
    ) -> Result<TeamBudget>;

    /// Settlement reads these before a debit to learn whether the position
    /// was already listed, so the matching refund can restore the record.
    fn get_position_counts(&self, team_id: TeamId, season_id: SeasonId)
    -> Result<BTreeMap<String, u32>>;

    /// Replace the counts wholesale. The engine never calls this; it exists
    /// for admin tooling that seeds or repairs squad composition.
    fn set_position_counts(
        &self,
        team_id: TeamId,
        season_id: SeasonId,
        counts: BTreeMap<String, u32>,
    ) -> Result<()>;
}

/// Roster allocations and player sale fields.
pub trait PlayerRegistry: Send + Sync {
    /// Insert the allocation; inserting the same (team, player) twice is a
    /// no-op.
    fn insert_allocation(&self, allocation: &TeamPlayer) -> Result<()>;

    /// Remove the allocation. Returns `false` when none existed.
    fn delete_allocation(&self, team_id: TeamId, player_id: PlayerId) -> Result<bool>;

    fn mark_sold(&self, allocation: &TeamPlayer) -> Result<()>;

    fn reset_player(&self, player_id: PlayerId) -> Result<()>;

    fn player(&self, player_id: PlayerId) -> Result<Option<PlayerRecord>>;
}

/// Real-time broadcast channel. Publishing is best effort.
pub trait Notifier: Send + Sync {
    fn publish(&self, topic: &str, event: &RoundEvent);
}

/// Seals bid payloads at rest.
pub trait BidCodec: Send + Sync {
    fn seal(&self, context: &SealContext, payload: &BidPayload) -> Result<SealedBid>;

    fn unseal(&self, context: &SealContext, sealed: &SealedBid) -> Result<BidPayload>;
}

/// A notifier that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn publish(&self, _topic: &str, _event: &RoundEvent) {}
}
