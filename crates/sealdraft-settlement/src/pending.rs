//! Pending allocations for manual finalization.
//!
//! A preview computes the allocations finalization would make and parks
//! them here. An admin then fetches them, applies them (which runs the
//! normal finalize saga) or discards them. While a round has pending
//! allocations, plain finalization is refused.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use sealdraft_types::{AuctionError, BidId, PlayerId, Result, RoundId, TeamId};
use serde::Serialize;

/// One won bid as finalization would settle it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAllocation {
    pub bid_id: BidId,
    pub round_id: RoundId,
    pub team_id: TeamId,
    pub player_id: PlayerId,
    pub position: Option<String>,
    pub amount: Decimal,
}

/// The parked allocations of one round plus their totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementPreview {
    pub round_id: RoundId,
    pub allocations: Vec<PendingAllocation>,
    pub per_team: BTreeMap<TeamId, Decimal>,
    pub total_players: usize,
    pub total_spent: Decimal,
    pub average_bid: Decimal,
    pub created_at: DateTime<Utc>,
}

impl SettlementPreview {
    #[must_use]
    pub fn new(round_id: RoundId, mut allocations: Vec<PendingAllocation>) -> Self {
        allocations.sort_by_key(|a| a.bid_id);
        let mut per_team: BTreeMap<TeamId, Decimal> = BTreeMap::new();
        for a in &allocations {
            *per_team.entry(a.team_id).or_default() += a.amount;
        }
        let total_spent: Decimal = allocations.iter().map(|a| a.amount).sum();
        let average_bid = if allocations.is_empty() {
            Decimal::ZERO
        } else {
            (total_spent / Decimal::from(allocations.len())).round_dp(2)
        };
        Self {
            round_id,
            total_players: allocations.len(),
            allocations,
            per_team,
            total_spent,
            average_bid,
            created_at: Utc::now(),
        }
    }

    /// Whether `bids` (bid, team, amount) are exactly the previewed set.
    #[must_use]
    pub fn matches(&self, bids: &[(BidId, TeamId, Decimal)]) -> bool {
        let mut current = bids.to_vec();
        current.sort_by_key(|(bid, _, _)| *bid);
        current.len() == self.allocations.len()
            && current
                .iter()
                .zip(&self.allocations)
                .all(|((bid, team, amount), a)| {
                    *bid == a.bid_id && *team == a.team_id && *amount == a.amount
                })
    }
}

/// Previews keyed by round. At most one per round.
#[derive(Default)]
pub struct PendingAllocations {
    inner: RwLock<HashMap<RoundId, SettlementPreview>>,
}

impl PendingAllocations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a preview.
    ///
    /// # Errors
    /// [`AuctionError::PendingAllocationsExist`] if the round already has one.
    pub fn insert(&self, preview: SettlementPreview) -> Result<SettlementPreview> {
        let mut inner = self.inner.write();
        if inner.contains_key(&preview.round_id) {
            return Err(AuctionError::PendingAllocationsExist(preview.round_id));
        }
        inner.insert(preview.round_id, preview.clone());
        Ok(preview)
    }

    /// # Errors
    /// [`AuctionError::NoPendingAllocations`] if the round has none.
    pub fn get(&self, round_id: RoundId) -> Result<SettlementPreview> {
        self.inner
            .read()
            .get(&round_id)
            .cloned()
            .ok_or(AuctionError::NoPendingAllocations(round_id))
    }

    #[must_use]
    pub fn contains(&self, round_id: RoundId) -> bool {
        self.inner.read().contains_key(&round_id)
    }

    /// Drop a round's preview, returning it if there was one.
    pub fn remove(&self, round_id: RoundId) -> Option<SettlementPreview> {
        self.inner.write().remove(&round_id)
    }
}
