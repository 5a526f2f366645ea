//! Settlement intents: the persisted saga record for one bid.
//!
//! An intent is written before settlement touches the player registry or
//! the budget store. Its step flags record which effects already landed, so
//! a re-driven pass only repeats what is missing.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use sealdraft_types::{
    Bid, BidId, IntentId, PlayerId, RoundId, SeasonId, TeamId, TeamPlayer,
};
use serde::{Deserialize, Serialize};

/// Direction of a settlement intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Finalize,
    Reverse,
}

impl IntentKind {
    fn direction(self) -> &'static str {
        match self {
            Self::Finalize => "finalize",
            Self::Reverse => "reverse",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.direction())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementIntent {
    pub id: IntentId,
    pub kind: IntentKind,
    pub bid_id: BidId,
    pub round_id: RoundId,
    pub team_id: TeamId,
    pub season_id: SeasonId,
    pub player_id: PlayerId,
    pub position: Option<String>,
    pub amount: Decimal,
    /// Finalize: allocation created. Reverse: allocation deleted.
    pub allocation_done: bool,
    /// Finalize: player marked sold. Reverse: player reset.
    pub player_done: bool,
    /// Finalize: budget debited. Reverse: budget refunded.
    pub budget_done: bool,
    /// Whether the team's record listed `position` before the debit.
    /// Read once, before the first debit attempt.
    #[serde(default)]
    pub position_listed: Option<bool>,
    pub status: IntentStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SettlementIntent {
    #[must_use]
    pub fn new(
        kind: IntentKind,
        bid: &Bid,
        season_id: SeasonId,
        position: Option<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            id: Self::id_for(kind, bid.id),
            kind,
            bid_id: bid.id,
            round_id: bid.round_id,
            team_id: bid.team_id,
            season_id,
            player_id: bid.player_id,
            position,
            amount,
            allocation_done: false,
            player_done: false,
            budget_done: false,
            position_listed: None,
            status: IntentStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// The deterministic intent id for `bid` in direction `kind`.
    #[must_use]
    pub fn id_for(kind: IntentKind, bid_id: BidId) -> IntentId {
        IntentId::deterministic(bid_id, kind.direction())
    }

    /// The roster entry this intent creates or removes.
    #[must_use]
    pub fn allocation(&self) -> TeamPlayer {
        TeamPlayer {
            team_id: self.team_id,
            player_id: self.player_id,
            season_id: self.season_id,
            round_id: self.round_id,
            purchase_price: self.amount,
            acquired_at: self.created_at,
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status == IntentStatus::Done
    }

    #[must_use]
    pub fn all_steps_done(&self) -> bool {
        self.allocation_done && self.player_done && self.budget_done
    }
}

/// In-process intent store.
#[derive(Default)]
pub struct IntentStore {
    inner: RwLock<HashMap<IntentId, SettlementIntent>>,
}

impl IntentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `intent` unless one with the same id exists. Returns the stored
    /// record either way.
    pub fn put_if_absent(&self, intent: SettlementIntent) -> SettlementIntent {
        self.inner
            .write()
            .entry(intent.id)
            .or_insert(intent)
            .clone()
    }

    #[must_use]
    pub fn get(&self, id: IntentId) -> Option<SettlementIntent> {
        self.inner.read().get(&id).cloned()
    }

    pub fn update(&self, intent: &SettlementIntent) {
        self.inner.write().insert(intent.id, intent.clone());
    }

    /// Intents not yet done, oldest first.
    #[must_use]
    pub fn incomplete(&self) -> Vec<SettlementIntent> {
        let mut out: Vec<SettlementIntent> = self
            .inner
            .read()
            .values()
            .filter(|i| !i.is_done())
            .cloned()
            .collect();
        out.sort_by_key(|i| (i.created_at, i.id));
        out
    }

    #[must_use]
    pub fn for_round(&self, round_id: RoundId, kind: IntentKind) -> Vec<SettlementIntent> {
        let mut out: Vec<SettlementIntent> = self
            .inner
            .read()
            .values()
            .filter(|i| i.round_id == round_id && i.kind == kind)
            .cloned()
            .collect();
        out.sort_by_key(|i| i.bid_id);
        out
    }

    /// Drop every intent of a round, both directions. Returns how many.
    pub fn remove_round(&self, round_id: RoundId) -> usize {
        let mut inner = self.inner.write();
        let before = inner.len();
        inner.retain(|_, i| i.round_id != round_id);
        before - inner.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealdraft_types::{BidStatus, SealedBid};

    fn bid() -> Bid {
        Bid {
            id: BidId::new(),
            round_id: RoundId::new(),
            team_id: TeamId::new(),
            player_id: PlayerId::new(),
            sealed: SealedBid::from_bytes(vec![0; 4]),
            status: BidStatus::Won,
            won_amount: Some(Decimal::new(75, 0)),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn ids_are_deterministic_per_direction() {
        let b = bid();
        let fin = SettlementIntent::id_for(IntentKind::Finalize, b.id);
        assert_eq!(fin, SettlementIntent::id_for(IntentKind::Finalize, b.id));
        assert_ne!(fin, SettlementIntent::id_for(IntentKind::Reverse, b.id));
    }

    #[test]
    fn put_if_absent_reuses_existing() {
        let store = IntentStore::new();
        let b = bid();
        let season = SeasonId::new();
        let mut first = store.put_if_absent(SettlementIntent::new(
            IntentKind::Finalize,
            &b,
            season,
            None,
            Decimal::new(75, 0),
        ));
        first.allocation_done = true;
        store.update(&first);

        let again = store.put_if_absent(SettlementIntent::new(
            IntentKind::Finalize,
            &b,
            season,
            None,
            Decimal::new(75, 0),
        ));
        assert!(again.allocation_done);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn incomplete_excludes_done() {
        let store = IntentStore::new();
        let season = SeasonId::new();
        let mut done = SettlementIntent::new(IntentKind::Finalize, &bid(), season, None, Decimal::ONE);
        done.status = IntentStatus::Done;
        store.update(&done);
        let open = store.put_if_absent(SettlementIntent::new(
            IntentKind::Reverse,
            &bid(),
            season,
            None,
            Decimal::ONE,
        ));
        let incomplete = store.incomplete();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].id, open.id);
    }

    #[test]
    fn remove_round_keeps_other_rounds() {
        let store = IntentStore::new();
        let season = SeasonId::new();
        let b = bid();
        store.put_if_absent(SettlementIntent::new(IntentKind::Finalize, &b, season, None, Decimal::ONE));
        store.put_if_absent(SettlementIntent::new(IntentKind::Reverse, &b, season, None, Decimal::ONE));
        let other = store.put_if_absent(SettlementIntent::new(
            IntentKind::Finalize,
            &bid(),
            season,
            None,
            Decimal::ONE,
        ));

        assert_eq!(store.remove_round(b.round_id), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get(other.id).is_some());
        assert_eq!(store.remove_round(b.round_id), 0);
    }
}
