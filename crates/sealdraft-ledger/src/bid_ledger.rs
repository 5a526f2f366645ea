//! The bid ledger: sealed bid placement, cancellation, and status updates.
//!
//! ## Placement Flow
//!
//! ```text
//! place_bid → round checks → budget check → seal
//!           → [admission gate (round), shared] re-check round open
//!           → [slot lock (round, team)] duplicate + cap check → insert
//! ```
//!
//! The count-then-insert runs under a lock keyed by (round, team), so two
//! teams bidding in the same round never wait on each other. Collaborator
//! calls (budget store, codec) happen before either lock is taken; the round
//! is checked again once the admission gate is held, since bidding may have
//! closed in the meantime.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use sealdraft_types::{
    AuctionError, Bid, BidCodec, BidId, BidPayload, BidStatus, BudgetStore, OpenBid,
    PlayerBidStats, PlayerId, Result, Round, RoundId, RoundStatus, RoundType, SealContext,
    SealedBid, TeamId,
};

use crate::round_store::RoundStore;
use crate::stats::{self, StatsCache};

#[derive(Default)]
struct BidTables {
    bids: HashMap<BidId, Bid>,
    by_round: HashMap<RoundId, Vec<BidId>>,
    /// Bumped on every insert, removal, or status change in a round.
    revisions: HashMap<RoundId, u64>,
}

impl BidTables {
    fn bump(&mut self, round_id: RoundId) {
        *self.revisions.entry(round_id).or_insert(0) += 1;
    }

    fn round_bids(&self, round_id: RoundId) -> impl Iterator<Item = &Bid> {
        self.by_round
            .get(&round_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.bids.get(id))
    }
}

/// Bids of a round after unsealing. Bids that fail to open are reported
/// separately instead of failing the whole pass.
#[derive(Debug, Default)]
pub struct UnsealedBids {
    pub open: Vec<OpenBid>,
    pub failed: Vec<(BidId, AuctionError)>,
}

/// Thread-safe ledger of sealed bids.
pub struct BidLedger {
    rounds: Arc<RoundStore>,
    codec: Arc<dyn BidCodec>,
    budgets: Arc<dyn BudgetStore>,
    inner: RwLock<BidTables>,
    slots: Mutex<HashMap<(RoundId, TeamId), Arc<Mutex<()>>>>,
    stats: StatsCache,
}

impl BidLedger {
    #[must_use]
    pub fn new(
        rounds: Arc<RoundStore>,
        codec: Arc<dyn BidCodec>,
        budgets: Arc<dyn BudgetStore>,
    ) -> Self {
        Self {
            rounds,
            codec,
            budgets,
            inner: RwLock::new(BidTables::default()),
            slots: Mutex::new(HashMap::new()),
            stats: StatsCache::new(),
        }
    }

    #[must_use]
    pub fn codec(&self) -> &Arc<dyn BidCodec> {
        &self.codec
    }

    /// Place a sealed bid.
    ///
    /// # Errors
    /// - [`AuctionError::RoundNotActive`] / [`AuctionError::BiddingClosed`]
    /// - [`AuctionError::InvalidBid`] for a non-positive amount, an amount
    ///   under the base price, or a bulk-round bid off the listed players or
    ///   off the flat price
    /// - [`AuctionError::DuplicateBid`] / [`AuctionError::BidLimitExceeded`]
    /// - [`AuctionError::InsufficientBudget`]
    pub fn place_bid(
        &self,
        round_id: RoundId,
        team_id: TeamId,
        player_id: PlayerId,
        amount: Decimal,
    ) -> Result<Bid> {
        let round = self.rounds.get(round_id)?;
        ensure_open(&round, Utc::now())?;

        if amount <= Decimal::ZERO {
            return Err(AuctionError::InvalidBid {
                reason: "amount must be positive".into(),
            });
        }
        if amount < round.base_price {
            return Err(AuctionError::InvalidBid {
                reason: format!("amount {amount} is below base price {}", round.base_price),
            });
        }
        if round.round_type == RoundType::Bulk {
            if !self.rounds.is_listed(round_id, player_id) {
                return Err(AuctionError::InvalidBid {
                    reason: format!("{player_id} is not listed in this round"),
                });
            }
            if amount != round.base_price {
                return Err(AuctionError::InvalidBid {
                    reason: format!("bulk rounds bid exactly {}", round.base_price),
                });
            }
        }

        let budget = self.budgets.get_budget(team_id, round.season_id)?;
        if !budget.can_afford(amount) {
            return Err(AuctionError::InsufficientBudget {
                needed: amount,
                available: budget.budget,
            });
        }

        let context = SealContext::new(round_id, team_id);
        let sealed = self.codec.seal(&context, &BidPayload { player_id, amount })?;

        let bid = self.rounds.with_admission(round_id, |current| {
            let now = Utc::now();
            ensure_open(current, now)?;
            self.insert_pending(current, team_id, player_id, sealed, now)
        })?;

        tracing::info!(round = %round_id, team = %team_id, player = %player_id, bid = %bid.id, "bid placed");
        Ok(bid)
    }

    /// Duplicate and cap checks plus the insert, under the (round, team) slot.
    fn insert_pending(
        &self,
        round: &Round,
        team_id: TeamId,
        player_id: PlayerId,
        sealed: SealedBid,
        now: DateTime<Utc>,
    ) -> Result<Bid> {
        let round_id = round.id;
        let slot = self.slot(round_id, team_id);
        let _slot_guard = slot.lock();

        let (duplicate, pending) = {
            let tables = self.inner.read();
            let mine: Vec<&Bid> = tables
                .round_bids(round_id)
                .filter(|b| b.team_id == team_id)
                .collect();
            (
                mine.iter().any(|b| b.player_id == player_id),
                mine.iter().filter(|b| b.status == BidStatus::Pending).count(),
            )
        };
        if duplicate {
            return Err(AuctionError::DuplicateBid { player: player_id });
        }
        if pending >= round.max_bids_per_team as usize {
            return Err(AuctionError::BidLimitExceeded {
                max: round.max_bids_per_team,
            });
        }

        let bid = Bid {
            id: BidId::new(),
            round_id,
            team_id,
            player_id,
            sealed,
            status: BidStatus::Pending,
            won_amount: None,
            created_at: now,
            updated_at: now,
        };
        {
            let mut tables = self.inner.write();
            tables.bids.insert(bid.id, bid.clone());
            tables.by_round.entry(round_id).or_default().push(bid.id);
            tables.bump(round_id);
        }
        Ok(bid)
    }

    /// Cancel a pending bid on behalf of its owner.
    ///
    /// Refused once the round is completed, for settled bids, and for bids
    /// still pending after bidding closed (those are party to a tiebreaker).
    pub fn cancel_bid(&self, bid_id: BidId, team_id: TeamId) -> Result<Bid> {
        let bid = self.get(bid_id)?;
        if bid.team_id != team_id {
            return Err(AuctionError::BidNotCancellable {
                reason: "bid belongs to another team".into(),
            });
        }
        if bid.status != BidStatus::Pending {
            return Err(AuctionError::BidNotCancellable {
                reason: format!("bid is {}", bid.status),
            });
        }

        let removed = self
            .rounds
            .with_admission(bid.round_id, |round| self.remove_pending(round, bid_id, team_id))?;

        tracing::info!(round = %removed.round_id, team = %team_id, bid = %bid_id, "bid cancelled");
        Ok(removed)
    }

    fn remove_pending(&self, round: &Round, bid_id: BidId, team_id: TeamId) -> Result<Bid> {
        if round.status == RoundStatus::Completed {
            return Err(AuctionError::BidNotCancellable {
                reason: "round is completed".into(),
            });
        }
        if round.bidding_closed {
            return Err(AuctionError::BidNotCancellable {
                reason: "bid is party to an open tiebreaker".into(),
            });
        }

        let slot = self.slot(round.id, team_id);
        let _slot_guard = slot.lock();
        let removed = {
            let mut tables = self.inner.write();
            match tables.bids.get(&bid_id) {
                Some(b) if b.status == BidStatus::Pending => {}
                Some(b) => {
                    return Err(AuctionError::BidNotCancellable {
                        reason: format!("bid is {}", b.status),
                    });
                }
                None => return Err(AuctionError::BidNotFound(bid_id)),
            }
            let removed = tables
                .bids
                .remove(&bid_id)
                .ok_or(AuctionError::BidNotFound(bid_id))?;
            if let Some(ids) = tables.by_round.get_mut(&removed.round_id) {
                ids.retain(|id| *id != bid_id);
            }
            tables.bump(removed.round_id);
            removed
        };
        Ok(removed)
    }

    pub fn get(&self, bid_id: BidId) -> Result<Bid> {
        self.inner
            .read()
            .bids
            .get(&bid_id)
            .cloned()
            .ok_or(AuctionError::BidNotFound(bid_id))
    }

    /// All bids of a round in placement order.
    #[must_use]
    pub fn bids_for_round(&self, round_id: RoundId) -> Vec<Bid> {
        self.inner.read().round_bids(round_id).cloned().collect()
    }

    /// Unseal every bid of a round.
    #[must_use]
    pub fn open_bids(&self, round_id: RoundId) -> UnsealedBids {
        let mut result = UnsealedBids::default();
        for bid in self.bids_for_round(round_id) {
            match self.unseal(&bid) {
                Ok(amount) => result.open.push(OpenBid { bid, amount }),
                Err(err) => {
                    tracing::warn!(round = %round_id, bid = %bid.id, error = %err, "bid could not be unsealed");
                    result.failed.push((bid.id, err));
                }
            }
        }
        result
    }

    /// Unseal a single bid and return its amount.
    pub fn unseal(&self, bid: &Bid) -> Result<Decimal> {
        let payload = self.codec.unseal(&bid.seal_context(), &bid.sealed)?;
        if payload.player_id != bid.player_id {
            return Err(AuctionError::UnsealFailed(format!(
                "payload names {} but bid is for {}",
                payload.player_id, bid.player_id
            )));
        }
        Ok(payload.amount)
    }

    /// Mark a bid won at `amount`. Re-marking with the same amount is a
    /// no-op.
    pub fn mark_won(&self, bid_id: BidId, amount: Decimal) -> Result<()> {
        self.set_status(bid_id, BidStatus::Won, Some(amount))
    }

    /// Mark a bid lost. Idempotent.
    pub fn mark_lost(&self, bid_id: BidId) -> Result<()> {
        self.set_status(bid_id, BidStatus::Lost, None)
    }

    fn set_status(&self, bid_id: BidId, status: BidStatus, won_amount: Option<Decimal>) -> Result<()> {
        let mut tables = self.inner.write();
        let bid = tables
            .bids
            .get_mut(&bid_id)
            .ok_or(AuctionError::BidNotFound(bid_id))?;
        if bid.status == status && bid.won_amount == won_amount {
            return Ok(());
        }
        if bid.status != BidStatus::Pending {
            return Err(AuctionError::Internal(format!(
                "bid {bid_id} is already {}, cannot mark {status}",
                bid.status
            )));
        }
        bid.status = status;
        bid.won_amount = won_amount;
        bid.updated_at = Utc::now();
        let round_id = bid.round_id;
        tables.bump(round_id);
        tracing::debug!(round = %round_id, bid = %bid_id, status = %status, "bid status set");
        Ok(())
    }

    /// Remove every bid of a round. Returns how many were removed.
    pub fn delete_for_round(&self, round_id: RoundId) -> usize {
        let removed = {
            let mut tables = self.inner.write();
            let ids = tables.by_round.remove(&round_id).unwrap_or_default();
            for id in &ids {
                tables.bids.remove(id);
            }
            tables.revisions.remove(&round_id);
            ids.len()
        };
        self.stats.invalidate(round_id);
        self.slots.lock().retain(|(r, _), _| *r != round_id);
        tracing::debug!(round = %round_id, removed, "bids deleted");
        removed
    }

    /// Pending bids a team holds in a round.
    #[must_use]
    pub fn pending_count(&self, round_id: RoundId, team_id: TeamId) -> usize {
        self.inner
            .read()
            .round_bids(round_id)
            .filter(|b| b.team_id == team_id && b.status == BidStatus::Pending)
            .count()
    }

    /// Current revision of a round's bids.
    #[must_use]
    pub fn revision(&self, round_id: RoundId) -> u64 {
        self.inner
            .read()
            .revisions
            .get(&round_id)
            .copied()
            .unwrap_or(0)
    }

    /// Per-player bid statistics. Cached until the round's bids change.
    pub fn stats_for_round(&self, round_id: RoundId) -> Result<Arc<Vec<PlayerBidStats>>> {
        self.rounds.get(round_id)?;
        let revision = self.revision(round_id);
        if let Some(cached) = self.stats.get(round_id, revision) {
            return Ok(cached);
        }
        let unsealed = self.open_bids(round_id);
        let computed = Arc::new(stats::aggregate(&unsealed.open));
        self.stats.put(round_id, revision, Arc::clone(&computed));
        Ok(computed)
    }

    fn slot(&self, round_id: RoundId, team_id: TeamId) -> Arc<Mutex<()>> {
        Arc::clone(self.slots.lock().entry((round_id, team_id)).or_default())
    }
}

fn ensure_open(round: &Round, now: DateTime<Utc>) -> Result<()> {
    if round.status != RoundStatus::Active {
        return Err(AuctionError::RoundNotActive {
            round_id: round.id,
            status: round.status,
        });
    }
    if !round.accepts_bids_at(now) {
        return Err(AuctionError::BiddingClosed(round.id));
    }
    Ok(())
}
