//! Finalize and reverse sagas.
//!
//! Finalization turns every won bid into three effects on two external
//! stores: a roster allocation and a player sale in the player registry,
//! and a debit in the budget store. There is no transaction spanning both,
//! so each bid is driven through a [`SettlementIntent`]:
//!
//! 1. Persist the intent (deterministic id, reused when it exists)
//! 2. Create the allocation
//! 3. Mark the player sold
//! 4. Debit the budget, keyed by the intent id
//!
//! Each step is flagged on the intent as it lands. A failure stops that bid
//! only; the pass continues, the round stays active, and a later `finalize`
//! or [`Settler::recover`] repeats just the missing steps. Reversal runs the
//! same shape backwards, compensating only the steps finalization recorded.
//!
//! Manual finalization splits the pass in two: [`Settler::preview`] parks
//! the would-be allocations without touching either store, and
//! [`Settler::apply_pending`] checks budgets up front and then runs the
//! normal saga.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use sealdraft_ledger::{BidLedger, RoundStore};
use sealdraft_tiebreak::TiebreakEngine;
use sealdraft_types::{
    AuctionError, Bid, BidId, BidStatus, BudgetAdjustment, BudgetStore, PlayerId, PlayerRegistry,
    Result, Round, RoundId, RoundStatus, RoundType, TeamId,
};
use serde::Serialize;

use crate::intent::{IntentKind, IntentStatus, IntentStore, SettlementIntent};
use crate::pending::{PendingAllocation, PendingAllocations, SettlementPreview};
use crate::round_lock::{RoundLock, RoundLockGuard};
use crate::spend_tracker::SpendTracker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBid {
    pub bid_id: BidId,
    pub reason: String,
}

/// Outcome of one settlement pass over a round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementReport {
    pub round_id: RoundId,
    pub kind: IntentKind,
    pub settled: Vec<BidId>,
    pub failed: Vec<FailedBid>,
    /// Amount debited (finalize) or refunded (reverse) per team.
    pub per_team: BTreeMap<TeamId, Decimal>,
    /// Finalize: the round moved to `completed`. Reverse: every bid was
    /// compensated and spend balanced.
    pub completed: bool,
}

impl SettlementReport {
    fn new(round_id: RoundId, kind: IntentKind) -> Self {
        Self {
            round_id,
            kind,
            settled: Vec::new(),
            failed: Vec::new(),
            per_team: BTreeMap::new(),
            completed: false,
        }
    }

    fn record_settled(&mut self, intent: &SettlementIntent) {
        self.settled.push(intent.bid_id);
        *self.per_team.entry(intent.team_id).or_default() += intent.amount;
    }

    fn record_failed(&mut self, bid_id: BidId, err: &AuctionError) {
        self.failed.push(FailedBid {
            bid_id,
            reason: err.to_string(),
        });
    }

    #[must_use]
    pub fn total(&self) -> Decimal {
        self.per_team.values().copied().sum()
    }
}

pub struct Settler {
    rounds: Arc<RoundStore>,
    ledger: Arc<BidLedger>,
    engine: Arc<TiebreakEngine>,
    budgets: Arc<dyn BudgetStore>,
    players: Arc<dyn PlayerRegistry>,
    intents: IntentStore,
    pending: PendingAllocations,
    lock: RoundLock,
    spend: SpendTracker,
}

impl Settler {
    #[must_use]
    pub fn new(
        rounds: Arc<RoundStore>,
        ledger: Arc<BidLedger>,
        engine: Arc<TiebreakEngine>,
        budgets: Arc<dyn BudgetStore>,
        players: Arc<dyn PlayerRegistry>,
    ) -> Self {
        Self {
            rounds,
            ledger,
            engine,
            budgets,
            players,
            intents: IntentStore::new(),
            pending: PendingAllocations::new(),
            lock: RoundLock::new(),
            spend: SpendTracker::new(),
        }
    }

    #[must_use]
    pub fn intents(&self) -> &IntentStore {
        &self.intents
    }

    #[must_use]
    pub fn spend(&self) -> &SpendTracker {
        &self.spend
    }

    /// Claim the settlement lock for a round. Held across reverse + delete
    /// by the service.
    pub fn lock_round(&self, round_id: RoundId) -> Result<RoundLockGuard<'_>> {
        self.lock.acquire(round_id)
    }

    // ----------------------------------------------------------------
    // Finalize
    // ----------------------------------------------------------------

    /// Settle every won bid of an active round and complete it.
    ///
    /// # Errors
    /// - [`AuctionError::SettlementInProgress`] if another pass holds the round
    /// - [`AuctionError::RoundAlreadyFinalized`] for a completed round
    /// - [`AuctionError::RoundNotActive`] for a draft or scheduled round
    /// - [`AuctionError::UnresolvedTiebreakers`] while any tiebreaker is open
    /// - [`AuctionError::PendingAllocationsExist`] while a preview is parked
    ///
    /// Per-bid failures do not error; they are listed in the report and the
    /// round stays active.
    pub fn finalize(&self, round_id: RoundId) -> Result<SettlementReport> {
        let guard = self.lock.acquire(round_id)?;
        if self.pending.contains(round_id) {
            return Err(AuctionError::PendingAllocationsExist(round_id));
        }
        self.finalize_locked(&guard)
    }

    fn finalize_locked(&self, guard: &RoundLockGuard<'_>) -> Result<SettlementReport> {
        let round_id = guard.round_id();
        let round = self.rounds.get(round_id)?;
        ensure_finalizable(&round)?;
        self.detect_winners(round_id)?;

        let mut report = SettlementReport::new(round_id, IntentKind::Finalize);
        let mut winners: HashMap<PlayerId, (TeamId, Decimal)> = HashMap::new();
        let mut failed_players: HashSet<PlayerId> = HashSet::new();

        for bid in self.won_bids(round_id) {
            match self.finalize_bid(&round, &bid) {
                Ok(intent) => {
                    winners.insert(intent.player_id, (intent.team_id, intent.amount));
                    report.record_settled(&intent);
                }
                Err(err) => {
                    tracing::warn!(round = %round_id, bid = %bid.id, team = %bid.team_id, error = %err, "finalize step failed");
                    failed_players.insert(bid.player_id);
                    report.record_failed(bid.id, &err);
                }
            }
        }

        if round.round_type == RoundType::Bulk {
            for listed in self.rounds.players(round_id) {
                if failed_players.contains(&listed.player_id) {
                    continue;
                }
                let winner = winners.get(&listed.player_id).copied();
                self.rounds
                    .settle_round_player(round_id, listed.player_id, winner)?;
            }
        }

        if report.failed.is_empty() {
            self.rounds.complete(round_id)?;
            self.pending.remove(round_id);
            report.completed = true;
            tracing::info!(
                round = %round_id,
                settled = report.settled.len(),
                total = %report.total(),
                "round finalized"
            );
        } else {
            tracing::warn!(
                round = %round_id,
                settled = report.settled.len(),
                failed = report.failed.len(),
                "round left active with incomplete settlement"
            );
        }
        Ok(report)
    }

    fn finalize_bid(&self, round: &Round, bid: &Bid) -> Result<SettlementIntent> {
        let amount = self.amount_of(bid)?;
        let position = self.position_of(round, bid.player_id)?;
        let mut intent = self.intents.put_if_absent(SettlementIntent::new(
            IntentKind::Finalize,
            bid,
            round.season_id,
            position,
            amount,
        ));
        if !intent.is_done() {
            self.drive(&mut intent)?;
        }
        Ok(intent)
    }

    // ----------------------------------------------------------------
    // Manual finalization
    // ----------------------------------------------------------------

    /// Compute and park the allocations finalization would make.
    ///
    /// Closes bidding and classifies bids like finalization does, but
    /// creates no intent and touches neither the budget store nor the
    /// player registry.
    ///
    /// # Errors
    /// As [`Self::finalize`]; a tie that is still open is refused.
    pub fn preview(&self, round_id: RoundId) -> Result<SettlementPreview> {
        let _guard = self.lock.acquire(round_id)?;
        let round = self.rounds.get(round_id)?;
        ensure_finalizable(&round)?;
        if self.pending.contains(round_id) {
            return Err(AuctionError::PendingAllocationsExist(round_id));
        }
        self.detect_winners(round_id)?;

        let mut allocations = Vec::new();
        for bid in self.won_bids(round_id) {
            allocations.push(PendingAllocation {
                bid_id: bid.id,
                round_id,
                team_id: bid.team_id,
                player_id: bid.player_id,
                position: self.position_of(&round, bid.player_id)?,
                amount: self.amount_of(&bid)?,
            });
        }
        let preview = self
            .pending
            .insert(SettlementPreview::new(round_id, allocations))?;
        tracing::info!(
            round = %round_id,
            players = preview.total_players,
            total = %preview.total_spent,
            "finalization previewed"
        );
        Ok(preview)
    }

    /// The round's parked preview.
    pub fn pending_allocations(&self, round_id: RoundId) -> Result<SettlementPreview> {
        self.pending.get(round_id)
    }

    /// Drop the round's parked preview.
    pub fn discard_pending(&self, round_id: RoundId) -> Result<SettlementPreview> {
        let _guard = self.lock.acquire(round_id)?;
        let preview = self
            .pending
            .remove(round_id)
            .ok_or(AuctionError::NoPendingAllocations(round_id))?;
        tracing::info!(round = %round_id, players = preview.total_players, "pending allocations discarded");
        Ok(preview)
    }

    /// Settle the parked preview.
    ///
    /// Every team must afford its whole share before any step runs; one
    /// short team rejects the lot and leaves the preview parked.
    ///
    /// # Errors
    /// - [`AuctionError::NoPendingAllocations`] without a preview
    /// - [`AuctionError::StalePendingAllocations`] if the won bids changed
    /// - [`AuctionError::InsufficientBudget`] for the first short team
    pub fn apply_pending(&self, round_id: RoundId) -> Result<SettlementReport> {
        let guard = self.lock.acquire(round_id)?;
        let preview = self.pending.get(round_id)?;
        let round = self.rounds.get(round_id)?;
        ensure_finalizable(&round)?;

        let mut current = Vec::new();
        for bid in self.won_bids(round_id) {
            current.push((bid.id, bid.team_id, self.amount_of(&bid)?));
        }
        if !preview.matches(&current) {
            return Err(AuctionError::StalePendingAllocations(round_id));
        }

        for (team_id, needed) in &preview.per_team {
            let budget = self.budgets.get_budget(*team_id, round.season_id)?;
            if !budget.can_afford(*needed) {
                tracing::warn!(round = %round_id, team = %team_id, needed = %needed, available = %budget.budget, "pending allocations exceed budget");
                return Err(AuctionError::InsufficientBudget {
                    needed: *needed,
                    available: budget.budget,
                });
            }
        }

        self.finalize_locked(&guard)
    }

    // ----------------------------------------------------------------
    // Reverse
    // ----------------------------------------------------------------

    /// Compensate a completed round's finalization.
    pub fn reverse(&self, round_id: RoundId) -> Result<SettlementReport> {
        let guard = self.lock.acquire(round_id)?;
        self.reverse_locked(&guard)
    }

    /// [`Self::reverse`] for a caller that already holds the round lock.
    pub fn reverse_locked(&self, guard: &RoundLockGuard<'_>) -> Result<SettlementReport> {
        let round_id = guard.round_id();
        let round = self.rounds.get(round_id)?;
        if round.status != RoundStatus::Completed {
            return Err(AuctionError::InvalidRound {
                reason: format!("only completed rounds can be reversed (status: {})", round.status),
            });
        }

        let mut report = SettlementReport::new(round_id, IntentKind::Reverse);
        for bid in self.won_bids(round_id) {
            match self.reverse_bid(&round, &bid) {
                Ok(intent) => report.record_settled(&intent),
                Err(err) => {
                    tracing::warn!(round = %round_id, bid = %bid.id, team = %bid.team_id, error = %err, "reverse step failed");
                    report.record_failed(bid.id, &err);
                }
            }
        }

        if report.failed.is_empty() {
            self.spend.verify_zero(round_id)?;
            report.completed = true;
            tracing::info!(
                round = %round_id,
                reversed = report.settled.len(),
                refunded = %report.total(),
                "round reversed"
            );
        } else {
            tracing::warn!(
                round = %round_id,
                reversed = report.settled.len(),
                failed = report.failed.len(),
                "reversal incomplete"
            );
        }
        Ok(report)
    }

    fn reverse_bid(&self, round: &Round, bid: &Bid) -> Result<SettlementIntent> {
        let reverse_id = SettlementIntent::id_for(IntentKind::Reverse, bid.id);
        if let Some(mut existing) = self.intents.get(reverse_id) {
            if !existing.is_done() {
                self.drive(&mut existing)?;
            }
            return Ok(existing);
        }

        let finalized = self
            .intents
            .get(SettlementIntent::id_for(IntentKind::Finalize, bid.id));
        let mut intent = match &finalized {
            Some(f) => {
                let mut intent =
                    SettlementIntent::new(IntentKind::Reverse, bid, f.season_id, f.position.clone(), f.amount);
                // Nothing to undo for steps finalization never reached.
                intent.allocation_done = !f.allocation_done;
                intent.player_done = !f.player_done;
                intent.budget_done = !f.budget_done;
                intent.position_listed = f.position_listed;
                intent
            }
            None => {
                let amount = self.amount_of(bid)?;
                let position = self.position_of(round, bid.player_id)?;
                // Finalized elsewhere: adopt its debit so spend balances.
                self.spend.record_debit(round.id, bid.team_id, amount);
                SettlementIntent::new(IntentKind::Reverse, bid, round.season_id, position, amount)
            }
        };
        intent = self.intents.put_if_absent(intent);
        self.drive(&mut intent)?;
        Ok(intent)
    }

    // ----------------------------------------------------------------
    // Recovery
    // ----------------------------------------------------------------

    /// Re-drive every incomplete intent.
    ///
    /// Runs the owning pass again per (round, direction), so a finalize whose
    /// intents all land completes its round. Rounds busy with another pass
    /// are skipped.
    pub fn recover(&self) -> Vec<SettlementReport> {
        let pending: BTreeSet<(RoundId, IntentKind)> = self
            .intents
            .incomplete()
            .into_iter()
            .map(|i| (i.round_id, i.kind))
            .collect();

        let mut reports = Vec::new();
        for (round_id, kind) in pending {
            let guard = match self.lock.acquire(round_id) {
                Ok(guard) => guard,
                Err(err) => {
                    tracing::warn!(round = %round_id, error = %err, "recovery skipped busy round");
                    continue;
                }
            };
            let result = match kind {
                IntentKind::Finalize => self.finalize_locked(&guard),
                IntentKind::Reverse => self.reverse_locked(&guard),
            };
            match result {
                Ok(report) => reports.push(report),
                Err(err) => {
                    tracing::warn!(round = %round_id, kind = %kind, error = %err, "recovery pass failed");
                }
            }
        }
        tracing::info!(passes = reports.len(), "settlement recovery complete");
        reports
    }

    /// Drop per-round bookkeeping once the round is deleted: spend totals,
    /// settlement intents and any parked preview.
    pub fn forget_round(&self, round_id: RoundId) {
        self.spend.forget_round(round_id);
        let purged = self.intents.remove_round(round_id);
        self.pending.remove(round_id);
        tracing::debug!(round = %round_id, intents = purged, "settlement bookkeeping dropped");
    }

    // ----------------------------------------------------------------
    // Steps
    // ----------------------------------------------------------------

    fn drive(&self, intent: &mut SettlementIntent) -> Result<()> {
        intent.attempts += 1;
        let result = match intent.kind {
            IntentKind::Finalize => self.apply_finalize(intent),
            IntentKind::Reverse => self.apply_reverse(intent),
        };
        match result {
            Ok(()) => {
                intent.status = IntentStatus::Done;
                intent.last_error = None;
                self.intents.update(intent);
                tracing::debug!(intent = %intent.id, bid = %intent.bid_id, kind = %intent.kind, "intent done");
                Ok(())
            }
            Err(err) => {
                intent.status = IntentStatus::Failed;
                intent.last_error = Some(err.to_string());
                self.intents.update(intent);
                Err(err)
            }
        }
    }

    fn apply_finalize(&self, intent: &mut SettlementIntent) -> Result<()> {
        if !intent.allocation_done {
            self.players.insert_allocation(&intent.allocation())?;
            intent.allocation_done = true;
            self.intents.update(intent);
        }
        if !intent.player_done {
            self.players.mark_sold(&intent.allocation())?;
            intent.player_done = true;
            self.intents.update(intent);
        }
        if !intent.budget_done {
            if let (None, Some(position)) = (intent.position_listed, &intent.position) {
                let counts = self
                    .budgets
                    .get_position_counts(intent.team_id, intent.season_id)?;
                intent.position_listed = Some(counts.contains_key(position));
                self.intents.update(intent);
            }
            let debit = BudgetAdjustment::debit(intent.id.budget_key(), intent.amount, intent.position.clone());
            self.budgets
                .adjust_budget(intent.team_id, intent.season_id, &debit)?;
            self.spend
                .record_debit(intent.round_id, intent.team_id, intent.amount);
            intent.budget_done = true;
            self.intents.update(intent);
        }
        Ok(())
    }

    fn apply_reverse(&self, intent: &mut SettlementIntent) -> Result<()> {
        if !intent.allocation_done {
            self.players
                .delete_allocation(intent.team_id, intent.player_id)?;
            intent.allocation_done = true;
            self.intents.update(intent);
        }
        if !intent.player_done {
            self.players.reset_player(intent.player_id)?;
            intent.player_done = true;
            self.intents.update(intent);
        }
        if !intent.budget_done {
            let mut refund = BudgetAdjustment::refund(intent.id.budget_key(), intent.amount, intent.position.clone());
            // A key the debit created goes away with it; listed keys stay at zero.
            if intent.position_listed == Some(false) {
                refund = refund.dropping_empty_position();
            }
            self.budgets
                .adjust_budget(intent.team_id, intent.season_id, &refund)?;
            self.spend
                .record_refund(intent.round_id, intent.team_id, intent.amount);
            intent.budget_done = true;
            self.intents.update(intent);
        }
        Ok(())
    }

    fn detect_winners(&self, round_id: RoundId) -> Result<()> {
        self.engine.detect(round_id)?;
        let unresolved = self.engine.unresolved_count(round_id);
        if unresolved > 0 {
            return Err(AuctionError::UnresolvedTiebreakers { count: unresolved });
        }
        Ok(())
    }

    fn amount_of(&self, bid: &Bid) -> Result<Decimal> {
        match bid.won_amount {
            Some(amount) => Ok(amount),
            None => self.ledger.unseal(bid),
        }
    }

    fn won_bids(&self, round_id: RoundId) -> Vec<Bid> {
        self.ledger
            .bids_for_round(round_id)
            .into_iter()
            .filter(|b| b.status == BidStatus::Won)
            .collect()
    }

    /// The player's registered position, else the round's.
    fn position_of(&self, round: &Round, player_id: PlayerId) -> Result<Option<String>> {
        Ok(self
            .players
            .player(player_id)?
            .and_then(|p| p.position)
            .or_else(|| round.position.clone()))
    }
}

fn ensure_finalizable(round: &Round) -> Result<()> {
    match round.status {
        RoundStatus::Active => Ok(()),
        RoundStatus::Completed => Err(AuctionError::RoundAlreadyFinalized(round.id)),
        status => Err(AuctionError::RoundNotActive {
            round_id: round.id,
            status,
        }),
    }
}
