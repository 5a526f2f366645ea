//! The tiebreak engine: applies detection outcomes and runs the
//! submit / withdraw / resolve protocol on top of [`TiebreakerStore`].
//!
//! Every mutation reads a snapshot, validates it (including any budget
//! lookup, done without a store lock held), and commits through a
//! version compare-and-swap. A lost race re-reads and re-validates, up to
//! `max_cas_retries` times.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use sealdraft_ledger::{BidLedger, RoundStore};
use sealdraft_types::{
    AuctionError, BidId, BudgetStore, ResolutionTrigger, Result, RoundEventKind, RoundId,
    TeamId, TeamTiebreaker, TiebreakOutcome, Tiebreaker, TiebreakerConfig, TiebreakerId,
    TiebreakerStatus,
};

use crate::detection::{PlayerOutcome, detect_outcomes};
use crate::ranking;
use crate::store::{FinishOutcome, InsertOutcome, TiebreakerStore};
use crate::view::TiebreakerView;

/// What a detection pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionReport {
    /// Bids marked won outright.
    pub sole_winners: Vec<BidId>,
    /// Tiebreakers created by this pass.
    pub created: Vec<TiebreakerId>,
    /// Players skipped because a tiebreaker already existed.
    pub existing: Vec<TiebreakerId>,
    /// Bids that could not be unsealed and took no part.
    pub unreadable: Vec<BidId>,
}

/// Result of a withdrawal.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WithdrawOutcome {
    pub tiebreaker: Tiebreaker,
    /// Set when the withdrawal left nothing to contest and the tiebreaker
    /// resolved.
    pub resolution: Option<TiebreakOutcome>,
}

pub struct TiebreakEngine {
    rounds: Arc<RoundStore>,
    ledger: Arc<BidLedger>,
    budgets: Arc<dyn BudgetStore>,
    store: TiebreakerStore,
    config: TiebreakerConfig,
}

impl TiebreakEngine {
    #[must_use]
    pub fn new(
        rounds: Arc<RoundStore>,
        ledger: Arc<BidLedger>,
        budgets: Arc<dyn BudgetStore>,
        config: TiebreakerConfig,
    ) -> Self {
        Self {
            rounds,
            ledger,
            budgets,
            store: TiebreakerStore::new(),
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &TiebreakerStore {
        &self.store
    }

    // ----------------------------------------------------------------
    // Detection
    // ----------------------------------------------------------------

    /// Close bidding and classify every player's top bids.
    ///
    /// Idempotent: players that already have a tiebreaker are skipped and
    /// bid status updates are no-ops when repeated.
    pub fn detect(&self, round_id: RoundId) -> Result<DetectionReport> {
        let round = self.rounds.close_bidding(round_id)?;
        let unsealed = self.ledger.open_bids(round_id);
        let mut report = DetectionReport {
            unreadable: unsealed.failed.iter().map(|(id, _)| *id).collect(),
            ..DetectionReport::default()
        };

        for outcome in detect_outcomes(&unsealed.open) {
            if let Some(existing) = self.store.find(round_id, outcome.player_id()) {
                report.existing.push(existing.id);
                continue;
            }
            match outcome {
                PlayerOutcome::Sole {
                    player_id,
                    winner,
                    amount,
                    losers,
                } => {
                    self.ledger.mark_won(winner, amount)?;
                    for bid in losers {
                        self.ledger.mark_lost(bid)?;
                    }
                    tracing::debug!(round = %round_id, player = %player_id, bid = %winner, "sole winner");
                    report.sole_winners.push(winner);
                }
                PlayerOutcome::Tie {
                    player_id,
                    tie_amount,
                    tied,
                    losers,
                } => {
                    let tiebreaker = Tiebreaker {
                        id: TiebreakerId::new(),
                        round_id,
                        player_id,
                        tie_amount,
                        status: TiebreakerStatus::Pending,
                        highest_amount: None,
                        highest_team_id: None,
                        winner_team_id: None,
                        winning_amount: None,
                        version: 0,
                        expires_at: None,
                        created_at: Utc::now(),
                        resolved_at: None,
                    };
                    let participants = tied
                        .iter()
                        .map(|(bid, team)| TeamTiebreaker::new(tiebreaker.id, *team, *bid))
                        .collect();

                    match self.store.insert_unique(tiebreaker, participants) {
                        InsertOutcome::Inserted(created) => {
                            for bid in losers {
                                self.ledger.mark_lost(bid)?;
                            }
                            tracing::info!(
                                round = %round_id,
                                player = %player_id,
                                tiebreaker = %created.id,
                                tie_amount = %tie_amount,
                                teams = tied.len(),
                                "tiebreaker created"
                            );
                            self.rounds.publish(RoundEventKind::TiebreakerCreated, &round);
                            report.created.push(created.id);
                        }
                        InsertOutcome::Existing(existing) => report.existing.push(existing.id),
                    }
                }
            }
        }

        tracing::info!(
            round = %round_id,
            sole = report.sole_winners.len(),
            created = report.created.len(),
            unreadable = report.unreadable.len(),
            "tie detection complete"
        );
        Ok(report)
    }

    // ----------------------------------------------------------------
    // Activation
    // ----------------------------------------------------------------

    /// `pending → active`, starting the timer when one is configured.
    pub fn activate(&self, id: TiebreakerId) -> Result<Tiebreaker> {
        let tb = self.store.activate(id, self.expiry_from(Utc::now()))?;
        tracing::info!(tiebreaker = %id, expires_at = ?tb.expires_at, "tiebreaker active");
        Ok(tb)
    }

    /// Activate every pending tiebreaker of a round.
    pub fn activate_round(&self, round_id: RoundId) -> Result<Vec<Tiebreaker>> {
        self.store
            .for_round(round_id)
            .into_iter()
            .filter(|tb| tb.status == TiebreakerStatus::Pending)
            .map(|tb| self.activate(tb.id))
            .collect()
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.config.duration_secs?).ok()?;
        now.checked_add_signed(TimeDelta::try_seconds(secs)?)
    }

    // ----------------------------------------------------------------
    // Protocol
    // ----------------------------------------------------------------

    /// Submit a new amount for `team`.
    ///
    /// # Errors
    /// - [`AuctionError::TiebreakerWrongStatus`] unless active (an expired
    ///   tiebreaker is resolved first)
    /// - [`AuctionError::NotTiebreakerParticipant`] / [`AuctionError::AlreadyWithdrawn`]
    /// - [`AuctionError::SubmissionTooLow`] unless strictly above both the
    ///   tie amount and the current highest submission
    /// - [`AuctionError::InsufficientBudget`]
    /// - [`AuctionError::StaleTiebreaker`] after exhausting retries
    pub fn submit(&self, id: TiebreakerId, team: TeamId, amount: Decimal) -> Result<Tiebreaker> {
        let mut expected = 0;
        for attempt in 0..=self.config.max_cas_retries {
            let (tb, participants) = self.store.snapshot(id)?;
            expected = tb.version;
            self.ensure_active(&tb)?;

            let me = find_participant(&tb, &participants, team)?;
            if me.withdrawn {
                return Err(AuctionError::AlreadyWithdrawn(team));
            }
            let minimum = tb.floor();
            if amount <= minimum {
                return Err(AuctionError::SubmissionTooLow {
                    minimum,
                    offered: amount,
                });
            }
            let round = self.rounds.get(tb.round_id)?;
            let budget = self.budgets.get_budget(team, round.season_id)?;
            if !budget.can_afford(amount) {
                return Err(AuctionError::InsufficientBudget {
                    needed: amount,
                    available: budget.budget,
                });
            }

            match self
                .store
                .record_submission(id, tb.version, team, amount, Utc::now())
            {
                Ok(updated) => {
                    tracing::info!(tiebreaker = %id, team = %team, amount = %amount, "tiebreaker submission");
                    return Ok(updated);
                }
                Err(AuctionError::StaleTiebreaker { .. }) => {
                    tracing::debug!(tiebreaker = %id, attempt, "submission lost version race, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(AuctionError::StaleTiebreaker { id, expected })
    }

    /// Withdraw `team`. The team holding the highest submission cannot.
    /// Resolves the tiebreaker once nobody is left, or the only team left
    /// holds a submission.
    pub fn withdraw(&self, id: TiebreakerId, team: TeamId) -> Result<WithdrawOutcome> {
        let mut expected = 0;
        for attempt in 0..=self.config.max_cas_retries {
            let (tb, participants) = self.store.snapshot(id)?;
            expected = tb.version;
            self.ensure_active(&tb)?;

            let me = find_participant(&tb, &participants, team)?;
            if me.withdrawn {
                return Err(AuctionError::AlreadyWithdrawn(team));
            }
            if tb.highest_team_id == Some(team) {
                return Err(AuctionError::HighestBidderCannotWithdraw);
            }

            match self.store.record_withdrawal(id, tb.version, team) {
                Ok((updated, participants)) => {
                    let remaining = participants.iter().filter(|p| p.is_active()).count();
                    tracing::info!(tiebreaker = %id, team = %team, remaining, "tiebreaker withdrawal");
                    let resolution = if ranking::settled_by_withdrawals(&participants) {
                        Some(self.resolve(id, ResolutionTrigger::AllButOneWithdrawn)?)
                    } else {
                        None
                    };
                    let tiebreaker = if resolution.is_some() {
                        self.store.get(id)?
                    } else {
                        updated
                    };
                    return Ok(WithdrawOutcome {
                        tiebreaker,
                        resolution,
                    });
                }
                Err(AuctionError::StaleTiebreaker { .. }) => {
                    tracing::debug!(tiebreaker = %id, attempt, "withdrawal lost version race, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(AuctionError::StaleTiebreaker { id, expected })
    }

    /// Resolve an active tiebreaker.
    ///
    /// Safe to call concurrently: one caller commits, the others return the
    /// committed outcome. Bid statuses are (re)applied either way.
    pub fn resolve(&self, id: TiebreakerId, trigger: ResolutionTrigger) -> Result<TiebreakOutcome> {
        let mut expected = 0;
        for _ in 0..=self.config.max_cas_retries {
            let (tb, participants) = self.store.snapshot(id)?;
            expected = tb.version;
            if !tb.status.is_open() {
                let outcome = committed_outcome(&tb, &participants)?;
                self.apply_to_bids(&participants, &outcome)?;
                return Ok(outcome);
            }
            if tb.status == TiebreakerStatus::Pending {
                return Err(AuctionError::TiebreakerWrongStatus {
                    id,
                    status: tb.status,
                    expected: TiebreakerStatus::Active,
                });
            }

            let outcome = ranking::decide(&participants);
            match self.store.finish(id, tb.version, &outcome, Utc::now()) {
                Ok(FinishOutcome::Committed(done)) => {
                    self.apply_to_bids(&participants, &outcome)?;
                    self.log_and_publish(&done, &outcome, trigger);
                    return Ok(outcome);
                }
                Ok(FinishOutcome::AlreadyFinished(done)) => {
                    let outcome = committed_outcome(&done, &participants)?;
                    self.apply_to_bids(&participants, &outcome)?;
                    return Ok(outcome);
                }
                Err(AuctionError::StaleTiebreaker { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Err(AuctionError::StaleTiebreaker { id, expected })
    }

    /// Administratively exclude a pending or active tiebreaker. Every tied
    /// bid becomes lost and the player stays unallocated.
    pub fn exclude(&self, id: TiebreakerId) -> Result<TiebreakOutcome> {
        let mut expected = 0;
        for _ in 0..=self.config.max_cas_retries {
            let (tb, participants) = self.store.snapshot(id)?;
            expected = tb.version;
            match tb.status {
                TiebreakerStatus::Excluded => return Ok(TiebreakOutcome::Excluded),
                TiebreakerStatus::Resolved => {
                    return Err(AuctionError::TiebreakerWrongStatus {
                        id,
                        status: tb.status,
                        expected: TiebreakerStatus::Active,
                    });
                }
                TiebreakerStatus::Pending | TiebreakerStatus::Active => {}
            }
            let outcome = TiebreakOutcome::Excluded;
            match self.store.finish(id, tb.version, &outcome, Utc::now()) {
                Ok(FinishOutcome::Committed(done)) => {
                    self.apply_to_bids(&participants, &outcome)?;
                    self.log_and_publish(&done, &outcome, ResolutionTrigger::Manual);
                    return Ok(outcome);
                }
                Ok(FinishOutcome::AlreadyFinished(_)) | Err(AuctionError::StaleTiebreaker { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Err(AuctionError::StaleTiebreaker { id, expected })
    }

    /// Resolve every active tiebreaker whose timer ran out by `now`.
    pub fn expire_due(&self, now: DateTime<Utc>) -> Vec<(TiebreakerId, TiebreakOutcome)> {
        let mut resolved = Vec::new();
        for id in self.store.due(now) {
            match self.resolve(id, ResolutionTrigger::Expired) {
                Ok(outcome) => resolved.push((id, outcome)),
                Err(err) => {
                    tracing::warn!(tiebreaker = %id, error = %err, "expired tiebreaker could not be resolved");
                }
            }
        }
        resolved
    }

    // ----------------------------------------------------------------
    // Reads
    // ----------------------------------------------------------------

    pub fn get(&self, id: TiebreakerId) -> Result<Tiebreaker> {
        self.store.get(id)
    }

    pub fn view(&self, id: TiebreakerId, caller: Option<TeamId>) -> Result<TiebreakerView> {
        let (tb, participants) = self.store.snapshot(id)?;
        Ok(TiebreakerView::build(tb, &participants, caller))
    }

    #[must_use]
    pub fn for_round(&self, round_id: RoundId) -> Vec<Tiebreaker> {
        self.store.for_round(round_id)
    }

    #[must_use]
    pub fn unresolved_count(&self, round_id: RoundId) -> usize {
        self.store.unresolved_count(round_id)
    }

    pub fn delete_for_round(&self, round_id: RoundId) -> usize {
        let removed = self.store.delete_for_round(round_id);
        tracing::debug!(round = %round_id, removed, "tiebreakers deleted");
        removed
    }

    // ----------------------------------------------------------------
    // Internals
    // ----------------------------------------------------------------

    /// Reject anything but an active, unexpired tiebreaker. An expired one
    /// is resolved on the spot.
    fn ensure_active(&self, tb: &Tiebreaker) -> Result<()> {
        if tb.status != TiebreakerStatus::Active {
            return Err(AuctionError::TiebreakerWrongStatus {
                id: tb.id,
                status: tb.status,
                expected: TiebreakerStatus::Active,
            });
        }
        if tb.is_expired_at(Utc::now()) {
            self.resolve(tb.id, ResolutionTrigger::Expired)?;
            let status = self.store.get(tb.id)?.status;
            return Err(AuctionError::TiebreakerWrongStatus {
                id: tb.id,
                status,
                expected: TiebreakerStatus::Active,
            });
        }
        Ok(())
    }

    fn apply_to_bids(&self, participants: &[TeamTiebreaker], outcome: &TiebreakOutcome) -> Result<()> {
        for participant in participants {
            match outcome {
                TiebreakOutcome::Resolved {
                    winning_bid_id,
                    amount,
                    ..
                } if participant.original_bid_id == *winning_bid_id => {
                    self.ledger.mark_won(participant.original_bid_id, *amount)?;
                }
                _ => self.ledger.mark_lost(participant.original_bid_id)?,
            }
        }
        Ok(())
    }

    fn log_and_publish(&self, tb: &Tiebreaker, outcome: &TiebreakOutcome, trigger: ResolutionTrigger) {
        match outcome {
            TiebreakOutcome::Resolved {
                winner_team_id,
                amount,
                ..
            } => tracing::info!(
                tiebreaker = %tb.id,
                round = %tb.round_id,
                winner = %winner_team_id,
                amount = %amount,
                trigger = %trigger,
                "tiebreaker resolved"
            ),
            TiebreakOutcome::Excluded => tracing::info!(
                tiebreaker = %tb.id,
                round = %tb.round_id,
                trigger = %trigger,
                "tiebreaker excluded"
            ),
        }
        if let Ok(round) = self.rounds.get(tb.round_id) {
            self.rounds.publish(RoundEventKind::TiebreakerResolved, &round);
        }
    }
}

fn find_participant<'a>(
    tb: &Tiebreaker,
    participants: &'a [TeamTiebreaker],
    team: TeamId,
) -> Result<&'a TeamTiebreaker> {
    participants
        .iter()
        .find(|p| p.team_id == team)
        .ok_or(AuctionError::NotTiebreakerParticipant { id: tb.id, team })
}

/// Rebuild the outcome a finished tiebreaker committed.
fn committed_outcome(tb: &Tiebreaker, participants: &[TeamTiebreaker]) -> Result<TiebreakOutcome> {
    match (tb.status, tb.winner_team_id, tb.winning_amount) {
        (TiebreakerStatus::Resolved, Some(winner), Some(amount)) => {
            let bid = find_participant(tb, participants, winner)?;
            Ok(TiebreakOutcome::Resolved {
                winner_team_id: winner,
                winning_bid_id: bid.original_bid_id,
                amount,
            })
        }
        (TiebreakerStatus::Excluded, _, _) => Ok(TiebreakOutcome::Excluded),
        (status, _, _) => Err(AuctionError::Internal(format!(
            "tiebreaker {} is {status} without a recorded outcome",
            tb.id
        ))),
    }
}
