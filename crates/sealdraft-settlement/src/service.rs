//! The auction service: one handle over every plane.
//!
//! Wires the round store, bid ledger, tiebreak engine, and settler around
//! shared collaborators, and owns the operations that span planes: round
//! deletion (reversal plus cascade) and the aggregated round read.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sealdraft_ledger::{AesBidCodec, BidLedger, RoundStore};
use sealdraft_tiebreak::{DetectionReport, TiebreakEngine, TiebreakerView, WithdrawOutcome};
use sealdraft_types::{
    AuctionConfig, AuctionError, Bid, BidCodec, BidId, BidStatus, BudgetStore, NewRound,
    Notifier, PlayerBidStats, PlayerId, PlayerRegistry, Result, Round, RoundDefaults,
    RoundEventKind, RoundId, RoundPatch, RoundPlayer, RoundPlayerSpec, RoundStatus, RoundType,
    SeasonId, TeamId, TiebreakOutcome, Tiebreaker, TiebreakerId, TiebreakerStatus,
};
use serde::{Deserialize, Serialize};

use crate::pending::SettlementPreview;
use crate::settler::{SettlementReport, Settler};

/// A round creation request. Omitted limits take the configured defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoundRequest {
    pub season_id: SeasonId,
    pub round_type: RoundType,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub position_group: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub base_price: Option<Decimal>,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub max_bids_per_team: Option<u32>,
    #[serde(default)]
    pub players: Vec<RoundPlayerSpec>,
}

impl CreateRoundRequest {
    #[must_use]
    pub fn into_new_round(self, defaults: &RoundDefaults) -> NewRound {
        NewRound {
            season_id: self.season_id,
            round_type: self.round_type,
            position: self.position,
            position_group: self.position_group,
            start_time: self.start_time,
            end_time: self.end_time,
            base_price: self.base_price.unwrap_or(defaults.base_price),
            duration_seconds: self.duration_seconds,
            max_bids_per_team: self
                .max_bids_per_team
                .unwrap_or(defaults.max_bids_per_team),
            players: self.players,
        }
    }
}

/// A bid as shown in the round read: unsealed, with display names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BidView {
    pub bid_id: BidId,
    pub team_id: TeamId,
    pub team_name: Option<String>,
    pub player_id: PlayerId,
    pub player_name: Option<String>,
    /// Settled amount for won bids; `None` if the bid could not be unsealed.
    pub amount: Option<Decimal>,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TiebreakerSummary {
    pub id: TiebreakerId,
    pub status: TiebreakerStatus,
    pub tie_amount: Decimal,
    pub highest_amount: Option<Decimal>,
    pub winner_team_id: Option<TeamId>,
}

impl From<&Tiebreaker> for TiebreakerSummary {
    fn from(tb: &Tiebreaker) -> Self {
        Self {
            id: tb.id,
            status: tb.status,
            tie_amount: tb.tie_amount,
            highest_amount: tb.highest_amount,
            winner_team_id: tb.winner_team_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundPlayerView {
    #[serde(flatten)]
    pub player: RoundPlayer,
    pub tiebreaker: Option<TiebreakerSummary>,
}

/// Everything `GET /rounds/{id}` returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundDetail {
    pub round: Round,
    pub bids: Vec<BidView>,
    pub stats: Vec<PlayerBidStats>,
    pub players: Vec<RoundPlayerView>,
    pub tiebreakers: Vec<Tiebreaker>,
}

/// Result of a delete request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteOutcome {
    pub round_id: RoundId,
    /// `false` when reversal left failures and the round was kept.
    pub removed: bool,
    pub bids_removed: usize,
    pub tiebreakers_removed: usize,
    pub reversal: Option<SettlementReport>,
}

pub struct AuctionService {
    config: AuctionConfig,
    rounds: Arc<RoundStore>,
    ledger: Arc<BidLedger>,
    engine: Arc<TiebreakEngine>,
    settler: Settler,
    budgets: Arc<dyn BudgetStore>,
    players: Arc<dyn PlayerRegistry>,
}

impl AuctionService {
    /// Assemble a service around an injected codec. `config.codec` is not
    /// consulted.
    #[must_use]
    pub fn new(
        config: AuctionConfig,
        codec: Arc<dyn BidCodec>,
        budgets: Arc<dyn BudgetStore>,
        players: Arc<dyn PlayerRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let rounds = Arc::new(RoundStore::new(notifier));
        let ledger = Arc::new(BidLedger::new(
            Arc::clone(&rounds),
            codec,
            Arc::clone(&budgets),
        ));
        let engine = Arc::new(TiebreakEngine::new(
            Arc::clone(&rounds),
            Arc::clone(&ledger),
            Arc::clone(&budgets),
            config.tiebreaker.clone(),
        ));
        let settler = Settler::new(
            Arc::clone(&rounds),
            Arc::clone(&ledger),
            Arc::clone(&engine),
            Arc::clone(&budgets),
            Arc::clone(&players),
        );
        tracing::info!(
            engine = sealdraft_types::constants::ENGINE_NAME,
            version = sealdraft_types::constants::VERSION,
            "auction service ready"
        );
        Self {
            config,
            rounds,
            ledger,
            engine,
            settler,
            budgets,
            players,
        }
    }

    /// Validate `config` and build the AES-GCM codec it describes.
    pub fn from_config(
        config: AuctionConfig,
        budgets: Arc<dyn BudgetStore>,
        players: Arc<dyn PlayerRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;
        let codec = AesBidCodec::from_config(&config.codec)?;
        Ok(Self::new(config, Arc::new(codec), budgets, players, notifier))
    }

    #[must_use]
    pub fn config(&self) -> &AuctionConfig {
        &self.config
    }

    #[must_use]
    pub fn rounds(&self) -> &Arc<RoundStore> {
        &self.rounds
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<BidLedger> {
        &self.ledger
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<TiebreakEngine> {
        &self.engine
    }

    #[must_use]
    pub fn settler(&self) -> &Settler {
        &self.settler
    }

    // ----------------------------------------------------------------
    // Rounds
    // ----------------------------------------------------------------

    pub fn create_round(&self, request: CreateRoundRequest) -> Result<Round> {
        self.rounds
            .create(request.into_new_round(&self.config.rounds))
    }

    pub fn get_round(&self, round_id: RoundId) -> Result<Round> {
        self.rounds.get(round_id)
    }

    #[must_use]
    pub fn list_rounds(&self, season_id: SeasonId) -> Vec<Round> {
        self.rounds.list(season_id)
    }

    pub fn update_round(&self, round_id: RoundId, patch: &RoundPatch) -> Result<Round> {
        self.rounds.update(round_id, patch)
    }

    /// Delete a round and everything hanging off it.
    ///
    /// Active rounds are refused. A completed round is reversed first; if
    /// any bid fails to reverse the round is kept and the report returned
    /// with `removed == false`.
    pub fn delete_round(&self, round_id: RoundId) -> Result<DeleteOutcome> {
        let guard = self.settler.lock_round(round_id)?;
        let round = self.rounds.get(round_id)?;

        let reversal = match round.status {
            RoundStatus::Active => return Err(AuctionError::RoundInProgress(round_id)),
            RoundStatus::Completed => {
                let report = self.settler.reverse_locked(&guard)?;
                if !report.completed {
                    tracing::warn!(round = %round_id, failed = report.failed.len(), "round kept after incomplete reversal");
                    return Ok(DeleteOutcome {
                        round_id,
                        removed: false,
                        bids_removed: 0,
                        tiebreakers_removed: 0,
                        reversal: Some(report),
                    });
                }
                Some(report)
            }
            RoundStatus::Draft | RoundStatus::Scheduled => None,
        };

        let removed = self.rounds.remove_if(round_id, |current| {
            if current.status == RoundStatus::Active {
                Err(AuctionError::RoundInProgress(round_id))
            } else {
                Ok(())
            }
        })?;
        let bids_removed = self.ledger.delete_for_round(round_id);
        let tiebreakers_removed = self.engine.delete_for_round(round_id);
        self.settler.forget_round(round_id);

        if reversal.is_some() {
            self.rounds.publish(RoundEventKind::RoundReversed, &removed);
        }
        self.rounds.publish(RoundEventKind::RoundDeleted, &removed);
        tracing::info!(
            round = %round_id,
            bids = bids_removed,
            tiebreakers = tiebreakers_removed,
            reversed = reversal.is_some(),
            "round deleted"
        );
        Ok(DeleteOutcome {
            round_id,
            removed: true,
            bids_removed,
            tiebreakers_removed,
            reversal,
        })
    }

    /// The aggregated round read: unsealed bids with names, per-player
    /// stats, listed players with their tiebreakers, and all tiebreakers.
    pub fn round_detail(&self, round_id: RoundId) -> Result<RoundDetail> {
        let round = self.rounds.get(round_id)?;
        let listed = self.rounds.players(round_id);
        let tiebreakers = self.engine.for_round(round_id);
        let stats = self.ledger.stats_for_round(round_id)?.as_ref().clone();

        let mut team_names: HashMap<TeamId, Option<String>> = HashMap::new();
        let mut player_names: HashMap<PlayerId, Option<String>> = listed
            .iter()
            .map(|p| (p.player_id, Some(p.player_name.clone())))
            .collect();

        let bids = self
            .ledger
            .bids_for_round(round_id)
            .into_iter()
            .map(|bid| {
                let team_name = team_names
                    .entry(bid.team_id)
                    .or_insert_with(|| self.team_name(bid.team_id, round.season_id))
                    .clone();
                let player_name = player_names
                    .entry(bid.player_id)
                    .or_insert_with(|| self.player_name(bid.player_id))
                    .clone();
                BidView {
                    amount: self.display_amount(&bid),
                    bid_id: bid.id,
                    team_id: bid.team_id,
                    team_name,
                    player_id: bid.player_id,
                    player_name,
                    status: bid.status,
                    created_at: bid.created_at,
                }
            })
            .collect();

        let players = listed
            .into_iter()
            .map(|player| RoundPlayerView {
                tiebreaker: tiebreakers
                    .iter()
                    .find(|tb| tb.player_id == player.player_id)
                    .map(TiebreakerSummary::from),
                player,
            })
            .collect();

        Ok(RoundDetail {
            round,
            bids,
            stats,
            players,
            tiebreakers,
        })
    }

    fn team_name(&self, team_id: TeamId, season_id: SeasonId) -> Option<String> {
        self.budgets
            .get_budget(team_id, season_id)
            .ok()
            .map(|b| b.team_name)
    }

    fn player_name(&self, player_id: PlayerId) -> Option<String> {
        self.players.player(player_id).ok().flatten().map(|p| p.name)
    }

    fn display_amount(&self, bid: &Bid) -> Option<Decimal> {
        if let Some(amount) = bid.won_amount {
            return Some(amount);
        }
        match self.ledger.unseal(bid) {
            Ok(amount) => Some(amount),
            Err(err) => {
                tracing::warn!(bid = %bid.id, error = %err, "bid could not be unsealed for display");
                None
            }
        }
    }

    // ----------------------------------------------------------------
    // Bids
    // ----------------------------------------------------------------

    pub fn place_bid(
        &self,
        round_id: RoundId,
        team_id: TeamId,
        player_id: PlayerId,
        amount: Decimal,
    ) -> Result<Bid> {
        self.ledger.place_bid(round_id, team_id, player_id, amount)
    }

    pub fn cancel_bid(&self, bid_id: BidId, team_id: TeamId) -> Result<Bid> {
        self.ledger.cancel_bid(bid_id, team_id)
    }

    // ----------------------------------------------------------------
    // Tiebreakers
    // ----------------------------------------------------------------

    /// Close bidding and run tie detection without settling.
    pub fn detect_ties(&self, round_id: RoundId) -> Result<DetectionReport> {
        self.engine.detect(round_id)
    }

    pub fn activate_tiebreakers(&self, round_id: RoundId) -> Result<Vec<Tiebreaker>> {
        self.engine.activate_round(round_id)
    }

    pub fn tiebreaker(&self, id: TiebreakerId, caller: Option<TeamId>) -> Result<TiebreakerView> {
        self.engine.view(id, caller)
    }

    pub fn submit_tiebreaker(&self, id: TiebreakerId, team_id: TeamId, amount: Decimal) -> Result<Tiebreaker> {
        self.engine.submit(id, team_id, amount)
    }

    pub fn withdraw_tiebreaker(&self, id: TiebreakerId, team_id: TeamId) -> Result<WithdrawOutcome> {
        self.engine.withdraw(id, team_id)
    }

    pub fn resolve_tiebreaker(&self, id: TiebreakerId) -> Result<TiebreakOutcome> {
        self.engine
            .resolve(id, sealdraft_types::ResolutionTrigger::Manual)
    }

    pub fn exclude_tiebreaker(&self, id: TiebreakerId) -> Result<TiebreakOutcome> {
        self.engine.exclude(id)
    }

    /// Resolve every tiebreaker whose timer has run out.
    pub fn expire_tiebreakers(&self, now: DateTime<Utc>) -> Vec<(TiebreakerId, TiebreakOutcome)> {
        self.engine.expire_due(now)
    }

    // ----------------------------------------------------------------
    // Settlement
    // ----------------------------------------------------------------

    pub fn finalize(&self, round_id: RoundId) -> Result<SettlementReport> {
        self.settler.finalize(round_id)
    }

    pub fn recover(&self) -> Vec<SettlementReport> {
        self.settler.recover()
    }

    /// Park the allocations finalization would make, for review.
    pub fn preview_finalization(&self, round_id: RoundId) -> Result<SettlementPreview> {
        self.settler.preview(round_id)
    }

    pub fn pending_allocations(&self, round_id: RoundId) -> Result<SettlementPreview> {
        self.settler.pending_allocations(round_id)
    }

    pub fn discard_pending_allocations(&self, round_id: RoundId) -> Result<SettlementPreview> {
        self.settler.discard_pending(round_id)
    }

    pub fn apply_pending_allocations(&self, round_id: RoundId) -> Result<SettlementReport> {
        self.settler.apply_pending(round_id)
    }
}
