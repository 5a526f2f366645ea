//! End-to-end integration tests across all three planes.
//!
//! These tests exercise the full round lifecycle:
//! Ledger (rounds, sealed bids) -> Tiebreak (detection, sub-auction) ->
//! Settlement (finalize, reverse, recovery)
//!
//! They verify that the planes work together in realistic scenarios:
//! clean wins, ties and their resolution, partial settlement failures,
//! deletion with reversal, and concurrent callers.

use std::sync::Arc;

use rust_decimal::Decimal;
use sealdraft_ledger::{BroadcastNotifier, InMemoryBudgetStore, InMemoryPlayerRegistry};
use sealdraft_settlement::{AuctionService, CreateRoundRequest};
use sealdraft_types::*;

/// Helper: an auction service over in-memory collaborators.
struct Auction {
    service: AuctionService,
    budgets: Arc<InMemoryBudgetStore>,
    registry: Arc<InMemoryPlayerRegistry>,
    notifier: Arc<BroadcastNotifier>,
    season: SeasonId,
}

impl Auction {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let config = AuctionConfig::for_tests();
        let budgets = Arc::new(
            InMemoryBudgetStore::from_config(&config.settlement)
                .expect("test config should size the budget store"),
        );
        let registry = Arc::new(InMemoryPlayerRegistry::new());
        let notifier = Arc::new(BroadcastNotifier::new(256));
        let service = AuctionService::from_config(
            config,
            budgets.clone(),
            registry.clone(),
            notifier.clone(),
        )
        .expect("test config should be valid");
        Self {
            service,
            budgets,
            registry,
            notifier,
            season: SeasonId::new(),
        }
    }

    fn team(&self, name: &str, budget: i64) -> TeamId {
        let team = TeamId::new();
        self.budgets
            .seed(TeamBudget::new(team, self.season, name, Decimal::new(budget, 0)));
        team
    }

    fn player(&self, name: &str, position: &str) -> PlayerId {
        let player = PlayerId::new();
        self.registry
            .seed(PlayerRecord::available(player, name, Some(position.into())));
        player
    }

    fn budget(&self, team: TeamId) -> TeamBudget {
        self.budgets
            .get_budget(team, self.season)
            .expect("budget record should exist")
    }

    fn request(&self, round_type: RoundType) -> CreateRoundRequest {
        CreateRoundRequest {
            season_id: self.season,
            round_type,
            position: None,
            position_group: None,
            start_time: None,
            end_time: None,
            base_price: Some(Decimal::new(10, 0)),
            duration_seconds: None,
            max_bids_per_team: Some(5),
            players: Vec::new(),
        }
    }

    fn set_status(&self, round: RoundId, status: RoundStatus) {
        self.service
            .update_round(
                round,
                &RoundPatch {
                    status: Some(status),
                    ..RoundPatch::default()
                },
            )
            .expect("status change should be legal");
    }

    fn active_round(&self) -> RoundId {
        let round = self
            .service
            .create_round(self.request(RoundType::Single))
            .expect("round should be created");
        self.set_status(round.id, RoundStatus::Active);
        round.id
    }

    fn bid(&self, round: RoundId, team: TeamId, player: PlayerId, amount: i64) -> BidId {
        self.service
            .place_bid(round, team, player, Decimal::new(amount, 0))
            .expect("bid should be accepted")
            .id
    }

    fn bid_status(&self, bid: BidId) -> BidStatus {
        self.service
            .ledger()
            .get(bid)
            .expect("bid should exist")
            .status
    }
}

fn d(v: i64) -> Decimal {
    Decimal::new(v, 0)
}

// =============================================================================
// Test: clean wins on distinct players
// =============================================================================
#[test]
fn e2e_three_clean_wins_settle_exactly() {
    let auction = Auction::new();
    let round = auction.active_round();

    let teams = [
        auction.team("Alpha", 500),
        auction.team("Bravo", 500),
        auction.team("Charlie", 500),
    ];
    let players = [
        auction.player("Silva", "GK"),
        auction.player("Moreno", "DEF"),
        auction.player("Adeyemi", "FWD"),
    ];
    let amounts = [60, 85, 120];
    for i in 0..3 {
        auction.bid(round, teams[i], players[i], amounts[i]);
    }

    let report = auction.service.finalize(round).expect("finalize should run");
    assert!(report.completed);
    assert_eq!(report.settled.len(), 3);
    assert!(report.failed.is_empty());

    for i in 0..3 {
        let budget = auction.budget(teams[i]);
        assert_eq!(budget.budget, d(500 - amounts[i]));
        assert_eq!(budget.total_spent, d(amounts[i]));
        assert_eq!(budget.players_count, 1);
        assert!(auction.registry.allocation(teams[i], players[i]).is_some());
        let record = auction.registry.player(players[i]).unwrap().unwrap();
        assert_eq!(record.status, PlayerStatus::Sold);
        assert_eq!(record.acquisition_value, Some(d(amounts[i])));
    }
    assert_eq!(auction.budget(teams[1]).position_count("DEF"), 1);
    assert_eq!(
        auction.service.get_round(round).unwrap().status,
        RoundStatus::Completed
    );
}

// =============================================================================
// Test: tie -> tiebreaker -> resolution -> settlement at the new amount
// =============================================================================
#[test]
fn e2e_tie_resolved_by_submission() {
    let auction = Auction::new();
    let round = auction.active_round();
    let player = auction.player("Kowalski", "MID");
    let (a, b, c) = (
        auction.team("A", 1000),
        auction.team("B", 1000),
        auction.team("C", 1000),
    );
    let bid_a = auction.bid(round, a, player, 100);
    let bid_b = auction.bid(round, b, player, 100);
    let bid_c = auction.bid(round, c, player, 90);

    // Finalize detects the tie and refuses to settle.
    let err = auction.service.finalize(round).unwrap_err();
    assert!(matches!(err, AuctionError::UnresolvedTiebreakers { count: 1 }));

    let tiebreakers = auction.service.engine().for_round(round);
    assert_eq!(tiebreakers.len(), 1);
    let tb = &tiebreakers[0];
    assert_eq!(tb.tie_amount, d(100));
    assert_eq!(tb.player_id, player);
    assert_eq!(auction.bid_status(bid_c), BidStatus::Lost);

    let view = auction.service.tiebreaker(tb.id, Some(c));
    assert!(view.unwrap().caller.is_none(), "C is not party to the tie");

    auction.service.activate_tiebreakers(round).unwrap();
    auction.service.submit_tiebreaker(tb.id, a, d(120)).unwrap();
    let err = auction.service.submit_tiebreaker(tb.id, b, d(110)).unwrap_err();
    assert!(matches!(err, AuctionError::SubmissionTooLow { .. }));

    // The leader cannot withdraw; nothing changes.
    let before = auction.service.engine().get(tb.id).unwrap();
    let err = auction.service.withdraw_tiebreaker(tb.id, a).unwrap_err();
    assert!(matches!(err, AuctionError::HighestBidderCannotWithdraw));
    assert_eq!(auction.service.engine().get(tb.id).unwrap(), before);

    let outcome = auction.service.resolve_tiebreaker(tb.id).unwrap();
    assert!(matches!(
        outcome,
        TiebreakOutcome::Resolved { winner_team_id, amount, .. } if winner_team_id == a && amount == d(120)
    ));
    assert_eq!(auction.bid_status(bid_a), BidStatus::Won);
    assert_eq!(auction.bid_status(bid_b), BidStatus::Lost);

    let report = auction.service.finalize(round).expect("finalize should run");
    assert!(report.completed);
    assert_eq!(report.per_team.get(&a), Some(&d(120)));
    assert_eq!(auction.budget(a).budget, d(880));
    assert_eq!(auction.budget(b).budget, d(1000));

    // Detection after completion still finds the one tiebreaker.
    let again = auction.service.detect_ties(round).unwrap();
    assert!(again.created.is_empty());
    assert_eq!(auction.service.engine().for_round(round).len(), 1);
}

// =============================================================================
// Test: both tied teams withdraw -> excluded, nothing allocated
// =============================================================================
#[test]
fn e2e_both_withdraw_excludes_player() {
    let auction = Auction::new();
    let round = auction.active_round();
    let player = auction.player("Haaland", "FWD");
    let (a, b) = (auction.team("A", 400), auction.team("B", 400));
    auction.bid(round, a, player, 150);
    auction.bid(round, b, player, 150);

    let detection = auction.service.detect_ties(round).unwrap();
    let tb = detection.created[0];
    auction.service.engine().activate(tb).unwrap();

    assert!(auction.service.withdraw_tiebreaker(tb, a).unwrap().resolution.is_none());
    let last = auction.service.withdraw_tiebreaker(tb, b).unwrap();
    assert_eq!(last.resolution, Some(TiebreakOutcome::Excluded));

    let report = auction.service.finalize(round).expect("finalize should run");
    assert!(report.completed);
    assert!(report.settled.is_empty());
    assert_eq!(auction.budget(a).budget, d(400));
    assert_eq!(auction.budget(b).budget, d(400));
    assert!(!auction.registry.player(player).unwrap().unwrap().is_sold);
    assert_eq!(auction.budgets.applied_count(), 0);
}

// =============================================================================
// Test: finalize -> delete restores budgets exactly
// =============================================================================
#[test]
fn e2e_delete_completed_round_reverses() {
    let auction = Auction::new();
    let round = auction.active_round();
    let (a, b) = (auction.team("A", 700), auction.team("B", 700));
    let (p1, p2) = (auction.player("One", "DEF"), auction.player("Two", "MID"));
    auction.bid(round, a, p1, 200);
    auction.bid(round, b, p2, 45);
    auction.bid(round, a, p2, 40);
    let (before_a, before_b) = (auction.budget(a), auction.budget(b));

    auction.service.finalize(round).expect("finalize should run");
    assert_ne!(auction.budget(a), before_a);

    let mut events = auction.notifier.subscribe();
    let outcome = auction.service.delete_round(round).expect("delete should run");
    assert!(outcome.removed);
    let reversal = outcome.reversal.expect("completed round is reversed");
    assert!(reversal.completed);
    assert_eq!(reversal.settled.len(), 2);

    assert_eq!(auction.budget(a), before_a);
    assert_eq!(auction.budget(b), before_b);
    assert!(auction.registry.allocation(a, p1).is_none());
    assert!(auction.registry.allocation(b, p2).is_none());
    assert!(auction.service.ledger().bids_for_round(round).is_empty());
    assert!(matches!(
        auction.service.get_round(round),
        Err(AuctionError::RoundNotFound(_))
    ));

    let (topic, first) = events.try_recv().expect("reversal event published");
    assert_eq!(topic, round_topic(round));
    assert_eq!(first.kind, RoundEventKind::RoundReversed);
    let (_, second) = events.try_recv().expect("delete event published");
    assert_eq!(second.kind, RoundEventKind::RoundDeleted);
}

// =============================================================================
// Test: deleting a scheduled bulk round cascades without budget writes
// =============================================================================
#[test]
fn e2e_delete_scheduled_round_cascades() {
    let auction = Auction::new();
    let players = [auction.player("X", "DEF"), auction.player("Y", "DEF")];
    let mut request = auction.request(RoundType::Bulk);
    request.players = players
        .iter()
        .map(|p| RoundPlayerSpec {
            player_id: *p,
            player_name: "listed".into(),
            position: Some("DEF".into()),
        })
        .collect();
    let round = auction.service.create_round(request).unwrap();
    auction.set_status(round.id, RoundStatus::Scheduled);
    assert_eq!(auction.service.rounds().players(round.id).len(), 2);

    let outcome = auction.service.delete_round(round.id).unwrap();
    assert!(outcome.removed);
    assert!(outcome.reversal.is_none());
    assert!(auction.service.rounds().players(round.id).is_empty());
    assert_eq!(auction.budgets.applied_count(), 0);
}

// =============================================================================
// Test: bulk round marks listed players sold / unsold
// =============================================================================
#[test]
fn e2e_bulk_round_settles_listed_players() {
    let auction = Auction::new();
    let (taken, left) = (auction.player("Taken", "DEF"), auction.player("Left", "DEF"));
    let mut request = auction.request(RoundType::Bulk);
    request.players = [taken, left]
        .iter()
        .map(|p| RoundPlayerSpec {
            player_id: *p,
            player_name: "listed".into(),
            position: Some("DEF".into()),
        })
        .collect();
    let round = auction.service.create_round(request).unwrap();
    auction.set_status(round.id, RoundStatus::Active);

    let team = auction.team("Bulk FC", 100);
    auction.bid(round.id, team, taken, 10);
    auction.service.finalize(round.id).unwrap();

    let listed = auction.service.rounds().players(round.id);
    let status_of = |id: PlayerId| {
        listed
            .iter()
            .find(|p| p.player_id == id)
            .map(|p| p.status)
            .unwrap()
    };
    assert_eq!(status_of(taken), RoundPlayerStatus::Sold);
    assert_eq!(status_of(left), RoundPlayerStatus::Unsold);
    assert_eq!(auction.budget(team).budget, d(90));
}

// =============================================================================
// Test: partial failure, then recovery without double debit
// =============================================================================
#[test]
fn e2e_budget_failure_recovers_once() {
    let auction = Auction::new();
    let round = auction.active_round();
    let (good, flaky) = (auction.team("Good", 300), auction.team("Flaky", 300));
    auction.bid(round, good, auction.player("G", "MID"), 30);
    let flaky_bid = auction.bid(round, flaky, auction.player("F", "MID"), 70);

    auction.budgets.fail_for(flaky);
    let report = auction.service.finalize(round).unwrap();
    assert!(!report.completed);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].bid_id, flaky_bid);
    assert_eq!(
        auction.service.get_round(round).unwrap().status,
        RoundStatus::Active
    );
    assert_eq!(auction.budget(good).budget, d(270));

    // Still failing: recovery reports the same bid and changes nothing.
    let still = auction.service.recover();
    assert_eq!(still.len(), 1);
    assert!(!still[0].completed);
    assert_eq!(auction.budget(flaky).budget, d(300));

    auction.budgets.heal(flaky);
    let recovered = auction.service.recover();
    assert!(recovered[0].completed);
    assert_eq!(auction.budget(flaky).budget, d(230));
    assert_eq!(auction.budget(good).budget, d(270));
    assert_eq!(
        auction.service.get_round(round).unwrap().status,
        RoundStatus::Completed
    );

    // Nothing left to recover; a second finalize is refused.
    assert!(auction.service.recover().is_empty());
    assert!(matches!(
        auction.service.finalize(round),
        Err(AuctionError::RoundAlreadyFinalized(_))
    ));
}

// =============================================================================
// Test: concurrent bidding respects the per-team cap
// =============================================================================
#[test]
fn e2e_concurrent_bids_respect_cap() {
    let auction = Auction::new();
    let mut request = auction.request(RoundType::Single);
    request.max_bids_per_team = Some(3);
    let round = auction.service.create_round(request).unwrap().id;
    auction.set_status(round, RoundStatus::Active);
    let team = auction.team("Greedy", 10_000);

    let service = &auction.service;
    let accepted: usize = std::thread::scope(|s| {
        let handles: Vec<_> = (0..12)
            .map(|_| {
                s.spawn(move || {
                    service
                        .place_bid(round, team, PlayerId::new(), d(20))
                        .is_ok()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum()
    });
    assert_eq!(accepted, 3);
    assert_eq!(auction.service.ledger().pending_count(round, team), 3);
}

// =============================================================================
// Test: concurrent finalize passes on one round
// =============================================================================
#[test]
fn e2e_concurrent_finalize_settles_once() {
    let auction = Auction::new();
    let round = auction.active_round();
    let team = auction.team("Solo", 500);
    auction.bid(round, team, auction.player("P", "GK"), 55);

    let service = &auction.service;
    let results: Vec<Result<_>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..6).map(|_| s.spawn(move || service.finalize(round))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let completed = results
        .iter()
        .filter(|r| matches!(r, Ok(report) if report.completed))
        .count();
    assert_eq!(completed, 1);
    assert!(results.iter().all(|r| matches!(
        r,
        Ok(_) | Err(AuctionError::SettlementInProgress(_) | AuctionError::RoundAlreadyFinalized(_))
    )));
    assert_eq!(auction.budget(team).budget, d(445));
}

// =============================================================================
// Test: bids racing finalize either settle or are refused, never stranded
// =============================================================================
#[test]
fn e2e_bids_racing_finalize_are_settled_or_refused() {
    let auction = Auction::new();
    let round = auction.active_round();
    let entrants: Vec<(TeamId, PlayerId)> = (0..8)
        .map(|i| {
            (
                auction.team(&format!("Team {i}"), 1_000),
                auction.player(&format!("Player {i}"), "MID"),
            )
        })
        .collect();

    let service = &auction.service;
    let (outcomes, report) = std::thread::scope(|s| {
        let bidders: Vec<_> = entrants
            .iter()
            .map(|&(team, player)| s.spawn(move || service.place_bid(round, team, player, d(25))))
            .collect();
        let finalizer = s.spawn(move || service.finalize(round));
        let outcomes: Vec<_> = bidders.into_iter().map(|h| h.join().unwrap()).collect();
        (outcomes, finalizer.join().unwrap())
    });

    let report = report.expect("finalize should run");
    assert!(report.completed);
    let mut accepted = 0;
    for (outcome, &(team, player)) in outcomes.iter().zip(&entrants) {
        match outcome {
            Ok(bid) => {
                accepted += 1;
                assert_eq!(auction.bid_status(bid.id), BidStatus::Won);
                assert!(auction.registry.allocation(team, player).is_some());
                assert_eq!(auction.budget(team).budget, d(975));
            }
            Err(err) => {
                assert!(
                    matches!(
                        err,
                        AuctionError::BiddingClosed(_) | AuctionError::RoundNotActive { .. }
                    ),
                    "unexpected rejection: {err}"
                );
                assert!(auction.registry.allocation(team, player).is_none());
                assert_eq!(auction.budget(team).budget, d(1_000));
            }
        }
    }
    assert_eq!(report.settled.len(), accepted);
    assert!(auction
        .service
        .ledger()
        .bids_for_round(round)
        .iter()
        .all(|bid| bid.status != BidStatus::Pending));
}

// =============================================================================
// Test: deleting a round keeps zero position counts the record listed
// =============================================================================
#[test]
fn e2e_delete_restores_zero_seeded_position_counts() {
    let auction = Auction::new();
    let round = auction.active_round();
    let team = TeamId::new();
    let mut record = TeamBudget::new(team, auction.season, "Seeded", d(400));
    for position in ["DEF", "FWD", "GK", "MID"] {
        record.position_counts.insert(position.to_string(), 0);
    }
    auction.budgets.seed(record);
    let before = auction.budget(team);

    auction.bid(round, team, auction.player("Okafor", "FWD"), 110);
    auction.service.finalize(round).expect("finalize should run");
    assert_eq!(auction.budget(team).position_count("FWD"), 1);

    let outcome = auction.service.delete_round(round).expect("delete should run");
    assert!(outcome.removed);
    assert_eq!(auction.budget(team), before);
    assert!(auction.service.settler().intents().is_empty());
}

// =============================================================================
// Test: manual finalization previews, then applies
// =============================================================================
#[test]
fn e2e_preview_then_apply_pending_allocations() {
    let auction = Auction::new();
    let round = auction.active_round();
    let (a, b) = (auction.team("A", 500), auction.team("B", 500));
    let (p1, p2) = (auction.player("One", "GK"), auction.player("Two", "DEF"));
    auction.bid(round, a, p1, 150);
    auction.bid(round, b, p2, 90);
    auction.bid(round, a, p2, 80);

    let preview = auction
        .service
        .preview_finalization(round)
        .expect("preview should run");
    assert_eq!(preview.total_players, 2);
    assert_eq!(preview.total_spent, d(240));
    assert_eq!(preview.average_bid, d(120));
    assert_eq!(auction.budget(a).budget, d(500));
    assert!(auction.registry.allocation(a, p1).is_none());

    let report = auction
        .service
        .apply_pending_allocations(round)
        .expect("apply should run");
    assert!(report.completed);
    assert_eq!(report.per_team, preview.per_team);
    assert_eq!(auction.budget(a).budget, d(350));
    assert_eq!(auction.budget(b).budget, d(410));
    assert!(auction.registry.allocation(b, p2).is_some());
    assert!(matches!(
        auction.service.pending_allocations(round),
        Err(AuctionError::NoPendingAllocations(_))
    ));
}

// =============================================================================
// Test: subscribers see the round lifecycle in order
// =============================================================================
#[tokio::test]
async fn e2e_subscriber_sees_lifecycle_events() {
    let auction = Auction::new();
    let mut events = auction.notifier.subscribe();

    let round = auction.active_round();
    let team = auction.team("Listener", 200);
    auction.bid(round, team, auction.player("Q", "GK"), 25);
    auction.service.finalize(round).unwrap();

    let mut kinds = Vec::new();
    while let Ok((topic, event)) = events.recv().await {
        assert_eq!(topic, round_topic(round));
        kinds.push(event.kind);
        if event.kind == RoundEventKind::RoundFinalized {
            break;
        }
    }
    assert_eq!(
        kinds,
        vec![
            RoundEventKind::RoundCreated,
            RoundEventKind::RoundUpdated,
            RoundEventKind::RoundFinalized,
        ]
    );
}
