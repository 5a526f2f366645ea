//! Round store: rounds, bulk-round player lists, and the status machine.
//!
//! Every write happens under one `RwLock` write guard and is committed before
//! any event is published. The notifier is never called with the lock held.
//!
//! Each round also has an admission gate. Bid inserts and cancellations run
//! with it held shared ([`RoundStore::with_admission`]); `close_bidding` and
//! `complete` take it exclusively, so they wait for in-flight inserts and no
//! bid lands after bidding closes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use sealdraft_types::{
    AuctionError, NewRound, Notifier, PlayerId, Result, Round, RoundEvent, RoundEventKind,
    RoundId, RoundPatch, RoundPlayer, RoundPlayerStatus, RoundStatus, RoundType, SeasonId, TeamId,
};

#[derive(Default)]
struct RoundTables {
    rounds: HashMap<RoundId, Round>,
    players: HashMap<RoundId, Vec<RoundPlayer>>,
}

/// Thread-safe store of rounds and their listed players.
pub struct RoundStore {
    inner: RwLock<RoundTables>,
    gates: Mutex<HashMap<RoundId, Arc<RwLock<()>>>>,
    notifier: Arc<dyn Notifier>,
}

impl RoundStore {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: RwLock::new(RoundTables::default()),
            gates: Mutex::new(HashMap::new()),
            notifier,
        }
    }

    /// Validate and insert a new round in `draft`.
    pub fn create(&self, new: NewRound) -> Result<Round> {
        validate_new_round(&new)?;

        let now = Utc::now();
        let round = Round {
            id: RoundId::new(),
            season_id: new.season_id,
            round_type: new.round_type,
            position: new.position,
            position_group: new.position_group,
            status: RoundStatus::Draft,
            start_time: new.start_time,
            end_time: new.end_time,
            base_price: new.base_price,
            duration_seconds: new.duration_seconds,
            max_bids_per_team: new.max_bids_per_team,
            bidding_closed: false,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let players: Vec<RoundPlayer> = new
            .players
            .into_iter()
            .map(|listing| RoundPlayer {
                round_id: round.id,
                player_id: listing.player_id,
                player_name: listing.player_name,
                position: listing.position,
                status: RoundPlayerStatus::Pending,
                winning_team_id: None,
                winning_bid: None,
            })
            .collect();

        {
            let mut tables = self.inner.write();
            tables.rounds.insert(round.id, round.clone());
            if !players.is_empty() {
                tables.players.insert(round.id, players);
            }
        }

        tracing::info!(round = %round.id, round_type = %round.round_type, "round created");
        self.publish(RoundEventKind::RoundCreated, &round);
        Ok(round)
    }

    pub fn get(&self, id: RoundId) -> Result<Round> {
        self.inner
            .read()
            .rounds
            .get(&id)
            .cloned()
            .ok_or(AuctionError::RoundNotFound(id))
    }

    /// Rounds of a season, oldest first.
    #[must_use]
    pub fn list(&self, season_id: SeasonId) -> Vec<Round> {
        let mut rounds: Vec<Round> = self
            .inner
            .read()
            .rounds
            .values()
            .filter(|r| r.season_id == season_id)
            .cloned()
            .collect();
        rounds.sort_by_key(|r| r.id);
        rounds
    }

    /// Players listed in a bulk round. Empty for single rounds.
    #[must_use]
    pub fn players(&self, round_id: RoundId) -> Vec<RoundPlayer> {
        self.inner
            .read()
            .players
            .get(&round_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_listed(&self, round_id: RoundId, player_id: PlayerId) -> bool {
        self.inner
            .read()
            .players
            .get(&round_id)
            .is_some_and(|ps| ps.iter().any(|p| p.player_id == player_id))
    }

    /// Apply a sparse patch in one write.
    ///
    /// # Errors
    /// - [`AuctionError::EmptyPatch`] if the patch sets nothing
    /// - [`AuctionError::RoundAlreadyFinalized`] for completed rounds
    /// - [`AuctionError::IllegalRoundTransition`] for a status the round cannot
    ///   move to; `completed` is only reachable through finalization
    pub fn update(&self, id: RoundId, patch: &RoundPatch) -> Result<Round> {
        if patch.is_empty() {
            return Err(AuctionError::EmptyPatch);
        }
        if let Some(price) = patch.base_price {
            if price <= Decimal::ZERO {
                return Err(AuctionError::InvalidRound {
                    reason: "base_price must be positive".into(),
                });
            }
        }

        let (updated, time_extended) = {
            let mut tables = self.inner.write();
            let round = tables
                .rounds
                .get_mut(&id)
                .ok_or(AuctionError::RoundNotFound(id))?;

            if round.status == RoundStatus::Completed {
                return Err(AuctionError::RoundAlreadyFinalized(id));
            }
            if let Some(target) = patch.status {
                let legal = target == round.status
                    || (target != RoundStatus::Completed && round.status.can_transition_to(target));
                if !legal {
                    return Err(AuctionError::IllegalRoundTransition {
                        from: round.status,
                        to: target,
                    });
                }
            }
            let start = patch.start_time.or(round.start_time);
            let end = patch.end_time.or(round.end_time);
            check_window(start, end)?;

            let time_extended = patch.end_time.is_some_and(|t| Some(t) != round.end_time);

            if let Some(status) = patch.status {
                round.status = status;
            }
            round.start_time = start;
            round.end_time = end;
            if let Some(price) = patch.base_price {
                round.base_price = price;
            }
            if let Some(secs) = patch.duration_seconds {
                round.duration_seconds = Some(secs);
            }
            if let Some(position) = &patch.position {
                round.position = Some(position.clone());
            }
            if let Some(group) = &patch.position_group {
                round.position_group = Some(group.clone());
            }
            round.version += 1;
            round.updated_at = Utc::now();
            (round.clone(), time_extended)
        };

        tracing::info!(
            round = %id,
            fields = ?patch.field_names(),
            status = %updated.status,
            "round updated"
        );
        let kind = if time_extended {
            RoundEventKind::RoundTimeExtended
        } else {
            RoundEventKind::RoundUpdated
        };
        self.publish(kind, &updated);
        Ok(updated)
    }

    /// Stop accepting bids. Idempotent on active rounds; a completed round
    /// is returned unchanged.
    pub fn close_bidding(&self, id: RoundId) -> Result<Round> {
        let gate = self.gate(id)?;
        let _exclusive = gate.write();
        let mut tables = self.inner.write();
        let round = tables
            .rounds
            .get_mut(&id)
            .ok_or(AuctionError::RoundNotFound(id))?;
        match round.status {
            RoundStatus::Active if !round.bidding_closed => {
                round.bidding_closed = true;
                round.version += 1;
                round.updated_at = Utc::now();
                tracing::info!(round = %id, "bidding closed");
                Ok(round.clone())
            }
            RoundStatus::Active | RoundStatus::Completed => Ok(round.clone()),
            status => Err(AuctionError::RoundNotActive { round_id: id, status }),
        }
    }

    /// Compare-and-set `active → completed`. Publishes `round_finalized`.
    pub fn complete(&self, id: RoundId) -> Result<Round> {
        let gate = self.gate(id)?;
        let _exclusive = gate.write();
        let completed = {
            let mut tables = self.inner.write();
            let round = tables
                .rounds
                .get_mut(&id)
                .ok_or(AuctionError::RoundNotFound(id))?;
            match round.status {
                RoundStatus::Active => {}
                RoundStatus::Completed => return Err(AuctionError::RoundAlreadyFinalized(id)),
                status => return Err(AuctionError::RoundNotActive { round_id: id, status }),
            }
            round.status = RoundStatus::Completed;
            round.bidding_closed = true;
            round.version += 1;
            round.updated_at = Utc::now();
            round.clone()
        };
        tracing::info!(round = %id, "round completed");
        self.publish(RoundEventKind::RoundFinalized, &completed);
        Ok(completed)
    }

    /// Remove the round and its player list if `check` accepts it.
    ///
    /// The check and the removal happen under one write guard, so a status
    /// change cannot slip in between.
    pub fn remove_if<F>(&self, id: RoundId, check: F) -> Result<Round>
    where
        F: FnOnce(&Round) -> Result<()>,
    {
        let mut tables = self.inner.write();
        let round = tables.rounds.get(&id).ok_or(AuctionError::RoundNotFound(id))?;
        check(round)?;
        tables.players.remove(&id);
        let removed = tables
            .rounds
            .remove(&id)
            .ok_or(AuctionError::RoundNotFound(id))?;
        self.gates.lock().remove(&id);
        tracing::info!(round = %id, status = %removed.status, "round removed");
        Ok(removed)
    }

    /// Record the outcome for a listed player: `Some` sells it, `None` marks
    /// it unsold.
    pub fn settle_round_player(
        &self,
        round_id: RoundId,
        player_id: PlayerId,
        winner: Option<(TeamId, Decimal)>,
    ) -> Result<()> {
        let mut tables = self.inner.write();
        let player = tables
            .players
            .get_mut(&round_id)
            .and_then(|ps| ps.iter_mut().find(|p| p.player_id == player_id))
            .ok_or(AuctionError::PlayerNotFound(player_id))?;
        match winner {
            Some((team, amount)) => {
                player.status = RoundPlayerStatus::Sold;
                player.winning_team_id = Some(team);
                player.winning_bid = Some(amount);
            }
            None => {
                player.status = RoundPlayerStatus::Unsold;
                player.winning_team_id = None;
                player.winning_bid = None;
            }
        }
        Ok(())
    }

    /// Run `admit` against the current round with its admission gate held
    /// shared.
    ///
    /// The round passed to `admit` is read after the gate is taken, so a
    /// check made on it still holds when `admit` returns.
    pub fn with_admission<T, F>(&self, id: RoundId, admit: F) -> Result<T>
    where
        F: FnOnce(&Round) -> Result<T>,
    {
        let gate = self.gate(id)?;
        let _shared = gate.read();
        let round = self.get(id)?;
        admit(&round)
    }

    fn gate(&self, id: RoundId) -> Result<Arc<RwLock<()>>> {
        if !self.inner.read().rounds.contains_key(&id) {
            return Err(AuctionError::RoundNotFound(id));
        }
        Ok(Arc::clone(self.gates.lock().entry(id).or_default()))
    }

    /// Publish an event for `round` on its topic.
    pub fn publish(&self, kind: RoundEventKind, round: &Round) {
        let event = RoundEvent {
            kind,
            round_id: round.id,
            status: round.status,
            end_time: round.end_time,
            position: round.position.clone(),
        };
        self.notifier.publish(&event.topic(), &event);
    }
}

fn validate_new_round(new: &NewRound) -> Result<()> {
    let invalid = |reason: &str| -> Result<()> {
        Err(AuctionError::InvalidRound {
            reason: reason.to_string(),
        })
    };
    if new.base_price <= Decimal::ZERO {
        return invalid("base_price must be positive");
    }
    if new.max_bids_per_team == 0 {
        return invalid("max_bids_per_team must be at least 1");
    }
    match new.round_type {
        RoundType::Bulk if new.players.is_empty() => {
            return invalid("bulk rounds must list at least one player");
        }
        RoundType::Single if !new.players.is_empty() => {
            return invalid("single rounds do not list players");
        }
        _ => {}
    }
    let mut seen = std::collections::HashSet::new();
    if !new.players.iter().all(|p| seen.insert(p.player_id)) {
        return invalid("player listed twice");
    }
    check_window(new.start_time, new.end_time)
}

fn check_window(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<()> {
    match (start, end) {
        (Some(s), Some(e)) if e <= s => Err(AuctionError::InvalidRound {
            reason: "end_time must be after start_time".into(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealdraft_types::NoopNotifier;

    fn store() -> RoundStore {
        RoundStore::new(Arc::new(NoopNotifier))
    }

    fn single(store: &RoundStore) -> Round {
        store
            .create(NewRound::dummy_single(SeasonId::new(), Decimal::new(10, 0), 3))
            .unwrap()
    }

    fn activate(store: &RoundStore, id: RoundId) -> Round {
        store
            .update(
                id,
                &RoundPatch {
                    status: Some(RoundStatus::Active),
                    ..RoundPatch::default()
                },
            )
            .unwrap()
    }

    #[test]
    fn close_bidding_waits_for_admitted_work() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::mpsc;

        let store = &store();
        let id = single(store).id;
        activate(store, id);
        let closed = &AtomicBool::new(false);
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        std::thread::scope(|s| {
            s.spawn(move || {
                store
                    .with_admission(id, |round| {
                        assert!(!round.bidding_closed);
                        held_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok(())
                    })
                    .unwrap();
            });
            held_rx.recv().unwrap();

            let closer = s.spawn(move || {
                store.close_bidding(id).unwrap();
                closed.store(true, Ordering::SeqCst);
            });
            std::thread::sleep(std::time::Duration::from_millis(50));
            assert!(!closed.load(Ordering::SeqCst));

            release_tx.send(()).unwrap();
            closer.join().unwrap();
        });
        assert!(closed.load(Ordering::SeqCst));
        store
            .with_admission(id, |round| {
                assert!(round.bidding_closed);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn admission_on_missing_round() {
        let store = store();
        let err = store.with_admission(RoundId::new(), |_| Ok(())).unwrap_err();
        assert!(matches!(err, AuctionError::RoundNotFound(_)));
    }

    #[test]
    fn create_starts_in_draft() {
        let store = store();
        let round = single(&store);
        assert_eq!(round.status, RoundStatus::Draft);
        assert_eq!(store.get(round.id).unwrap(), round);
    }

    #[test]
    fn create_validates() {
        let store = store();
        let mut bad = NewRound::dummy_single(SeasonId::new(), Decimal::ZERO, 3);
        assert!(matches!(store.create(bad.clone()), Err(AuctionError::InvalidRound { .. })));
        bad.base_price = Decimal::ONE;
        bad.max_bids_per_team = 0;
        assert!(store.create(bad).is_err());

        let mut bulk = NewRound::dummy_bulk(SeasonId::new(), Decimal::ONE, &[PlayerId::new()]);
        bulk.players.clear();
        assert!(store.create(bulk).is_err());
    }

    #[test]
    fn create_bulk_lists_players() {
        let store = store();
        let ids = [PlayerId::new(), PlayerId::new()];
        let round = store
            .create(NewRound::dummy_bulk(SeasonId::new(), Decimal::new(5, 0), &ids))
            .unwrap();
        let players = store.players(round.id);
        assert_eq!(players.len(), 2);
        assert!(players.iter().all(|p| p.status == RoundPlayerStatus::Pending));
        assert!(store.is_listed(round.id, ids[1]));
        assert!(!store.is_listed(round.id, PlayerId::new()));
    }

    #[test]
    fn empty_patch_rejected() {
        let store = store();
        let round = single(&store);
        let err = store.update(round.id, &RoundPatch::default()).unwrap_err();
        assert!(matches!(err, AuctionError::EmptyPatch));
    }

    #[test]
    fn patch_applies_all_fields() {
        let store = store();
        let round = single(&store);
        let end = Utc::now() + chrono::Duration::hours(1);
        let patch = RoundPatch {
            status: Some(RoundStatus::Scheduled),
            end_time: Some(end),
            base_price: Some(Decimal::new(20, 0)),
            position: Some("GK".into()),
            ..RoundPatch::default()
        };
        let updated = store.update(round.id, &patch).unwrap();
        assert_eq!(updated.status, RoundStatus::Scheduled);
        assert_eq!(updated.end_time, Some(end));
        assert_eq!(updated.base_price, Decimal::new(20, 0));
        assert_eq!(updated.position.as_deref(), Some("GK"));
        assert_eq!(updated.version, round.version + 1);
    }

    #[test]
    fn patch_cannot_complete() {
        let store = store();
        let round = single(&store);
        activate(&store, round.id);
        let err = store
            .update(
                round.id,
                &RoundPatch {
                    status: Some(RoundStatus::Completed),
                    ..RoundPatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, AuctionError::IllegalRoundTransition { .. }));
    }

    #[test]
    fn patch_rejects_backwards_transition() {
        let store = store();
        let round = single(&store);
        activate(&store, round.id);
        let err = store
            .update(
                round.id,
                &RoundPatch {
                    status: Some(RoundStatus::Draft),
                    ..RoundPatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AuctionError::IllegalRoundTransition {
                from: RoundStatus::Active,
                to: RoundStatus::Draft
            }
        ));
    }

    #[test]
    fn failed_patch_changes_nothing() {
        let store = store();
        let round = single(&store);
        let start = Utc::now();
        let patch = RoundPatch {
            base_price: Some(Decimal::new(99, 0)),
            start_time: Some(start),
            end_time: Some(start - chrono::Duration::minutes(1)),
            ..RoundPatch::default()
        };
        assert!(store.update(round.id, &patch).is_err());
        assert_eq!(store.get(round.id).unwrap(), round);
    }

    #[test]
    fn close_bidding_is_idempotent() {
        let store = store();
        let round = single(&store);
        assert!(store.close_bidding(round.id).is_err());
        activate(&store, round.id);
        let first = store.close_bidding(round.id).unwrap();
        let second = store.close_bidding(round.id).unwrap();
        assert!(first.bidding_closed);
        assert_eq!(first.version, second.version);
    }

    #[test]
    fn complete_is_compare_and_set() {
        let store = store();
        let round = single(&store);
        assert!(matches!(
            store.complete(round.id),
            Err(AuctionError::RoundNotActive { .. })
        ));
        activate(&store, round.id);
        store.complete(round.id).unwrap();
        assert!(matches!(
            store.complete(round.id),
            Err(AuctionError::RoundAlreadyFinalized(_))
        ));
    }

    #[test]
    fn completed_round_rejects_patch() {
        let store = store();
        let round = single(&store);
        activate(&store, round.id);
        store.complete(round.id).unwrap();
        let err = store
            .update(
                round.id,
                &RoundPatch {
                    position: Some("FWD".into()),
                    ..RoundPatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, AuctionError::RoundAlreadyFinalized(_)));
    }

    #[test]
    fn remove_if_respects_check() {
        let store = store();
        let round = single(&store);
        let err = store
            .remove_if(round.id, |_| Err(AuctionError::RoundInProgress(round.id)))
            .unwrap_err();
        assert!(matches!(err, AuctionError::RoundInProgress(_)));
        assert!(store.get(round.id).is_ok());

        store.remove_if(round.id, |_| Ok(())).unwrap();
        assert!(matches!(store.get(round.id), Err(AuctionError::RoundNotFound(_))));
    }

    #[test]
    fn settle_round_player_marks_outcome() {
        let store = store();
        let ids = [PlayerId::new(), PlayerId::new()];
        let round = store
            .create(NewRound::dummy_bulk(SeasonId::new(), Decimal::new(5, 0), &ids))
            .unwrap();
        let team = TeamId::new();
        store
            .settle_round_player(round.id, ids[0], Some((team, Decimal::new(5, 0))))
            .unwrap();
        store.settle_round_player(round.id, ids[1], None).unwrap();
        let players = store.players(round.id);
        assert_eq!(players[0].status, RoundPlayerStatus::Sold);
        assert_eq!(players[0].winning_team_id, Some(team));
        assert_eq!(players[1].status, RoundPlayerStatus::Unsold);
    }
}
