//! Tiebreaker store.
//!
//! Holds tiebreakers and their participant records. Two guarantees live
//! here rather than in the engine:
//!
//! - **Uniqueness**: at most one tiebreaker per (round, player). Inserting a
//!   second one reports the existing record instead.
//! - **Compare-and-swap**: submissions and withdrawals commit only if the
//!   caller read the current `version`; resolution commits only from an open
//!   status.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use sealdraft_types::{
    AuctionError, PlayerId, Result, RoundId, TeamId, TeamTiebreaker, TiebreakOutcome, Tiebreaker,
    TiebreakerId, TiebreakerStatus,
};

/// Result of [`TiebreakerStore::insert_unique`].
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Tiebreaker),
    Existing(Tiebreaker),
}

/// Result of [`TiebreakerStore::finish`].
#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// This call moved the tiebreaker to its terminal status.
    Committed(Tiebreaker),
    /// Another caller already finished it.
    AlreadyFinished(Tiebreaker),
}

#[derive(Default)]
struct TiebreakTables {
    tiebreakers: HashMap<TiebreakerId, Tiebreaker>,
    by_pair: HashMap<(RoundId, PlayerId), TiebreakerId>,
    participants: HashMap<TiebreakerId, Vec<TeamTiebreaker>>,
    next_sequence: u64,
}

impl TiebreakTables {
    fn tiebreaker_mut(&mut self, id: TiebreakerId) -> Result<&mut Tiebreaker> {
        self.tiebreakers
            .get_mut(&id)
            .ok_or(AuctionError::TiebreakerNotFound(id))
    }

    fn participant_mut(&mut self, id: TiebreakerId, team: TeamId) -> Result<&mut TeamTiebreaker> {
        self.participants
            .get_mut(&id)
            .and_then(|ps| ps.iter_mut().find(|p| p.team_id == team))
            .ok_or(AuctionError::NotTiebreakerParticipant { id, team })
    }
}

#[derive(Default)]
pub struct TiebreakerStore {
    inner: RwLock<TiebreakTables>,
}

impl TiebreakerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `tiebreaker` with its participants unless one already exists
    /// for the same (round, player).
    pub fn insert_unique(
        &self,
        tiebreaker: Tiebreaker,
        participants: Vec<TeamTiebreaker>,
    ) -> InsertOutcome {
        let mut tables = self.inner.write();
        let key = (tiebreaker.round_id, tiebreaker.player_id);
        if let Some(existing) = tables
            .by_pair
            .get(&key)
            .and_then(|id| tables.tiebreakers.get(id))
        {
            return InsertOutcome::Existing(existing.clone());
        }
        tables.by_pair.insert(key, tiebreaker.id);
        tables.participants.insert(tiebreaker.id, participants);
        tables.tiebreakers.insert(tiebreaker.id, tiebreaker.clone());
        InsertOutcome::Inserted(tiebreaker)
    }

    pub fn get(&self, id: TiebreakerId) -> Result<Tiebreaker> {
        self.inner
            .read()
            .tiebreakers
            .get(&id)
            .cloned()
            .ok_or(AuctionError::TiebreakerNotFound(id))
    }

    /// A consistent read of a tiebreaker and its participants.
    pub fn snapshot(&self, id: TiebreakerId) -> Result<(Tiebreaker, Vec<TeamTiebreaker>)> {
        let tables = self.inner.read();
        let tb = tables
            .tiebreakers
            .get(&id)
            .cloned()
            .ok_or(AuctionError::TiebreakerNotFound(id))?;
        let participants = tables.participants.get(&id).cloned().unwrap_or_default();
        Ok((tb, participants))
    }

    #[must_use]
    pub fn find(&self, round_id: RoundId, player_id: PlayerId) -> Option<Tiebreaker> {
        let tables = self.inner.read();
        tables
            .by_pair
            .get(&(round_id, player_id))
            .and_then(|id| tables.tiebreakers.get(id))
            .cloned()
    }

    /// Tiebreakers of a round, oldest first.
    #[must_use]
    pub fn for_round(&self, round_id: RoundId) -> Vec<Tiebreaker> {
        let mut out: Vec<Tiebreaker> = self
            .inner
            .read()
            .tiebreakers
            .values()
            .filter(|tb| tb.round_id == round_id)
            .cloned()
            .collect();
        out.sort_by_key(|tb| tb.id);
        out
    }

    /// Active tiebreakers whose timer has run out at `now`.
    #[must_use]
    pub fn due(&self, now: DateTime<Utc>) -> Vec<TiebreakerId> {
        let mut due: Vec<TiebreakerId> = self
            .inner
            .read()
            .tiebreakers
            .values()
            .filter(|tb| tb.status == TiebreakerStatus::Active && tb.is_expired_at(now))
            .map(|tb| tb.id)
            .collect();
        due.sort();
        due
    }

    /// Pending or active tiebreakers in a round.
    #[must_use]
    pub fn unresolved_count(&self, round_id: RoundId) -> usize {
        self.inner
            .read()
            .tiebreakers
            .values()
            .filter(|tb| tb.round_id == round_id && tb.status.is_open())
            .count()
    }

    /// `pending → active`. Already-active tiebreakers are returned as is.
    pub fn activate(&self, id: TiebreakerId, expires_at: Option<DateTime<Utc>>) -> Result<Tiebreaker> {
        let mut tables = self.inner.write();
        let tb = tables.tiebreaker_mut(id)?;
        match tb.status {
            TiebreakerStatus::Pending => {
                tb.status = TiebreakerStatus::Active;
                tb.expires_at = expires_at;
                tb.version += 1;
                Ok(tb.clone())
            }
            TiebreakerStatus::Active => Ok(tb.clone()),
            status => Err(AuctionError::TiebreakerWrongStatus {
                id,
                status,
                expected: TiebreakerStatus::Pending,
            }),
        }
    }

    /// Commit a submission if the tiebreaker is still at `expected_version`.
    pub fn record_submission(
        &self,
        id: TiebreakerId,
        expected_version: u64,
        team: TeamId,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Tiebreaker> {
        let mut tables = self.inner.write();
        let sequence = tables.next_sequence;

        let tb = tables.tiebreaker_mut(id)?;
        if tb.version != expected_version {
            return Err(AuctionError::StaleTiebreaker {
                id,
                expected: expected_version,
            });
        }
        if tb.status != TiebreakerStatus::Active {
            return Err(AuctionError::TiebreakerWrongStatus {
                id,
                status: tb.status,
                expected: TiebreakerStatus::Active,
            });
        }
        let minimum = tb.floor();
        if amount <= minimum {
            return Err(AuctionError::SubmissionTooLow {
                minimum,
                offered: amount,
            });
        }

        let participant = tables.participant_mut(id, team)?;
        if participant.withdrawn {
            return Err(AuctionError::AlreadyWithdrawn(team));
        }
        participant.new_bid_amount = Some(amount);
        participant.submitted = true;
        participant.submitted_at = Some(at);
        participant.sequence = Some(sequence);

        tables.next_sequence += 1;
        let tb = tables.tiebreaker_mut(id)?;
        tb.highest_amount = Some(amount);
        tb.highest_team_id = Some(team);
        tb.version += 1;
        Ok(tb.clone())
    }

    /// Commit a withdrawal if the tiebreaker is still at `expected_version`.
    /// Returns the updated tiebreaker and participants.
    pub fn record_withdrawal(
        &self,
        id: TiebreakerId,
        expected_version: u64,
        team: TeamId,
    ) -> Result<(Tiebreaker, Vec<TeamTiebreaker>)> {
        let mut tables = self.inner.write();
        let tb = tables.tiebreaker_mut(id)?;
        if tb.version != expected_version {
            return Err(AuctionError::StaleTiebreaker {
                id,
                expected: expected_version,
            });
        }
        if tb.status != TiebreakerStatus::Active {
            return Err(AuctionError::TiebreakerWrongStatus {
                id,
                status: tb.status,
                expected: TiebreakerStatus::Active,
            });
        }
        if tb.highest_team_id == Some(team) {
            return Err(AuctionError::HighestBidderCannotWithdraw);
        }

        let participant = tables.participant_mut(id, team)?;
        if participant.withdrawn {
            return Err(AuctionError::AlreadyWithdrawn(team));
        }
        participant.withdrawn = true;

        let tb = tables.tiebreaker_mut(id)?;
        tb.version += 1;
        let tb = tb.clone();
        let participants = tables.participants.get(&id).cloned().unwrap_or_default();
        Ok((tb, participants))
    }

    /// Move an open tiebreaker to the terminal status `outcome` implies.
    ///
    /// Exactly one concurrent caller commits; the rest get
    /// [`FinishOutcome::AlreadyFinished`] with the committed record. An open
    /// tiebreaker that moved past `expected_version` (a submission or
    /// withdrawal landed after the caller decided) is reported stale.
    pub fn finish(
        &self,
        id: TiebreakerId,
        expected_version: u64,
        outcome: &TiebreakOutcome,
        at: DateTime<Utc>,
    ) -> Result<FinishOutcome> {
        let mut tables = self.inner.write();
        let tb = tables.tiebreaker_mut(id)?;
        if !tb.status.is_open() {
            return Ok(FinishOutcome::AlreadyFinished(tb.clone()));
        }
        if tb.version != expected_version {
            return Err(AuctionError::StaleTiebreaker {
                id,
                expected: expected_version,
            });
        }
        let target = match outcome {
            TiebreakOutcome::Resolved { .. } => TiebreakerStatus::Resolved,
            TiebreakOutcome::Excluded => TiebreakerStatus::Excluded,
        };
        if !tb.status.can_transition_to(target) {
            return Err(AuctionError::TiebreakerWrongStatus {
                id,
                status: tb.status,
                expected: TiebreakerStatus::Active,
            });
        }

        tb.status = target;
        if let TiebreakOutcome::Resolved {
            winner_team_id,
            amount,
            ..
        } = outcome
        {
            tb.winner_team_id = Some(*winner_team_id);
            tb.winning_amount = Some(*amount);
        }
        tb.resolved_at = Some(at);
        tb.version += 1;
        Ok(FinishOutcome::Committed(tb.clone()))
    }

    /// Remove every tiebreaker of a round. Returns how many were removed.
    pub fn delete_for_round(&self, round_id: RoundId) -> usize {
        let mut tables = self.inner.write();
        let ids: Vec<TiebreakerId> = tables
            .tiebreakers
            .values()
            .filter(|tb| tb.round_id == round_id)
            .map(|tb| tb.id)
            .collect();
        for id in &ids {
            tables.tiebreakers.remove(id);
            tables.participants.remove(id);
        }
        tables.by_pair.retain(|(r, _), _| *r != round_id);
        ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealdraft_types::BidId;

    fn new_tb(round: RoundId, player: PlayerId) -> Tiebreaker {
        Tiebreaker {
            id: TiebreakerId::new(),
            round_id: round,
            player_id: player,
            tie_amount: Decimal::new(100, 0),
            status: TiebreakerStatus::Pending,
            highest_amount: None,
            highest_team_id: None,
            winner_team_id: None,
            winning_amount: None,
            version: 0,
            expires_at: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    fn seeded() -> (TiebreakerStore, Tiebreaker, TeamId, TeamId) {
        let store = TiebreakerStore::new();
        let tb = new_tb(RoundId::new(), PlayerId::new());
        let (a, b) = (TeamId::new(), TeamId::new());
        let parts = vec![
            TeamTiebreaker::new(tb.id, a, BidId::new()),
            TeamTiebreaker::new(tb.id, b, BidId::new()),
        ];
        store.insert_unique(tb.clone(), parts);
        let tb = store.activate(tb.id, None).unwrap();
        (store, tb, a, b)
    }

    #[test]
    fn insert_unique_reports_existing() {
        let store = TiebreakerStore::new();
        let (round, player) = (RoundId::new(), PlayerId::new());
        let first = new_tb(round, player);
        assert!(matches!(
            store.insert_unique(first.clone(), Vec::new()),
            InsertOutcome::Inserted(_)
        ));
        match store.insert_unique(new_tb(round, player), Vec::new()) {
            InsertOutcome::Existing(existing) => assert_eq!(existing.id, first.id),
            InsertOutcome::Inserted(_) => panic!("second tiebreaker inserted"),
        }
        assert_eq!(store.for_round(round).len(), 1);
    }

    #[test]
    fn submission_is_compare_and_swap() {
        let (store, tb, a, b) = seeded();
        let now = Utc::now();
        let after = store
            .record_submission(tb.id, tb.version, a, Decimal::new(120, 0), now)
            .unwrap();
        assert_eq!(after.highest_team_id, Some(a));

        // Stale version loses.
        let err = store
            .record_submission(tb.id, tb.version, b, Decimal::new(130, 0), now)
            .unwrap_err();
        assert!(matches!(err, AuctionError::StaleTiebreaker { .. }));
    }

    #[test]
    fn submission_must_exceed_floor() {
        let (store, tb, a, _) = seeded();
        let err = store
            .record_submission(tb.id, tb.version, a, Decimal::new(100, 0), Utc::now())
            .unwrap_err();
        assert!(matches!(err, AuctionError::SubmissionTooLow { .. }));
    }

    #[test]
    fn sequence_is_monotonic() {
        let (store, tb, a, b) = seeded();
        let now = Utc::now();
        let v1 = store
            .record_submission(tb.id, tb.version, a, Decimal::new(110, 0), now)
            .unwrap();
        store
            .record_submission(tb.id, v1.version, b, Decimal::new(120, 0), now)
            .unwrap();
        let (_, parts) = store.snapshot(tb.id).unwrap();
        let seq_a = parts.iter().find(|p| p.team_id == a).unwrap().sequence.unwrap();
        let seq_b = parts.iter().find(|p| p.team_id == b).unwrap().sequence.unwrap();
        assert!(seq_a < seq_b);
    }

    #[test]
    fn highest_cannot_withdraw() {
        let (store, tb, a, _) = seeded();
        let tb = store
            .record_submission(tb.id, tb.version, a, Decimal::new(120, 0), Utc::now())
            .unwrap();
        let err = store.record_withdrawal(tb.id, tb.version, a).unwrap_err();
        assert!(matches!(err, AuctionError::HighestBidderCannotWithdraw));
        assert_eq!(store.get(tb.id).unwrap(), tb);
    }

    #[test]
    fn non_participant_rejected() {
        let (store, tb, _, _) = seeded();
        let err = store
            .record_withdrawal(tb.id, tb.version, TeamId::new())
            .unwrap_err();
        assert!(matches!(err, AuctionError::NotTiebreakerParticipant { .. }));
    }

    #[test]
    fn finish_commits_once() {
        let (store, tb, a, _) = seeded();
        let outcome = TiebreakOutcome::Resolved {
            winner_team_id: a,
            winning_bid_id: BidId::new(),
            amount: Decimal::new(100, 0),
        };
        assert!(matches!(
            store.finish(tb.id, tb.version, &outcome, Utc::now()).unwrap(),
            FinishOutcome::Committed(_)
        ));
        match store.finish(tb.id, 0, &TiebreakOutcome::Excluded, Utc::now()).unwrap() {
            FinishOutcome::AlreadyFinished(done) => {
                assert_eq!(done.status, TiebreakerStatus::Resolved);
                assert_eq!(done.winner_team_id, Some(a));
            }
            FinishOutcome::Committed(_) => panic!("finished twice"),
        }
        assert_eq!(store.unresolved_count(tb.round_id), 0);
    }

    #[test]
    fn pending_cannot_resolve_but_can_exclude() {
        let store = TiebreakerStore::new();
        let tb = new_tb(RoundId::new(), PlayerId::new());
        store.insert_unique(tb.clone(), Vec::new());
        let resolved = TiebreakOutcome::Resolved {
            winner_team_id: TeamId::new(),
            winning_bid_id: BidId::new(),
            amount: Decimal::ONE,
        };
        assert!(store.finish(tb.id, tb.version, &resolved, Utc::now()).is_err());
        assert!(matches!(
            store.finish(tb.id, tb.version, &TiebreakOutcome::Excluded, Utc::now()).unwrap(),
            FinishOutcome::Committed(_)
        ));
    }

    #[test]
    fn delete_for_round_frees_the_pair() {
        let store = TiebreakerStore::new();
        let (round, player) = (RoundId::new(), PlayerId::new());
        store.insert_unique(new_tb(round, player), Vec::new());
        assert_eq!(store.delete_for_round(round), 1);
        assert!(store.find(round, player).is_none());
    }
}
