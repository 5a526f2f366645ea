//! Submission ordering and the resolution rule.
//!
//! Ranking: highest `new_bid_amount` first, then earliest `submitted_at`,
//! then lowest store `sequence`. Withdrawn and unsubmitted participants
//! never rank, so a tiebreaker nobody submitted to has no winner.

use std::cmp::Ordering;

use sealdraft_types::{TeamTiebreaker, TiebreakOutcome};

/// Compare two submitted participants; the better one orders first.
#[must_use]
pub fn compare_submissions(a: &TeamTiebreaker, b: &TeamTiebreaker) -> Ordering {
    b.new_bid_amount
        .cmp(&a.new_bid_amount)
        .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        .then_with(|| a.sequence.cmp(&b.sequence))
}

/// Submitted, non-withdrawn participants, best first.
#[must_use]
pub fn ranked(participants: &[TeamTiebreaker]) -> Vec<&TeamTiebreaker> {
    let mut ranked: Vec<&TeamTiebreaker> = participants
        .iter()
        .filter(|p| p.submitted && !p.withdrawn && p.new_bid_amount.is_some())
        .collect();
    ranked.sort_by(|a, b| compare_submissions(a, b));
    ranked
}

/// Every participant in display order: ranked submissions, then active
/// participants that have not submitted, then withdrawn ones.
#[must_use]
pub fn display_order(participants: &[TeamTiebreaker]) -> Vec<TeamTiebreaker> {
    let mut out: Vec<TeamTiebreaker> = ranked(participants).into_iter().cloned().collect();
    out.extend(
        participants
            .iter()
            .filter(|p| !p.withdrawn && !p.submitted)
            .cloned(),
    );
    out.extend(participants.iter().filter(|p| p.withdrawn).cloned());
    out
}

/// Decide the outcome of a tiebreaker from its participants.
///
/// The best submission wins at its amount. Without any submission the
/// tiebreaker is excluded, whoever is left.
#[must_use]
pub fn decide(participants: &[TeamTiebreaker]) -> TiebreakOutcome {
    ranked(participants)
        .first()
        .and_then(|best| {
            best.new_bid_amount.map(|amount| TiebreakOutcome::Resolved {
                winner_team_id: best.team_id,
                winning_bid_id: best.original_bid_id,
                amount,
            })
        })
        .unwrap_or(TiebreakOutcome::Excluded)
}

/// Whether a withdrawal leaves nothing to contest: nobody is left, or the
/// only one left holds a submission.
#[must_use]
pub fn settled_by_withdrawals(participants: &[TeamTiebreaker]) -> bool {
    let mut active = participants.iter().filter(|p| p.is_active());
    match (active.next(), active.next()) {
        (None, _) => true,
        (Some(last), None) => last.submitted,
        _ => false,
    }
}
