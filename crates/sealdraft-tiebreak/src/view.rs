//! Read model of a tiebreaker as one team sees it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sealdraft_types::{TeamId, TeamTiebreaker, Tiebreaker, TiebreakerStatus};

use crate::ranking;

/// What the calling team may do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerStatus {
    pub team_id: TeamId,
    pub can_bid: bool,
    pub can_withdraw: bool,
    pub is_highest: bool,
    pub withdrawn: bool,
    pub current_amount: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiebreakerView {
    pub tiebreaker: Tiebreaker,
    /// Participants in ranking order; withdrawn teams last.
    pub submissions: Vec<TeamTiebreaker>,
    /// A new submission must be strictly greater than this.
    pub minimum_to_beat: Decimal,
    pub active_participants: usize,
    /// `None` when the caller is not a participant or no team was given.
    pub caller: Option<CallerStatus>,
}

impl TiebreakerView {
    #[must_use]
    pub fn build(tiebreaker: Tiebreaker, participants: &[TeamTiebreaker], caller: Option<TeamId>) -> Self {
        let open = tiebreaker.status == TiebreakerStatus::Active;
        let caller = caller.and_then(|team| {
            let me = participants.iter().find(|p| p.team_id == team)?;
            let is_highest = tiebreaker.highest_team_id == Some(team);
            Some(CallerStatus {
                team_id: team,
                can_bid: open && !me.withdrawn,
                can_withdraw: open && !me.withdrawn && !is_highest,
                is_highest,
                withdrawn: me.withdrawn,
                current_amount: me.new_bid_amount,
            })
        });
        Self {
            minimum_to_beat: tiebreaker.floor(),
            active_participants: participants.iter().filter(|p| p.is_active()).count(),
            submissions: ranking::display_order(participants),
            caller,
            tiebreaker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sealdraft_types::{BidId, PlayerId, RoundId, TiebreakerId};

    fn setup() -> (Tiebreaker, Vec<TeamTiebreaker>) {
        let tb = Tiebreaker {
            id: TiebreakerId::new(),
            round_id: RoundId::new(),
            player_id: PlayerId::new(),
            tie_amount: Decimal::new(100, 0),
            status: TiebreakerStatus::Active,
            highest_amount: None,
            highest_team_id: None,
            winner_team_id: None,
            winning_amount: None,
            version: 0,
            expires_at: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        let parts = vec![
            TeamTiebreaker::new(tb.id, TeamId::new(), BidId::new()),
            TeamTiebreaker::new(tb.id, TeamId::new(), BidId::new()),
        ];
        (tb, parts)
    }

    #[test]
    fn highest_caller_cannot_withdraw() {
        let (mut tb, mut parts) = setup();
        let leader = parts[0].team_id;
        parts[0].new_bid_amount = Some(Decimal::new(120, 0));
        parts[0].submitted = true;
        tb.highest_amount = Some(Decimal::new(120, 0));
        tb.highest_team_id = Some(leader);

        let view = TiebreakerView::build(tb, &parts, Some(leader));
        let caller = view.caller.unwrap();
        assert!(caller.is_highest);
        assert!(caller.can_bid);
        assert!(!caller.can_withdraw);
        assert_eq!(view.minimum_to_beat, Decimal::new(120, 0));
        assert_eq!(view.submissions[0].team_id, leader);
    }

    #[test]
    fn outsider_gets_no_caller_status() {
        let (tb, parts) = setup();
        let view = TiebreakerView::build(tb, &parts, Some(TeamId::new()));
        assert!(view.caller.is_none());
        assert_eq!(view.active_participants, 2);
    }

    #[test]
    fn finished_tiebreaker_allows_nothing() {
        let (mut tb, parts) = setup();
        tb.status = TiebreakerStatus::Excluded;
        let team = parts[1].team_id;
        let caller = TiebreakerView::build(tb, &parts, Some(team)).caller.unwrap();
        assert!(!caller.can_bid);
        assert!(!caller.can_withdraw);
    }
}
