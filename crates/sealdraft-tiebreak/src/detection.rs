//! Pure tie detection over unsealed bids.
//!
//! Takes the unsealed bids of a round and decides, per player, whether a
//! single bid wins outright or several bids tie at the top. No store is
//! touched here; the engine applies the outcomes.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use sealdraft_types::{BidId, OpenBid, PlayerId, TeamId};

/// Detection result for one player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerOutcome {
    /// Exactly one bid sits at the maximum.
    Sole {
        player_id: PlayerId,
        winner: BidId,
        amount: Decimal,
        losers: Vec<BidId>,
    },
    /// Two or more bids share the maximum.
    Tie {
        player_id: PlayerId,
        tie_amount: Decimal,
        /// Tied bids with their teams, in placement order.
        tied: Vec<(BidId, TeamId)>,
        losers: Vec<BidId>,
    },
}

impl PlayerOutcome {
    #[must_use]
    pub fn player_id(&self) -> PlayerId {
        match self {
            Self::Sole { player_id, .. } | Self::Tie { player_id, .. } => *player_id,
        }
    }
}

/// Group bids by player and classify each group. Output is ordered by
/// player id, so the same input always yields the same sequence.
#[must_use]
pub fn detect_outcomes(bids: &[OpenBid]) -> Vec<PlayerOutcome> {
    let mut per_player: BTreeMap<PlayerId, Vec<&OpenBid>> = BTreeMap::new();
    for bid in bids {
        per_player.entry(bid.bid.player_id).or_default().push(bid);
    }

    let mut outcomes = Vec::with_capacity(per_player.len());
    for (player_id, mut group) in per_player {
        group.sort_by_key(|b| b.bid.id);
        let Some(max) = group.iter().map(|b| b.amount).max() else {
            continue;
        };
        let (top, rest): (Vec<&OpenBid>, Vec<&OpenBid>) =
            group.into_iter().partition(|b| b.amount == max);
        let losers: Vec<BidId> = rest.iter().map(|b| b.bid.id).collect();

        if let [only] = top.as_slice() {
            outcomes.push(PlayerOutcome::Sole {
                player_id,
                winner: only.bid.id,
                amount: max,
                losers,
            });
        } else {
            outcomes.push(PlayerOutcome::Tie {
                player_id,
                tie_amount: max,
                tied: top.iter().map(|b| (b.bid.id, b.bid.team_id)).collect(),
                losers,
            });
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sealdraft_types::{Bid, BidStatus, RoundId, SealedBid};

    fn open(player: PlayerId, team: TeamId, amount: i64) -> OpenBid {
        let now = Utc::now();
        OpenBid {
            bid: Bid {
                id: BidId::new(),
                round_id: RoundId::new(),
                team_id: team,
                player_id: player,
                sealed: SealedBid::from_bytes(vec![0; 16]),
                status: BidStatus::Pending,
                won_amount: None,
                created_at: now,
                updated_at: now,
            },
            amount: Decimal::new(amount, 0),
        }
    }

    #[test]
    fn two_way_tie_with_lower_bid() {
        let p = PlayerId::new();
        let (a, b, c) = (TeamId::new(), TeamId::new(), TeamId::new());
        let bids = [open(p, a, 100), open(p, b, 100), open(p, c, 90)];
        let outcomes = detect_outcomes(&bids);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            PlayerOutcome::Tie {
                tie_amount,
                tied,
                losers,
                ..
            } => {
                assert_eq!(*tie_amount, Decimal::new(100, 0));
                let teams: Vec<TeamId> = tied.iter().map(|(_, t)| *t).collect();
                assert_eq!(teams, vec![a, b]);
                assert_eq!(losers, &vec![bids[2].bid.id]);
            }
            other => panic!("expected tie, got {other:?}"),
        }
    }

    #[test]
    fn sole_winner() {
        let p = PlayerId::new();
        let bids = [open(p, TeamId::new(), 50), open(p, TeamId::new(), 70)];
        let outcomes = detect_outcomes(&bids);
        assert_eq!(
            outcomes,
            vec![PlayerOutcome::Sole {
                player_id: p,
                winner: bids[1].bid.id,
                amount: Decimal::new(70, 0),
                losers: vec![bids[0].bid.id],
            }]
        );
    }

    #[test]
    fn players_are_independent() {
        let team = TeamId::new();
        let bids = [
            open(PlayerId::new(), team, 10),
            open(PlayerId::new(), team, 20),
            open(PlayerId::new(), team, 30),
        ];
        let outcomes = detect_outcomes(&bids);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| matches!(o, PlayerOutcome::Sole { .. })));
    }

    #[test]
    fn deterministic_order() {
        let p1 = PlayerId::new();
        let p2 = PlayerId::new();
        let bids = [open(p2, TeamId::new(), 10), open(p1, TeamId::new(), 10)];
        let mut reversed = bids.clone();
        reversed.reverse();
        assert_eq!(detect_outcomes(&bids), detect_outcomes(&reversed));
        assert_eq!(detect_outcomes(&bids)[0].player_id(), p1);
    }

    #[test]
    fn empty_input() {
        assert!(detect_outcomes(&[]).is_empty());
    }
}
