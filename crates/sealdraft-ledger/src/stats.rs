//! Per-round bid statistics and their revision-keyed cache.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use sealdraft_types::{OpenBid, PlayerBidStats, PlayerId, RoundId};

/// Aggregate unsealed bids per player, ordered by player id.
#[must_use]
pub fn aggregate(bids: &[OpenBid]) -> Vec<PlayerBidStats> {
    let mut per_player: BTreeMap<PlayerId, Vec<&OpenBid>> = BTreeMap::new();
    for bid in bids {
        per_player.entry(bid.bid.player_id).or_default().push(bid);
    }

    per_player
        .into_iter()
        .filter_map(|(player_id, bids)| {
            let highest_bid = bids.iter().map(|b| b.amount).max()?;
            let lowest_bid = bids.iter().map(|b| b.amount).min()?;
            let teams: HashSet<_> = bids.iter().map(|b| b.bid.team_id).collect();
            Some(PlayerBidStats {
                player_id,
                bid_count: bids.len(),
                highest_bid,
                lowest_bid,
                teams_count: teams.len(),
            })
        })
        .collect()
}

/// Caches stats per round, valid for exactly one ledger revision.
#[derive(Default)]
pub struct StatsCache {
    entries: Mutex<HashMap<RoundId, (u64, Arc<Vec<PlayerBidStats>>)>>,
}

impl StatsCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached stats if they were computed at `revision`.
    #[must_use]
    pub fn get(&self, round_id: RoundId, revision: u64) -> Option<Arc<Vec<PlayerBidStats>>> {
        self.entries
            .lock()
            .get(&round_id)
            .filter(|(rev, _)| *rev == revision)
            .map(|(_, stats)| Arc::clone(stats))
    }

    pub fn put(&self, round_id: RoundId, revision: u64, stats: Arc<Vec<PlayerBidStats>>) {
        let mut entries = self.entries.lock();
        // A slower reader must not overwrite a newer entry.
        if entries.get(&round_id).is_some_and(|(rev, _)| *rev > revision) {
            return;
        }
        entries.insert(round_id, (revision, stats));
    }

    pub fn invalidate(&self, round_id: RoundId) {
        self.entries.lock().remove(&round_id);
    }
}
