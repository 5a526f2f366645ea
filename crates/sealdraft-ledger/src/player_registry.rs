//! In-memory [`PlayerRegistry`].

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use sealdraft_types::{
    AuctionError, PlayerId, PlayerRecord, PlayerRegistry, Result, TeamId, TeamPlayer,
};

#[derive(Default)]
struct RegistryTables {
    players: HashMap<PlayerId, PlayerRecord>,
    allocations: HashMap<(TeamId, PlayerId), TeamPlayer>,
}

#[derive(Default)]
pub struct InMemoryPlayerRegistry {
    inner: RwLock<RegistryTables>,
    failing: RwLock<HashSet<PlayerId>>,
}

impl InMemoryPlayerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, player: PlayerRecord) {
        self.inner.write().players.insert(player.player_id, player);
    }

    /// Make every call touching `player_id` fail.
    pub fn fail_for(&self, player_id: PlayerId) {
        self.failing.write().insert(player_id);
    }

    pub fn heal(&self, player_id: PlayerId) {
        self.failing.write().remove(&player_id);
    }

    #[must_use]
    pub fn allocation(&self, team_id: TeamId, player_id: PlayerId) -> Option<TeamPlayer> {
        self.inner
            .read()
            .allocations
            .get(&(team_id, player_id))
            .cloned()
    }

    #[must_use]
    pub fn roster(&self, team_id: TeamId) -> Vec<TeamPlayer> {
        let mut roster: Vec<TeamPlayer> = self
            .inner
            .read()
            .allocations
            .values()
            .filter(|a| a.team_id == team_id)
            .cloned()
            .collect();
        roster.sort_by_key(|a| a.player_id);
        roster
    }

    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.inner.read().allocations.len()
    }

    fn check(&self, player_id: PlayerId) -> Result<()> {
        if self.failing.read().contains(&player_id) {
            return Err(AuctionError::StoreUnavailable(format!(
                "player registry rejected update for {player_id}"
            )));
        }
        Ok(())
    }
}

impl PlayerRegistry for InMemoryPlayerRegistry {
    fn insert_allocation(&self, allocation: &TeamPlayer) -> Result<()> {
        self.check(allocation.player_id)?;
        self.inner
            .write()
            .allocations
            .entry((allocation.team_id, allocation.player_id))
            .or_insert_with(|| allocation.clone());
        Ok(())
    }

    fn delete_allocation(&self, team_id: TeamId, player_id: PlayerId) -> Result<bool> {
        self.check(player_id)?;
        Ok(self
            .inner
            .write()
            .allocations
            .remove(&(team_id, player_id))
            .is_some())
    }

    fn mark_sold(&self, allocation: &TeamPlayer) -> Result<()> {
        self.check(allocation.player_id)?;
        let mut tables = self.inner.write();
        let player = tables
            .players
            .get_mut(&allocation.player_id)
            .ok_or(AuctionError::PlayerNotFound(allocation.player_id))?;
        player.sell(allocation);
        Ok(())
    }

    fn reset_player(&self, player_id: PlayerId) -> Result<()> {
        self.check(player_id)?;
        let mut tables = self.inner.write();
        let player = tables
            .players
            .get_mut(&player_id)
            .ok_or(AuctionError::PlayerNotFound(player_id))?;
        player.reset();
        Ok(())
    }

    fn player(&self, player_id: PlayerId) -> Result<Option<PlayerRecord>> {
        Ok(self.inner.read().players.get(&player_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use sealdraft_types::{PlayerStatus, RoundId, SeasonId};

    fn allocation(player_id: PlayerId) -> TeamPlayer {
        TeamPlayer {
            team_id: TeamId::new(),
            player_id,
            season_id: SeasonId::new(),
            round_id: RoundId::new(),
            purchase_price: Decimal::new(40, 0),
            acquired_at: Utc::now(),
        }
    }

    #[test]
    fn insert_is_idempotent() {
        let registry = InMemoryPlayerRegistry::new();
        let alloc = allocation(PlayerId::new());
        registry.insert_allocation(&alloc).unwrap();
        registry.insert_allocation(&alloc).unwrap();
        assert_eq!(registry.allocation_count(), 1);
        assert!(registry.delete_allocation(alloc.team_id, alloc.player_id).unwrap());
        assert!(!registry.delete_allocation(alloc.team_id, alloc.player_id).unwrap());
    }

    #[test]
    fn sell_and_reset() {
        let registry = InMemoryPlayerRegistry::new();
        let id = PlayerId::new();
        registry.seed(PlayerRecord::available(id, "Kane", Some("FWD".into())));
        let alloc = allocation(id);
        registry.mark_sold(&alloc).unwrap();
        let sold = registry.player(id).unwrap().unwrap();
        assert_eq!(sold.status, PlayerStatus::Sold);
        assert_eq!(sold.team_id, Some(alloc.team_id));

        registry.reset_player(id).unwrap();
        let reset = registry.player(id).unwrap().unwrap();
        assert!(!reset.is_sold);
        assert_eq!(reset.acquisition_value, None);
    }

    #[test]
    fn unknown_player() {
        let registry = InMemoryPlayerRegistry::new();
        let alloc = allocation(PlayerId::new());
        assert!(matches!(
            registry.mark_sold(&alloc),
            Err(AuctionError::PlayerNotFound(_))
        ));
    }

    #[test]
    fn failure_injection() {
        let registry = InMemoryPlayerRegistry::new();
        let alloc = allocation(PlayerId::new());
        registry.fail_for(alloc.player_id);
        assert!(registry.insert_allocation(&alloc).is_err());
        registry.heal(alloc.player_id);
        assert!(registry.insert_allocation(&alloc).is_ok());
    }
}
