//! In-memory [`BudgetStore`].
//!
//! Stands in for the external team-budget service in tests and embedded
//! deployments. Adjustments are applied at most once per idempotency key,
//! and individual teams can be made to fail to exercise partial settlement.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::Mutex;
use sealdraft_types::constants::DEFAULT_IDEMPOTENCY_CACHE_SIZE;
use sealdraft_types::{
    AuctionError, BudgetAdjustment, BudgetStore, Result, SeasonId, SettlementConfig, TeamBudget,
    TeamId,
};

use crate::idempotency::IdempotencyGuard;

struct BudgetTables {
    records: HashMap<(TeamId, SeasonId), TeamBudget>,
    applied: IdempotencyGuard,
}

pub struct InMemoryBudgetStore {
    inner: Mutex<BudgetTables>,
    failing: Mutex<HashSet<TeamId>>,
}

impl InMemoryBudgetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_IDEMPOTENCY_CACHE_SIZE)
    }

    #[must_use]
    pub fn with_cache_size(cache_size: usize) -> Self {
        Self {
            inner: Mutex::new(BudgetTables {
                records: HashMap::new(),
                applied: IdempotencyGuard::new(cache_size),
            }),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Store sized by `settlement.idempotency_cache_size`.
    ///
    /// # Errors
    /// [`AuctionError::Configuration`] for a zero cache size.
    pub fn from_config(config: &SettlementConfig) -> Result<Self> {
        if config.idempotency_cache_size == 0 {
            return Err(AuctionError::Configuration(
                "settlement.idempotency_cache_size must be positive".into(),
            ));
        }
        Ok(Self::with_cache_size(config.idempotency_cache_size))
    }

    /// Insert or replace a budget record.
    pub fn seed(&self, budget: TeamBudget) {
        self.inner
            .lock()
            .records
            .insert((budget.team_id, budget.season_id), budget);
    }

    /// Make every adjustment for `team` fail until [`Self::heal`] is called.
    pub fn fail_for(&self, team_id: TeamId) {
        self.failing.lock().insert(team_id);
    }

    pub fn heal(&self, team_id: TeamId) {
        self.failing.lock().remove(&team_id);
    }

    /// Number of adjustments applied so far.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.inner.lock().applied.len()
    }
}

impl Default for InMemoryBudgetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BudgetStore for InMemoryBudgetStore {
    fn get_budget(&self, team_id: TeamId, season_id: SeasonId) -> Result<TeamBudget> {
        self.inner
            .lock()
            .records
            .get(&(team_id, season_id))
            .cloned()
            .ok_or(AuctionError::BudgetRecordNotFound {
                team: team_id,
                season: season_id,
            })
    }

    fn adjust_budget(
        &self,
        team_id: TeamId,
        season_id: SeasonId,
        adjustment: &BudgetAdjustment,
    ) -> Result<TeamBudget> {
        if self.failing.lock().contains(&team_id) {
            return Err(AuctionError::StoreUnavailable(format!(
                "budget store rejected update for {team_id}"
            )));
        }

        let mut tables = self.inner.lock();
        let BudgetTables { records, applied } = &mut *tables;
        let record = records
            .get_mut(&(team_id, season_id))
            .ok_or(AuctionError::BudgetRecordNotFound {
                team: team_id,
                season: season_id,
            })?;

        if applied.mark_applied(&adjustment.idempotency_key) {
            adjustment.apply_to(record);
            tracing::debug!(
                team = %team_id,
                key = %adjustment.idempotency_key,
                spend = %adjustment.spend,
                budget = %record.budget,
                "budget adjusted"
            );
        } else {
            tracing::debug!(team = %team_id, key = %adjustment.idempotency_key, "adjustment already applied");
        }
        Ok(record.clone())
    }

    fn get_position_counts(
        &self,
        team_id: TeamId,
        season_id: SeasonId,
    ) -> Result<BTreeMap<String, u32>> {
        self.get_budget(team_id, season_id)
            .map(|b| b.position_counts)
    }

    fn set_position_counts(
        &self,
        team_id: TeamId,
        season_id: SeasonId,
        counts: BTreeMap<String, u32>,
    ) -> Result<()> {
        let mut tables = self.inner.lock();
        let record = tables
            .records
            .get_mut(&(team_id, season_id))
            .ok_or(AuctionError::BudgetRecordNotFound {
                team: team_id,
                season: season_id,
            })?;
        record.position_counts = counts;
        Ok(())
    }
}
