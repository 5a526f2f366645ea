//! Player allocation records written by settlement.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{PlayerId, RoundId, SeasonId, TeamId};

/// A player on a team's roster, created on finalize and deleted on reversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamPlayer {
    pub team_id: TeamId,
    pub player_id: PlayerId,
    pub season_id: SeasonId,
    pub round_id: RoundId,
    pub purchase_price: Decimal,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Available,
    Sold,
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Sold => write!(f, "sold"),
        }
    }
}

/// Sale fields of a player in the player registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: PlayerId,
    pub name: String,
    pub position: Option<String>,
    pub is_sold: bool,
    pub team_id: Option<TeamId>,
    pub acquisition_value: Option<Decimal>,
    pub status: PlayerStatus,
    pub season_id: Option<SeasonId>,
    pub round_id: Option<RoundId>,
    pub contract_start: Option<DateTime<Utc>>,
    pub contract_end: Option<DateTime<Utc>>,
}

impl PlayerRecord {
    /// An unsold player.
    #[must_use]
    pub fn available(player_id: PlayerId, name: impl Into<String>, position: Option<String>) -> Self {
        Self {
            player_id,
            name: name.into(),
            position,
            is_sold: false,
            team_id: None,
            acquisition_value: None,
            status: PlayerStatus::Available,
            season_id: None,
            round_id: None,
            contract_start: None,
            contract_end: None,
        }
    }

    /// Record a sale to `allocation.team_id`.
    pub fn sell(&mut self, allocation: &TeamPlayer) {
        self.is_sold = true;
        self.team_id = Some(allocation.team_id);
        self.acquisition_value = Some(allocation.purchase_price);
        self.status = PlayerStatus::Sold;
        self.season_id = Some(allocation.season_id);
        self.round_id = Some(allocation.round_id);
        self.contract_start = Some(allocation.acquired_at);
    }

    /// Clear every sale field.
    pub fn reset(&mut self) {
        self.is_sold = false;
        self.team_id = None;
        self.acquisition_value = None;
        self.status = PlayerStatus::Available;
        self.season_id = None;
        self.round_id = None;
        self.contract_start = None;
        self.contract_end = None;
    }
}
