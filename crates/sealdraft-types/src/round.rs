//! Round lifecycle types.
//!
//! A round moves through four statuses and never goes backwards:
//!
//! ```text
//!   ┌───────┐     ┌───────────┐     ┌────────┐  finalize  ┌───────────┐
//!   │ DRAFT ├────▶│ SCHEDULED ├────▶│ ACTIVE ├───────────▶│ COMPLETED │
//!   └───┬───┘     └───────────┘     └────────┘            └───────────┘
//!       └──────────────────────────────▲
//! ```
//!
//! `draft`/`scheduled` rounds may be deleted freely; `active` rounds may not
//! be deleted at all; deleting a `completed` round requires settlement
//! reversal first.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{PlayerId, RoundId, SeasonId, TeamId};

/// Whether a round auctions one player or a list of players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundType {
    Single,
    Bulk,
}

impl fmt::Display for RoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Bulk => write!(f, "bulk"),
        }
    }
}

/// Lifecycle status of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Draft,
    Scheduled,
    Active,
    Completed,
}

impl RoundStatus {
    /// Can a round move from `self` to `target`?
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Draft, Self::Scheduled | Self::Active)
                | (Self::Scheduled, Self::Active)
                | (Self::Active, Self::Completed)
        )
    }

    /// Rounds in these statuses are removed without settlement reversal.
    #[must_use]
    pub fn is_freely_deletable(self) -> bool {
        matches!(self, Self::Draft | Self::Scheduled)
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// An auction round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub season_id: SeasonId,
    pub round_type: RoundType,
    pub position: Option<String>,
    pub position_group: Option<String>,
    pub status: RoundStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Minimum accepted bid; the flat price of every bid in a bulk round.
    pub base_price: Decimal,
    pub duration_seconds: Option<u64>,
    pub max_bids_per_team: u32,
    /// Set once the round stops accepting bids (tie detection has run).
    pub bidding_closed: bool,
    /// Bumped on every committed change.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Round {
    /// Whether new bids are accepted at `now`.
    #[must_use]
    pub fn accepts_bids_at(&self, now: DateTime<Utc>) -> bool {
        self.status == RoundStatus::Active
            && !self.bidding_closed
            && self.end_time.is_none_or(|end| now < end)
    }
}

/// Input for creating a round. Rounds always start in `draft`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRound {
    pub season_id: SeasonId,
    pub round_type: RoundType,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub position_group: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub base_price: Decimal,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    pub max_bids_per_team: u32,
    /// Players listed in a bulk round. Must be empty for single rounds.
    #[serde(default)]
    pub players: Vec<RoundPlayerSpec>,
}

/// A player to list in a bulk round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundPlayerSpec {
    pub player_id: PlayerId,
    pub player_name: String,
    #[serde(default)]
    pub position: Option<String>,
}

/// Sparse update of a round's mutable fields.
///
/// The field set is the whitelist: anything else in a request body is
/// rejected at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoundPatch {
    #[serde(default)]
    pub status: Option<RoundStatus>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub base_price: Option<Decimal>,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub position_group: Option<String>,
}

impl RoundPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Names of the fields this patch sets, in declaration order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.status.is_some() {
            names.push("status");
        }
        if self.start_time.is_some() {
            names.push("start_time");
        }
        if self.end_time.is_some() {
            names.push("end_time");
        }
        if self.base_price.is_some() {
            names.push("base_price");
        }
        if self.duration_seconds.is_some() {
            names.push("duration_seconds");
        }
        if self.position.is_some() {
            names.push("position");
        }
        if self.position_group.is_some() {
            names.push("position_group");
        }
        names
    }
}

/// Status of a player listed in a bulk round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPlayerStatus {
    Pending,
    Sold,
    Unsold,
}

impl fmt::Display for RoundPlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sold => write!(f, "sold"),
            Self::Unsold => write!(f, "unsold"),
        }
    }
}

/// A player listed inside a bulk round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundPlayer {
    pub round_id: RoundId,
    pub player_id: PlayerId,
    pub player_name: String,
    pub position: Option<String>,
    pub status: RoundPlayerStatus,
    pub winning_team_id: Option<TeamId>,
    pub winning_bid: Option<Decimal>,
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl NewRound {
    /// A single-player round with the given base price and bid cap.
    pub fn dummy_single(season_id: SeasonId, base_price: Decimal, max_bids_per_team: u32) -> Self {
        Self {
            season_id,
            round_type: RoundType::Single,
            position: Some("MID".to_string()),
            position_group: None,
            start_time: None,
            end_time: None,
            base_price,
            duration_seconds: Some(300),
            max_bids_per_team,
            players: Vec::new(),
        }
    }

    /// A bulk round listing the given players.
    pub fn dummy_bulk(season_id: SeasonId, base_price: Decimal, players: &[PlayerId]) -> Self {
        Self {
            season_id,
            round_type: RoundType::Bulk,
            position: None,
            position_group: Some("A".to_string()),
            start_time: None,
            end_time: None,
            base_price,
            duration_seconds: Some(600),
            max_bids_per_team: u32::try_from(players.len()).unwrap_or(u32::MAX),
            players: players
                .iter()
                .enumerate()
                .map(|(i, id)| RoundPlayerSpec {
                    player_id: *id,
                    player_name: format!("Player {i}"),
                    position: Some("DEF".to_string()),
                })
                .collect(),
        }
    }
}
