//! Tiebreaker sub-auction types.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐ activate ┌────────┐  winner   ┌──────────┐
//!   │ PENDING ├─────────▶│ ACTIVE ├──────────▶│ RESOLVED │
//!   └────┬────┘          └───┬────┘           └──────────┘
//!        │ exclude           │ nobody left / no submissions
//!        ▼                   ▼
//!   ┌──────────┐◀────────────┘
//!   │ EXCLUDED │
//!   └──────────┘
//! ```
//!
//! Transitions are monotonic. `RESOLVED` and `EXCLUDED` are terminal.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BidId, PlayerId, RoundId, SubmissionId, TeamId, TiebreakerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiebreakerStatus {
    Pending,
    Active,
    Resolved,
    Excluded,
}

impl TiebreakerStatus {
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Active | Self::Excluded)
                | (Self::Active, Self::Resolved | Self::Excluded)
        )
    }

    /// Pending and active tiebreakers block round finalization.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }
}

impl fmt::Display for TiebreakerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Resolved => write!(f, "resolved"),
            Self::Excluded => write!(f, "excluded"),
        }
    }
}

/// A tiebreaker for one (round, player) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tiebreaker {
    pub id: TiebreakerId,
    pub round_id: RoundId,
    pub player_id: PlayerId,
    /// The tied top bid amount that started this tiebreaker.
    pub tie_amount: Decimal,
    pub status: TiebreakerStatus,
    /// Current highest non-withdrawn submission.
    pub highest_amount: Option<Decimal>,
    pub highest_team_id: Option<TeamId>,
    pub winner_team_id: Option<TeamId>,
    pub winning_amount: Option<Decimal>,
    /// Bumped on every committed change; the compare-and-swap target.
    pub version: u64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Tiebreaker {
    /// The amount a new submission must exceed.
    #[must_use]
    pub fn floor(&self) -> Decimal {
        self.highest_amount.map_or(self.tie_amount, |h| h.max(self.tie_amount))
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// One team's submission record inside a tiebreaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamTiebreaker {
    pub id: SubmissionId,
    pub tiebreaker_id: TiebreakerId,
    pub team_id: TeamId,
    pub original_bid_id: BidId,
    pub new_bid_amount: Option<Decimal>,
    pub submitted: bool,
    pub withdrawn: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Store-assigned submission order; breaks timestamp collisions.
    pub sequence: Option<u64>,
}

impl TeamTiebreaker {
    /// A fresh, unsubmitted participant record.
    #[must_use]
    pub fn new(tiebreaker_id: TiebreakerId, team_id: TeamId, original_bid_id: BidId) -> Self {
        Self {
            id: SubmissionId::new(),
            tiebreaker_id,
            team_id,
            original_bid_id,
            new_bid_amount: None,
            submitted: false,
            withdrawn: false,
            submitted_at: None,
            sequence: None,
        }
    }

    /// Still competing: has not withdrawn.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.withdrawn
    }
}

/// What caused a tiebreaker to be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTrigger {
    /// The timer ran out.
    Expired,
    /// At most one participant is left.
    AllButOneWithdrawn,
    /// An administrator resolved it.
    Manual,
}

impl fmt::Display for ResolutionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => write!(f, "expired"),
            Self::AllButOneWithdrawn => write!(f, "all_but_one_withdrawn"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Terminal outcome of a tiebreaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TiebreakOutcome {
    Resolved {
        winner_team_id: TeamId,
        winning_bid_id: BidId,
        amount: Decimal,
    },
    Excluded,
}
