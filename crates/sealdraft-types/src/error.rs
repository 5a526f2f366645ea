//! Error types for the SealDraft auction engine.
//!
//! All errors use the `SD_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Round errors
//! - 2xx: Bid errors
//! - 3xx: Tiebreaker errors
//! - 4xx: Settlement errors
//! - 5xx: Bid codec errors
//! - 9xx: General / internal errors
//!
//! Every variant also maps to an [`ErrorKind`], which is how callers tell a
//! validation failure from a missing record or a conflicting request.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{BidId, PlayerId, RoundId, RoundStatus, SeasonId, TeamId, TiebreakerId, TiebreakerStatus};

/// Coarse classification of an error, used for response mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or out-of-range input. No side effects happened.
    Validation,
    /// An identifier did not resolve to a record.
    NotFound,
    /// The request is well-formed but conflicts with current state.
    Conflict,
    /// A store, codec, or collaborator failed.
    Internal,
}

impl ErrorKind {
    /// HTTP status code conventionally used for this kind.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Internal => 500,
        }
    }
}

/// Central error enum for all SealDraft operations.
#[derive(Debug, Clone, Error)]
pub enum AuctionError {
    // =================================================================
    // Round Errors (1xx)
    // =================================================================
    #[error("SD_ERR_100: Round not found: {0}")]
    RoundNotFound(RoundId),

    #[error("SD_ERR_101: Invalid round: {reason}")]
    InvalidRound { reason: String },

    #[error("SD_ERR_102: Illegal round transition: {from} -> {to}")]
    IllegalRoundTransition { from: RoundStatus, to: RoundStatus },

    /// Active rounds cannot be deleted. Reported as a validation failure.
    #[error("SD_ERR_103: Round in progress: {0}")]
    RoundInProgress(RoundId),

    #[error("SD_ERR_104: Round {round_id} is not active (status: {status})")]
    RoundNotActive { round_id: RoundId, status: RoundStatus },

    #[error("SD_ERR_105: Bidding closed for round {0}")]
    BiddingClosed(RoundId),

    #[error("SD_ERR_106: Round already finalized: {0}")]
    RoundAlreadyFinalized(RoundId),

    #[error("SD_ERR_107: No fields to update")]
    EmptyPatch,

    // =================================================================
    // Bid Errors (2xx)
    // =================================================================
    #[error("SD_ERR_200: Bid not found: {0}")]
    BidNotFound(BidId),

    #[error("SD_ERR_201: Invalid bid: {reason}")]
    InvalidBid { reason: String },

    #[error("SD_ERR_202: Bid limit reached: team already holds {max} pending bids")]
    BidLimitExceeded { max: u32 },

    #[error("SD_ERR_203: Insufficient budget: need {needed}, have {available}")]
    InsufficientBudget { needed: Decimal, available: Decimal },

    #[error("SD_ERR_204: Team already bid on {player} in this round")]
    DuplicateBid { player: PlayerId },

    #[error("SD_ERR_205: Bid cannot be cancelled: {reason}")]
    BidNotCancellable { reason: String },

    // =================================================================
    // Tiebreaker Errors (3xx)
    // =================================================================
    #[error("SD_ERR_300: Tiebreaker not found: {0}")]
    TiebreakerNotFound(TiebreakerId),

    #[error("SD_ERR_301: Tiebreaker {id} is {status}, expected {expected}")]
    TiebreakerWrongStatus {
        id: TiebreakerId,
        status: TiebreakerStatus,
        expected: TiebreakerStatus,
    },

    #[error("SD_ERR_302: Team {team} is not part of tiebreaker {id}")]
    NotTiebreakerParticipant { id: TiebreakerId, team: TeamId },

    #[error("SD_ERR_303: Submission too low: must exceed {minimum}, got {offered}")]
    SubmissionTooLow { minimum: Decimal, offered: Decimal },

    #[error("SD_ERR_304: Team holding the highest submission cannot withdraw")]
    HighestBidderCannotWithdraw,

    #[error("SD_ERR_305: Team {0} already withdrew")]
    AlreadyWithdrawn(TeamId),

    /// The compare-and-swap lost against a concurrent writer.
    #[error("SD_ERR_306: Tiebreaker {id} changed concurrently (expected version {expected})")]
    StaleTiebreaker { id: TiebreakerId, expected: u64 },

    #[error("SD_ERR_307: Round has {count} unresolved tiebreakers")]
    UnresolvedTiebreakers { count: usize },

    // =================================================================
    // Settlement Errors (4xx)
    // =================================================================
    #[error("SD_ERR_400: Settlement failed: {reason}")]
    SettlementFailed { reason: String },

    #[error("SD_ERR_401: Settlement already running for round {0}")]
    SettlementInProgress(RoundId),

    #[error("SD_ERR_402: Budget record not found for {team} in {season}")]
    BudgetRecordNotFound { team: TeamId, season: SeasonId },

    #[error("SD_ERR_403: Player not found: {0}")]
    PlayerNotFound(PlayerId),

    #[error("SD_ERR_404: Reversal incomplete: {failed} bids could not be reversed")]
    ReversalIncomplete { failed: usize },

    #[error("SD_ERR_405: Spend invariant violation: {reason}")]
    SpendInvariantViolation { reason: String },

    #[error("SD_ERR_406: Round {0} already has pending allocations")]
    PendingAllocationsExist(RoundId),

    #[error("SD_ERR_407: No pending allocations for round {0}")]
    NoPendingAllocations(RoundId),

    /// The round's won bids no longer match what was previewed.
    #[error("SD_ERR_408: Pending allocations for round {0} are stale")]
    StalePendingAllocations(RoundId),

    // =================================================================
    // Codec Errors (5xx)
    // =================================================================
    #[error("SD_ERR_500: Failed to seal bid: {0}")]
    SealFailed(String),

    #[error("SD_ERR_501: Failed to unseal bid: {0}")]
    UnsealFailed(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    #[error("SD_ERR_900: Internal error: {0}")]
    Internal(String),

    #[error("SD_ERR_901: Serialization error: {0}")]
    Serialization(String),

    #[error("SD_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// A collaborator (budget store, player registry) rejected the call.
    #[error("SD_ERR_903: Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl AuctionError {
    /// Classify this error for callers that map to response codes.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRound { .. }
            | Self::EmptyPatch
            | Self::RoundInProgress(_)
            | Self::InvalidBid { .. }
            | Self::SubmissionTooLow { .. }
            | Self::InsufficientBudget { .. }
            | Self::BidLimitExceeded { .. }
            | Self::Serialization(_)
            | Self::Configuration(_) => ErrorKind::Validation,

            Self::RoundNotFound(_)
            | Self::BidNotFound(_)
            | Self::TiebreakerNotFound(_)
            | Self::BudgetRecordNotFound { .. }
            | Self::PlayerNotFound(_)
            | Self::NoPendingAllocations(_) => ErrorKind::NotFound,

            Self::IllegalRoundTransition { .. }
            | Self::RoundNotActive { .. }
            | Self::BiddingClosed(_)
            | Self::RoundAlreadyFinalized(_)
            | Self::DuplicateBid { .. }
            | Self::BidNotCancellable { .. }
            | Self::TiebreakerWrongStatus { .. }
            | Self::NotTiebreakerParticipant { .. }
            | Self::HighestBidderCannotWithdraw
            | Self::AlreadyWithdrawn(_)
            | Self::StaleTiebreaker { .. }
            | Self::UnresolvedTiebreakers { .. }
            | Self::SettlementInProgress(_)
            | Self::ReversalIncomplete { .. }
            | Self::PendingAllocationsExist(_)
            | Self::StalePendingAllocations(_) => ErrorKind::Conflict,

            Self::SettlementFailed { .. }
            | Self::SpendInvariantViolation { .. }
            | Self::SealFailed(_)
            | Self::UnsealFailed(_)
            | Self::Internal(_)
            | Self::StoreUnavailable(_) => ErrorKind::Internal,
        }
    }

    /// The `SD_ERR_nnn` code of this error.
    #[must_use]
    pub fn code(&self) -> String {
        let msg = self.to_string();
        msg.split(':').next().unwrap_or("SD_ERR_900").to_string()
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, AuctionError>;

impl From<serde_json::Error> for AuctionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
