//! # sealdraft-types
//!
//! Shared types, errors, and configuration for the **SealDraft** sealed-bid
//! draft auction.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`RoundId`], [`BidId`], [`TeamId`], [`PlayerId`], [`SeasonId`], [`TiebreakerId`], [`IntentId`]
//! - **Round model**: [`Round`], [`RoundStatus`], [`RoundPatch`], [`RoundPlayer`]
//! - **Bid model**: [`Bid`], [`SealedBid`], [`BidPayload`], [`SealContext`]
//! - **Tiebreaker model**: [`Tiebreaker`], [`TeamTiebreaker`], [`TiebreakOutcome`]
//! - **Budget model**: [`TeamBudget`], [`BudgetAdjustment`]
//! - **Allocations**: [`TeamPlayer`], [`PlayerRecord`]
//! - **Events**: [`RoundEvent`], [`RoundEventKind`]
//! - **Collaborators**: [`BudgetStore`], [`PlayerRegistry`], [`Notifier`], [`BidCodec`]
//! - **Configuration**: [`AuctionConfig`]
//! - **Errors**: [`AuctionError`] with `SD_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod allocation;
pub mod bid;
pub mod budget;
pub mod collab;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod round;
pub mod tiebreaker;

// Re-export all primary types at crate root for ergonomic imports:
//   use sealdraft_types::{Round, Bid, Tiebreaker, BudgetStore, ...};

pub use allocation::*;
pub use bid::*;
pub use budget::*;
pub use collab::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use round::*;
pub use tiebreaker::*;

// Constants are accessed via `sealdraft_types::constants::FOO`
// (not re-exported to avoid name collisions).
