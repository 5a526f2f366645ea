//! # sealdraft-tiebreak
//!
//! **Tiebreak plane**: tie detection over unsealed bids and the sealed
//! sub-auction that settles ties.
//!
//! - **detection**: pure classification of each player's top bids
//! - **ranking**: submission ordering and the resolution rule
//! - **store**: tiebreaker records with (round, player) uniqueness and
//!   version compare-and-swap
//! - **engine**: detection side effects plus submit / withdraw / resolve
//! - **view**: what a participating team sees

pub mod detection;
pub mod engine;
pub mod ranking;
pub mod store;
pub mod view;

pub use detection::{PlayerOutcome, detect_outcomes};
pub use engine::{DetectionReport, TiebreakEngine, WithdrawOutcome};
pub use store::{FinishOutcome, InsertOutcome, TiebreakerStore};
pub use view::{CallerStatus, TiebreakerView};
