//! # sealdraft-settlement
//!
//! **Settlement plane**: turns a round's winning bids into roster
//! allocations and budget debits, undoes that on deletion, and exposes the
//! resource handlers.
//!
//! ## Architecture
//!
//! The settler receives a round whose bidding has closed and:
//! 1. Takes the per-round settlement lock
//! 2. Runs tie detection and refuses while any tiebreaker is open
//! 3. Persists a settlement intent per won bid
//! 4. Drives allocation, player sale, and budget debit, flagging each step
//! 5. Completes the round only when every intent is done
//!
//! Reversal runs the same steps backwards and checks that every team's net
//! spend for the round returns to zero. [`Settler::recover`] re-drives
//! whatever a failed pass left behind. [`Settler::preview`] parks the
//! would-be allocations for an admin to apply or discard.

pub mod api;
pub mod intent;
pub mod pending;
pub mod round_lock;
pub mod service;
pub mod settler;
pub mod spend_tracker;

pub use api::{Api, ApiError, ApiResponse};
pub use intent::{IntentKind, IntentStatus, IntentStore, SettlementIntent};
pub use pending::{PendingAllocation, PendingAllocations, SettlementPreview};
pub use round_lock::{RoundLock, RoundLockGuard};
pub use service::{AuctionService, CreateRoundRequest, DeleteOutcome, RoundDetail};
pub use settler::{FailedBid, SettlementReport, Settler};
pub use spend_tracker::SpendTracker;
