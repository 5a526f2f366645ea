//! # sealdraft-ledger
//!
//! **Ledger Plane**: sealed bid storage, round lifecycle, and reference
//! implementations of the external collaborators.
//!
//! ## Architecture
//!
//! 1. **AesBidCodec**: seals bid payloads with AES-256-GCM, bound to (round, team)
//! 2. **RoundStore**: rounds, bulk-round player lists, the status machine
//! 3. **BidLedger**: bid placement and cancellation, status updates, stats
//! 4. **InMemoryBudgetStore / InMemoryPlayerRegistry**: stand-ins for the
//!    external budget and roster stores
//! 5. **BroadcastNotifier**: fans round events out over a broadcast channel
//!
//! ## Bid Flow
//!
//! ```text
//! API → RoundStore.get() → BudgetStore.get_budget() → BidCodec.seal()
//!     → BidLedger (slot lock) → pending Bid
//! ```
//!
//! A bid amount is never stored in the clear.

pub mod bid_ledger;
pub mod budget_store;
pub mod codec;
pub mod idempotency;
pub mod notifier;
pub mod player_registry;
pub mod round_store;
pub mod stats;

pub use bid_ledger::{BidLedger, UnsealedBids};
pub use budget_store::InMemoryBudgetStore;
pub use codec::AesBidCodec;
pub use idempotency::IdempotencyGuard;
pub use notifier::BroadcastNotifier;
pub use player_registry::InMemoryPlayerRegistry;
pub use round_store::RoundStore;
