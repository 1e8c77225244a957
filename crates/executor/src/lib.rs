//! # Apex Executor Crate
//!
//! Turns sized trade plans into exchange orders and keeps the in-process record of
//! what is live.
//!
//! ## Architectural Principles
//!
//! - **Single writer per key:** every mutation of a position goes through the
//!   `PositionLedger`'s per-key lock, so an entry, a close and a repair for the same
//!   (symbol, interval) can never interleave.
//! - **Precision before submission:** `precision::normalize` either produces an order
//!   that satisfies the exchange's step, tick and notional rules or refuses it; nothing
//!   unrounded reaches the exchange.
//! - **Partial fills are a state, not a failure:** an entry whose exit legs were not all
//!   accepted stays in the ledger as `Degraded` until `repair_exits` succeeds.
//!
//! ## Public API
//!
//! - `ExecutionEngine`: enter, close, repair and reconcile positions.
//! - `PositionLedger`: the per-key position store.
//! - `normalize`: the precision normalizer.
//! - `ExecutionError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod error;
pub mod execution;
pub mod ledger;
pub mod precision;
pub mod rules;

// Re-export the key components to provide a clean, public-facing API.
pub use error::ExecutionError;
pub use execution::{EntryOutcome, EntryPlan, ExecutionEngine, SyncOutcome};
pub use ledger::{LedgerEntry, PositionLedger};
pub use precision::{NormalizedOrder, Rejection, normalize};
pub use rules::SymbolRulesCache;
