//! # Apex Signal Library
//!
//! Turns a window of candles into indicator snapshots and a directional vote.
//!
//! ## Architectural Principles
//!
//! - **Pure Logic:** This crate has no knowledge of APIs, storage or execution. It
//!   depends only on `core-types` and `configuration`.
//! - **Snapshot Boundary:** Indicators run on `f64` through the `ta` crate; every
//!   derived value is converted back to `Decimal` and is `None` until warmed up.

pub mod adx;
pub mod error;
pub mod evaluator;
pub mod indicators;

pub use adx::AverageDirectionalIndex;
pub use error::SignalError;
pub use evaluator::{Evaluation, SignalEvaluator, VoteTally};
pub use indicators::{IndicatorSnapshot, compute_snapshots, oscillator_at_price};
