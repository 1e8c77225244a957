//! # Apex Events
//!
//! This crate defines the trade lifecycle events that the engine publishes to its
//! notification collaborators.
//!
//! As a Layer 0 crate, it depends only on `core-types` and provides the definitive
//! language for everything worth telling a human about.

// Declare the modules that make up this crate.
pub mod error;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use messages::{RejectionNotice, TradeEvent};
