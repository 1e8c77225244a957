//! # Apex Database Crate
//!
//! The duplicate-action memory: the last signal acted on for each
//! (symbol, interval), behind the `SignalStore` trait.
//!
//! ## Public API
//!
//! - `SignalStore`: load and save the last acted signal for a key.
//! - `InMemorySignalStore`: process-local implementation for tests and dry runs.
//! - `PgSignalStore`: PostgreSQL implementation that survives restarts.
//! - `connect` / `run_migrations`: pool setup and schema migration.
//! - `DbError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use repository::PgSignalStore;
pub use store::{InMemorySignalStore, SignalStore};
