use crate::precision::Rejection;
use api_client::ApiError;
use core_types::{ExitLeg, Position, PositionKey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Order rejected before submission: {0}")]
    Rejected(#[from] Rejection),

    #[error("Exchange call failed: {0}")]
    Api(#[from] ApiError),

    /// The entry filled but some exit legs were not accepted. The position is in the
    /// ledger as `Degraded` and must be repaired.
    #[error("Entry on {} filled but exit legs are missing: {missing_legs:?}", .position.symbol)]
    PartialFire {
        position: Box<Position>,
        missing_legs: Vec<ExitLeg>,
    },

    #[error("Entry plan is invalid: {0}")]
    InvalidPlan(String),

    #[error("No position is tracked for {0}")]
    NoPosition(PositionKey),
}
