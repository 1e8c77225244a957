use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Risk parameters from configuration are invalid: {0}")]
    InvalidParameters(String),

    #[error("Stop {stop} is not a valid stop for entry {entry}")]
    InvalidStop { entry: Decimal, stop: Decimal },

    #[error("The provided entry price ({0}) is zero or negative.")]
    InvalidEntryPrice(Decimal),

    #[error("Insufficient balance ({0}) to size a trade.")]
    InsufficientBalance(Decimal),

    #[error("Sizing arithmetic overflowed; inputs are out of range.")]
    Overflow,
}
