use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("Signal evaluator received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Candle at index {index} is malformed: {reason}")]
    InvalidCandle { index: usize, reason: String },

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(String),
}
