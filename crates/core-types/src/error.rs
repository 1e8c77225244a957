use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A stored or user-supplied signal name that is not `LONG`, `SHORT` or `NONE`.
    #[error("Unknown signal value: {0}")]
    UnknownSignal(String),
}
