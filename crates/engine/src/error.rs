use crate::state::BotState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API client error: {0}")]
    ApiClient(#[from] api_client::ApiError),

    #[error("Database error: {0}")]
    Database(#[from] database::DbError),

    #[error("Signal error: {0}")]
    Signal(#[from] signals::SignalError),

    #[error("Risk management error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Execution error: {0}")]
    Execution(#[from] executor::ExecutionError),

    #[error("Bot for '{0}' not found in the engine.")]
    BotNotFound(String),

    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: BotState, to: BotState },

    #[error("Monitor task failed: {0}")]
    MonitorJoin(#[from] tokio::task::JoinError),
}
