use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventsError {
    #[error("Failed to encode trade event: {0}")]
    Encode(#[from] serde_json::Error),
}
