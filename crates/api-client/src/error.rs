use thiserror::Error;

/// Errors surfaced by an exchange client.
///
/// Exchange rejections that callers react to differently get their own variant;
/// everything else lands in `Exchange` with the raw code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Failed to parse the API response: {0}")]
    Parse(String),

    #[error("Insufficient margin: {0}")]
    InsufficientMargin(String),

    #[error("Quantity or price precision rejected: {0}")]
    InvalidPrecision(String),

    #[error("Order notional below the exchange minimum: {0}")]
    MinNotional(String),

    #[error("Trigger price would fire immediately: {0}")]
    WouldTrigger(String),

    #[error("Rate limited by the exchange: {0}")]
    RateLimited(String),

    #[error("Symbol not listed on the exchange: {0}")]
    UnknownSymbol(String),

    #[error("Failed to sign the request: {0}")]
    Signing(String),

    #[error("Exchange error {code}: {msg}")]
    Exchange { code: i64, msg: String },
}

impl ApiError {
    /// Maps a Binance error code onto the typed taxonomy.
    pub fn from_exchange(code: i64, msg: String) -> Self {
        match code {
            -2019 => ApiError::InsufficientMargin(msg),
            -1111 | -1013 | -4014 | -4003 => ApiError::InvalidPrecision(msg),
            -4164 => ApiError::MinNotional(msg),
            -2021 => ApiError::WouldTrigger(msg),
            -1003 | -1015 => ApiError::RateLimited(msg),
            -1007 => ApiError::Timeout(msg),
            -1121 => ApiError::UnknownSymbol(msg),
            _ => ApiError::Exchange { code, msg },
        }
    }

    /// Errors worth retrying for idempotent requests.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::Timeout(_) | ApiError::RateLimited(_)
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout(e.to_string())
        } else if e.is_decode() {
            ApiError::Parse(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}
