use thiserror::Error;

/// Error type shared by the trading core and the broker adapter.
#[derive(Error, Debug)]
pub enum TraderError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Broker error [{code}]: {message}")]
    Broker { code: String, message: String },

    #[error("Alert delivery failed with status {0}")]
    Alert(u16),

    #[error("Call timed out after {elapsed_ms}ms: {operation}")]
    Timeout { operation: &'static str, elapsed_ms: u64 },

    // Market data errors
    #[error("Price unavailable for {0}")]
    DataUnavailable(String),

    #[error("No replay data for any instrument")]
    EmptyReplay,

    // Order execution errors
    #[error("Order rejected for {code}: {reason}")]
    OrderRejected { code: String, reason: String },

    #[error("Order outcome unknown for {code}, position state may be out of sync: {reason}")]
    StateUncertain { code: String, reason: String },
}

/// Result type alias for TraderError
pub type Result<T> = std::result::Result<T, TraderError>;

impl TraderError {
    pub fn config(msg: impl Into<String>) -> Self {
        TraderError::Config(msg.into())
    }
}
