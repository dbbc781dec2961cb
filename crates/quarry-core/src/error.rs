use thiserror::Error;

/// HTTP statuses the remote API uses for transient conditions.
pub const RETRYABLE_STATUS_CODES: [u16; 6] = [403, 429, 500, 502, 503, 504];

/// Application-wide error types for Quarry.
#[derive(Error, Debug)]
pub enum AppError {
    /// The remote API answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    HttpError { status: u16, message: String },

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Remote rate limit hit.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Comments are disabled on the requested child resource.
    #[error("Comments disabled")]
    CommentsDisabled,

    /// The requested remote object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The daily operation budget cannot cover the requested charge.
    #[error("Daily quota exceeded: used {used}/{capacity}, requested {requested}")]
    QuotaExceeded {
        used: u64,
        capacity: u64,
        requested: u64,
    },

    /// A transient failure persisted through every retry attempt.
    #[error("Failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Reading or writing a persisted ledger failed.
    #[error("Ledger I/O error: {0}")]
    LedgerIo(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::HttpError { status, .. } => RETRYABLE_STATUS_CODES.contains(status),
            _ => false,
        }
    }

    /// Returns true if this error means the remote source has nothing to give,
    /// as opposed to a failure worth reporting.
    pub fn is_terminal_empty(&self) -> bool {
        matches!(self, AppError::CommentsDisabled)
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, AppError::QuotaExceeded { .. })
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::LedgerIo(e.to_string())
    }
}
