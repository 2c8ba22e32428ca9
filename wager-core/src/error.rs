use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error taxonomy. Every fallible operation in every component
/// returns into this type; the HTTP layer is the single place that classifies
/// a variant into a status code and response envelope.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("account locked until {minutes_remaining} minute(s) from now")]
    Locked { minutes_remaining: i64 },

    #[error("insufficient funds in account {account_id}")]
    InsufficientFunds { account_id: i64 },

    #[error("unknown account: {0}")]
    UnknownAccount(i64),

    #[error("otp invalid or expired")]
    OtpInvalid,

    #[error("provider error (transient): {0}")]
    ProviderTransient(String),

    #[error("provider error (auth): {0}")]
    ProviderAuthError(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    /// Whether this error is safe to retry with identical inputs (used by the
    /// payment poller and webhook dispatcher backoff loops).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ProviderTransient(_) | Error::Store(_))
    }
}
