//! Error types for the payment settlement pipeline

use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] credit_ledger::Error),

    /// Payment amount does not match any price-table tier
    #[error("Payment amount not in price table: {0}")]
    InvalidPaymentAmount(String),

    /// Notification failed signature verification
    ///
    /// Deliberately carries no detail: the caller must not learn which part
    /// of the check failed.
    #[error("Signature verification failed")]
    Signature,

    /// Required notification field missing or malformed
    #[error("Malformed payment notification: {0}")]
    MalformedNotification(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
