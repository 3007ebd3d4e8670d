//! Error types for the credit ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Reservation not found
    #[error("Reservation not found for job: {0}")]
    ReservationNotFound(String),

    /// Debit refused, no state change
    #[error("Insufficient credit: available {available}, required {required}")]
    InsufficientCredit {
        /// Balance at the time of the refused debit
        available: u64,
        /// Amount the debit asked for
        required: u64,
    },

    /// Reserve attempted for a job_id already held by a different account
    #[error("Job {job_id} is already reserved by another account")]
    DuplicateJob {
        /// The contested job identity
        job_id: String,
    },

    /// Invite code does not resolve to an inviter
    #[error("Invalid invite code: {0}")]
    InvalidCode(String),

    /// Invitee tried to use their own code
    #[error("Self-referral rejected for user {0}")]
    SelfReferral(String),

    /// Zero or otherwise malformed amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Other(err.to_string())
    }
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
