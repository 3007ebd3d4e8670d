//! SwapCredit Ledger Core
//!
//! Per-user credit accounts with an append-only transaction log, a
//! reserve-commit-release protocol binding credit spend to job lifecycle,
//! and an invite-reward guard.
//!
//! # Architecture
//!
//! - **Single Writer**: one actor task linearizes all mutations
//! - **Idempotency Keys**: a unique `(kind, reference_key)` index makes
//!   redelivered external events no-ops
//! - **Atomic Batches**: balance change and transaction record commit
//!   together or not at all
//!
//! # Invariants
//!
//! - Non-negative balances: a debit never crosses zero
//! - Conservation: `balance == Σ(delta)` for every account, at all times
//! - Append-only: transactions are never modified or deleted
//! - Terminal reservations absorb replayed completion/failure signals

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod invite;
pub mod ledger;
pub mod metrics;
pub mod reservation;
pub mod storage;
pub mod types;

// Re-exports
pub use config::{Config, SweepConfig};
pub use error::{Error, Result};
pub use invite::InviteRewardGuard;
pub use ledger::CreditLedger;
pub use reservation::{ReservationCoordinator, ReservationSweeper};
pub use storage::Storage;
pub use types::{
    Account, InviteRecord, Reservation, ReservationState, Transaction, TxnKind, UserId,
};
