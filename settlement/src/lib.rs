//! Payment settlement pipeline
//!
//! Bridges external payment channels (Telegram Stars, UPI webhooks) onto the
//! credit ledger. Each accepted payment becomes exactly one idempotent ledger
//! credit keyed by the provider's payment identifier, so redelivered
//! notifications never double-credit. UPI notifications are authenticated
//! with HMAC-SHA256 before the ledger is touched; amounts outside the price
//! tables are refused rather than settled proportionally.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod verify;

pub use config::{Config, StarsTier, UpiTier};
pub use error::{Error, Result};
pub use pipeline::{SettlementPipeline, UpiNotification};
