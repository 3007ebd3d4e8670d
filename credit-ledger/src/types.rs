//! Core types for the credit ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Integer credit arithmetic (no fractional units)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable external user identity (Telegram user id upstream)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(i64);

impl UserId {
    /// Create new user ID
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw value
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Big-endian key bytes for storage
    pub fn key_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-user credit account
///
/// `balance` is unsigned: a debit that would cross zero is refused before
/// the subtraction, so a negative balance is unrepresentable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// External user identity
    pub user_id: UserId,

    /// Current credit balance
    pub balance: u64,

    /// Monotonic counter, incremented on every mutation
    pub version: u64,

    /// Account creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a fresh account with the signup bonus already applied
    pub fn new(user_id: UserId, initial_balance: u64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: initial_balance,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a mutation: bump version and timestamp
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

/// Balance mutation kind
///
/// Each kind has a stable `u8` tag used as the prefix of the
/// `(kind, reference_key)` idempotency index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxnKind {
    /// Free credit granted on first registration
    SignupBonus = 1,
    /// Reward to an inviter for a unique registered invitee
    InviteReward = 2,
    /// Purchase settled via Telegram Stars
    PurchaseStars = 3,
    /// Purchase settled via UPI
    PurchaseUpi = 4,
    /// Credit held against an accepted job
    JobReserve = 5,
    /// Zero-delta marker: held credit consumed by a successful job
    JobCommit = 6,
    /// Held credit returned after job failure or timeout
    JobRelease = 7,
    /// Manual grant from the admin panel
    AdminGrant = 8,
}

impl TxnKind {
    /// Stable index-key tag
    pub fn tag(&self) -> u8 {
        *self as u8
    }

    /// Human-readable name for logs
    pub fn name(&self) -> &'static str {
        match self {
            TxnKind::SignupBonus => "signup_bonus",
            TxnKind::InviteReward => "invite_reward",
            TxnKind::PurchaseStars => "purchase_stars",
            TxnKind::PurchaseUpi => "purchase_upi",
            TxnKind::JobReserve => "job_reserve",
            TxnKind::JobCommit => "job_commit",
            TxnKind::JobRelease => "job_release",
            TxnKind::AdminGrant => "admin_grant",
        }
    }
}

impl fmt::Display for TxnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Immutable record of one balance mutation
///
/// Append-only: never mutated or deleted. `(kind, reference_key)` is unique,
/// which is what makes redelivered external events no-ops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (UUIDv7 for time-ordering)
    pub txn_id: Uuid,

    /// Account this transaction belongs to
    pub account_id: UserId,

    /// Signed balance delta
    pub delta: i64,

    /// Mutation kind
    pub kind: TxnKind,

    /// External idempotency key (payment ID, invitee ID, or job ID)
    pub reference_key: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction record
    pub fn new(account_id: UserId, delta: i64, kind: TxnKind, reference_key: impl Into<String>) -> Self {
        Self {
            txn_id: Uuid::now_v7(),
            account_id,
            delta,
            kind,
            reference_key: reference_key.into(),
            created_at: Utc::now(),
        }
    }
}

/// Reservation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReservationState {
    /// Credit held, job in flight
    Held = 1,
    /// Job succeeded, held credit consumed (terminal)
    Committed = 2,
    /// Job failed or timed out, credit returned (terminal)
    Released = 3,
}

/// Credit held against an in-flight job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// External job identity
    pub job_id: String,

    /// Account the hold was taken from
    pub account_id: UserId,

    /// Held amount (1 credit per job in the default policy)
    pub amount: u64,

    /// Current lifecycle state
    pub state: ReservationState,

    /// Hold creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last state transition timestamp
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Create a new HELD reservation
    pub fn held(job_id: impl Into<String>, account_id: UserId, amount: u64) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            account_id,
            amount,
            state: ReservationState::Held,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if reservation is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            ReservationState::Committed | ReservationState::Released
        )
    }
}

/// Referral outcome for one invitee
///
/// At most one record per invitee ever exists; the first successful
/// registration decides the attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteRecord {
    /// Account that owns the invite code
    pub inviter_id: UserId,

    /// Registered invitee
    pub invitee_id: UserId,

    /// Code the invitee registered with
    pub invite_code: String,

    /// Whether the inviter reward has been granted
    pub rewarded: bool,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_key_bytes_roundtrip() {
        let user = UserId::new(123_456_789);
        let bytes = user.key_bytes();
        assert_eq!(i64::from_be_bytes(bytes), 123_456_789);
    }

    #[test]
    fn test_txn_kind_tags_distinct() {
        let kinds = [
            TxnKind::SignupBonus,
            TxnKind::InviteReward,
            TxnKind::PurchaseStars,
            TxnKind::PurchaseUpi,
            TxnKind::JobReserve,
            TxnKind::JobCommit,
            TxnKind::JobRelease,
            TxnKind::AdminGrant,
        ];
        let mut tags: Vec<u8> = kinds.iter().map(|k| k.tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), kinds.len());
    }

    #[test]
    fn test_reservation_terminal_states() {
        let mut res = Reservation::held("job-1", UserId::new(1), 1);
        assert!(!res.is_terminal());

        res.state = ReservationState::Committed;
        assert!(res.is_terminal());

        res.state = ReservationState::Released;
        assert!(res.is_terminal());
    }

    #[test]
    fn test_account_touch_bumps_version() {
        let mut account = Account::new(UserId::new(7), 1);
        assert_eq!(account.version, 1);
        account.touch();
        assert_eq!(account.version, 2);
    }
}
