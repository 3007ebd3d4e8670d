//! Invite reward guard
//!
//! Grants exactly one reward credit per unique successfully-registered
//! invitee. The attribution is decided by the first registration and the
//! reward commits atomically with the invite record, so neither webhook
//! replays nor racing registrations can double-pay an inviter.

use crate::{
    actor::LedgerHandle,
    types::{InviteRecord, UserId},
    Result,
};

/// Guards invite rewards against replay and self-referral
#[derive(Clone)]
pub struct InviteRewardGuard {
    handle: LedgerHandle,
}

impl InviteRewardGuard {
    /// Create guard over a ledger handle
    pub fn new(handle: LedgerHandle) -> Self {
        Self { handle }
    }

    /// Mint a new invite code owned by `inviter_id`
    ///
    /// The inviter must have a registered account.
    pub async fn create_invite_code(&self, inviter_id: UserId) -> Result<String> {
        self.handle.create_invite_code(inviter_id).await
    }

    /// Register `invitee_id` under `invite_code`
    ///
    /// The first valid registration creates the record and credits the
    /// inviter; any later registration for the same invitee returns the
    /// original record unchanged. Self-referral and unknown codes are
    /// rejected without ledger effect.
    pub async fn register_invitee(
        &self,
        invitee_id: UserId,
        invite_code: impl Into<String>,
    ) -> Result<InviteRecord> {
        self.handle.register_invitee(invitee_id, invite_code).await
    }
}
