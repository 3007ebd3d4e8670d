//! Main ledger orchestration layer
//!
//! This module ties together storage, actor, and metrics components into a
//! high-level API for account and credit operations. It is the only writer
//! of the underlying store; the reservation coordinator and invite guard
//! operate through the same actor handle.
//!
//! # Example
//!
//! ```no_run
//! use credit_ledger::{Config, CreditLedger, UserId};
//!
//! #[tokio::main]
//! async fn main() -> credit_ledger::Result<()> {
//!     let config = Config::default();
//!     let ledger = CreditLedger::open(config).await?;
//!
//!     let account = ledger.create_account(UserId::new(1)).await?;
//!     assert_eq!(account.balance, 1); // signup bonus
//!
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    metrics::Metrics,
    types::{Account, Transaction, TxnKind, UserId},
    Config, Result, Storage,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Main credit ledger interface
pub struct CreditLedger {
    /// Actor handle for all operations
    handle: LedgerHandle,

    /// Prometheus counters
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl CreditLedger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new()?;
        let handle = spawn_ledger_actor(storage, config.clone(), metrics.clone());

        Ok(Self {
            handle,
            metrics,
            config,
        })
    }

    /// Actor handle for collaborators (reservation coordinator, invite
    /// guard, settlement pipeline)
    pub fn handle(&self) -> LedgerHandle {
        self.handle.clone()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration this ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create an account for `user_id`, granting the signup bonus
    ///
    /// Idempotent: an existing account is returned unchanged and no second
    /// bonus is granted.
    pub async fn create_account(&self, user_id: UserId) -> Result<Account> {
        self.handle.create_account(user_id).await
    }

    /// Increase `account_id`'s balance by `amount`
    ///
    /// Idempotent on `(kind, reference_key)`: a replay returns the
    /// transaction recorded for the first delivery.
    pub async fn credit(
        &self,
        account_id: UserId,
        amount: u64,
        kind: TxnKind,
        reference_key: impl Into<String>,
    ) -> Result<Transaction> {
        self.handle.credit(account_id, amount, kind, reference_key).await
    }

    /// Atomically check-and-decrement `account_id`'s balance
    ///
    /// Fails with [`crate::Error::InsufficientCredit`] and no state change
    /// when the balance would cross zero. Same idempotency contract as
    /// [`CreditLedger::credit`].
    pub async fn try_debit(
        &self,
        account_id: UserId,
        amount: u64,
        kind: TxnKind,
        reference_key: impl Into<String>,
    ) -> Result<Transaction> {
        self.handle.try_debit(account_id, amount, kind, reference_key).await
    }

    /// Current balance for `user_id`
    pub async fn get_balance(&self, user_id: UserId) -> Result<u64> {
        Ok(self.handle.get_account(user_id).await?.balance)
    }

    /// Full account state for `user_id`
    pub async fn get_account(&self, user_id: UserId) -> Result<Account> {
        self.handle.get_account(user_id).await
    }

    /// Account transaction history, oldest first
    pub async fn list_transactions(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>> {
        self.handle.list_transactions(user_id, since).await
    }

    /// Grant credits from the admin panel
    ///
    /// Same idempotent-credit contract, keyed by `admin_reference`.
    pub async fn grant_admin_credits(
        &self,
        user_id: UserId,
        amount: u64,
        admin_reference: impl Into<String>,
    ) -> Result<Transaction> {
        self.handle
            .credit(user_id, amount, TxnKind::AdminGrant, admin_reference)
            .await
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_ledger() -> (CreditLedger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        (CreditLedger::open(config).await.unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let (ledger, _temp) = create_test_ledger().await;
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_new_registration_grants_one_credit() {
        let (ledger, _temp) = create_test_ledger().await;

        let user = UserId::new(1001);
        ledger.create_account(user).await.unwrap();

        assert_eq!(ledger.get_balance(user).await.unwrap(), 1);

        let txns = ledger.list_transactions(user, None).await.unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].kind, TxnKind::SignupBonus);
        assert_eq!(txns[0].delta, 1);
        assert_eq!(txns[0].reference_key, user.to_string());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_admin_grant_idempotent() {
        let (ledger, _temp) = create_test_ledger().await;

        let user = UserId::new(1002);
        ledger.create_account(user).await.unwrap();

        let txn = ledger
            .grant_admin_credits(user, 10, "ticket-4711")
            .await
            .unwrap();
        assert_eq!(ledger.get_balance(user).await.unwrap(), 11);

        let replay = ledger
            .grant_admin_credits(user, 10, "ticket-4711")
            .await
            .unwrap();
        assert_eq!(replay.txn_id, txn.txn_id);
        assert_eq!(ledger.get_balance(user).await.unwrap(), 11);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_conservation_balance_equals_delta_sum() {
        let (ledger, _temp) = create_test_ledger().await;

        let user = UserId::new(1003);
        ledger.create_account(user).await.unwrap();
        ledger
            .credit(user, 23, TxnKind::PurchaseUpi, "order-1")
            .await
            .unwrap();
        ledger
            .try_debit(user, 5, TxnKind::JobReserve, "job-x")
            .await
            .unwrap();

        let txns = ledger.list_transactions(user, None).await.unwrap();
        let delta_sum: i64 = txns.iter().map(|t| t.delta).sum();
        let balance = ledger.get_balance(user).await.unwrap();

        assert_eq!(delta_sum, balance as i64);
        assert_eq!(balance, 19);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_transactions_since() {
        let (ledger, _temp) = create_test_ledger().await;

        let user = UserId::new(1004);
        ledger.create_account(user).await.unwrap();

        let cutoff = Utc::now();
        ledger
            .grant_admin_credits(user, 2, "grant-late")
            .await
            .unwrap();

        let recent = ledger.list_transactions(user, Some(cutoff)).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].kind, TxnKind::AdminGrant);

        ledger.shutdown().await.unwrap();
    }
}
