//! Reservation coordinator and timeout sweep
//!
//! Binds a job's lifecycle to a ledger hold:
//!
//! ```text
//! NONE ──reserve──► HELD ──commit──► COMMITTED (terminal)
//!                     │
//!                     └──release──► RELEASED (terminal, credit returned)
//! ```
//!
//! The hold is taken at submission time, which closes the race where two
//! simultaneous submissions both observe a balance of 1 and both proceed.
//! Terminal states absorb replayed completion and failure signals.

use crate::{
    actor::LedgerHandle,
    config::SweepConfig,
    types::{Reservation, UserId},
    Result,
};
use chrono::Utc;

/// Coordinates job lifecycle against ledger holds
#[derive(Clone)]
pub struct ReservationCoordinator {
    handle: LedgerHandle,
}

impl ReservationCoordinator {
    /// Create coordinator over a ledger handle
    pub fn new(handle: LedgerHandle) -> Self {
        Self { handle }
    }

    /// Hold one job's worth of credit for `account_id`
    ///
    /// Idempotent per `job_id`: a repeat submission returns the recorded
    /// reservation. A `job_id` already held by a different account is an
    /// integration error ([`crate::Error::DuplicateJob`]).
    pub async fn reserve(&self, job_id: impl Into<String>, account_id: UserId) -> Result<Reservation> {
        self.handle.reserve(job_id, account_id).await
    }

    /// Mark the job's held credit as consumed (job succeeded)
    ///
    /// No-op when the reservation is already terminal.
    pub async fn commit(&self, job_id: impl Into<String>) -> Result<Reservation> {
        self.handle.commit_reservation(job_id).await
    }

    /// Return the job's held credit (job failed or expired)
    ///
    /// No-op when the reservation is already terminal.
    pub async fn release(&self, job_id: impl Into<String>) -> Result<Reservation> {
        self.handle.release_reservation(job_id).await
    }

    /// Current reservation state for `job_id`
    pub async fn get(&self, job_id: impl Into<String>) -> Result<Reservation> {
        self.handle.get_reservation(job_id).await
    }
}

/// Background reconciliation sweep
///
/// Releases HELD reservations whose jobs have not reported completion
/// within the configured timeout. Safe to run concurrently with late
/// completion signals: whichever terminal transition reaches the ledger
/// first wins, the other becomes a no-op.
pub struct ReservationSweeper {
    handle: LedgerHandle,
    config: SweepConfig,
}

impl ReservationSweeper {
    /// Create sweeper over a ledger handle
    pub fn new(handle: LedgerHandle, config: SweepConfig) -> Self {
        Self { handle, config }
    }

    /// Release all holds older than the configured job timeout
    pub async fn sweep_once(&self) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.job_timeout_secs as i64);
        self.handle.sweep_expired(cutoff).await
    }

    /// Run the sweep loop until the ledger shuts down
    pub async fn run(&self) {
        if !self.config.enabled {
            tracing::info!("Reservation sweep disabled");
            return;
        }

        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(self.config.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.config.interval_secs,
            job_timeout_secs = self.config.job_timeout_secs,
            "Reservation sweep started"
        );

        loop {
            interval.tick().await;

            match self.sweep_once().await {
                Ok(_) => {}
                Err(crate::Error::Concurrency(_)) => {
                    // Ledger actor is gone; nothing left to sweep
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Reservation sweep failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, CreditLedger, Error, TxnKind};

    async fn create_test_ledger() -> (CreditLedger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        (CreditLedger::open(config).await.unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn test_concurrent_reserves_take_one_hold() {
        let (ledger, _temp) = create_test_ledger().await;

        // Fresh account: exactly one credit
        let user = UserId::new(2001);
        ledger.create_account(user).await.unwrap();

        let coordinator = ReservationCoordinator::new(ledger.handle());

        let a = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.reserve("job-a", user).await })
        };
        let b = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.reserve("job-b", user).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let refusals = results
            .iter()
            .filter(|r| matches!(r, Err(Error::InsufficientCredit { .. })))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(refusals, 1);
        assert_eq!(ledger.get_balance(user).await.unwrap(), 0);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reserve_then_fail_refunds() {
        let (ledger, _temp) = create_test_ledger().await;

        let user = UserId::new(2002);
        ledger.create_account(user).await.unwrap();
        ledger
            .credit(user, 4, TxnKind::AdminGrant, "topup")
            .await
            .unwrap();

        let coordinator = ReservationCoordinator::new(ledger.handle());

        // balance 5 -> 4 on reserve
        coordinator.reserve("job-f", user).await.unwrap();
        assert_eq!(ledger.get_balance(user).await.unwrap(), 4);

        // failure: 4 -> 5
        coordinator.release("job-f").await.unwrap();
        assert_eq!(ledger.get_balance(user).await.unwrap(), 5);

        // late duplicate failure event is a no-op
        coordinator.release("job-f").await.unwrap();
        assert_eq!(ledger.get_balance(user).await.unwrap(), 5);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_races_late_commit() {
        let (ledger, _temp) = create_test_ledger().await;

        let user = UserId::new(2003);
        ledger.create_account(user).await.unwrap();

        let coordinator = ReservationCoordinator::new(ledger.handle());
        coordinator.reserve("job-slow", user).await.unwrap();

        // Job completes just before the sweep would have reclaimed it
        coordinator.commit("job-slow").await.unwrap();

        let mut config = SweepConfig::default();
        config.job_timeout_secs = 0;
        let sweeper = ReservationSweeper::new(ledger.handle(), config);

        // The committed reservation is terminal; the sweep must not refund
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
        assert_eq!(ledger.get_balance(user).await.unwrap(), 0);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_reclaims_timed_out_hold() {
        let (ledger, _temp) = create_test_ledger().await;

        let user = UserId::new(2004);
        ledger.create_account(user).await.unwrap();

        let coordinator = ReservationCoordinator::new(ledger.handle());
        coordinator.reserve("job-stuck", user).await.unwrap();
        assert_eq!(ledger.get_balance(user).await.unwrap(), 0);

        let mut config = SweepConfig::default();
        config.job_timeout_secs = 0;
        let sweeper = ReservationSweeper::new(ledger.handle(), config);

        // job_timeout 0: the hold is immediately stale
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
        assert_eq!(ledger.get_balance(user).await.unwrap(), 1);

        // A very late failure report from the job pipeline is a no-op
        coordinator.release("job-stuck").await.unwrap();
        assert_eq!(ledger.get_balance(user).await.unwrap(), 1);

        ledger.shutdown().await.unwrap();
    }
}
