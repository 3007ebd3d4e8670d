//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One logical writer task linearizes all account mutations
//! - Idempotency decisions happen inside the writer, so a replayed external
//!   event can never race its first delivery
//! - Async message passing with backpressure (bounded mailbox)
//!
//! Every mutating message is handled with at most one atomic `WriteBatch`
//! against storage; a message either fully applies or leaves no trace.

use crate::metrics::Metrics;
use crate::types::{
    Account, InviteRecord, Reservation, ReservationState, Transaction, TxnKind, UserId,
};
use crate::{Config, Error, Result, Storage};
use chrono::{DateTime, Utc};
use rand::distributions::{Alphanumeric, DistString};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Invite codes are 8 uppercase alphanumeric characters
const INVITE_CODE_LEN: usize = 8;

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Create account if absent, granting the signup bonus
    CreateAccount {
        user_id: UserId,
        response: oneshot::Sender<Result<Account>>,
    },

    /// Increase balance, idempotent on `(kind, reference_key)`
    Credit {
        account_id: UserId,
        amount: u64,
        kind: TxnKind,
        reference_key: String,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Decrease balance if sufficient, idempotent on `(kind, reference_key)`
    TryDebit {
        account_id: UserId,
        amount: u64,
        kind: TxnKind,
        reference_key: String,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Get account state
    GetAccount {
        user_id: UserId,
        response: oneshot::Sender<Result<Account>>,
    },

    /// Get account transactions, oldest first
    ListTransactions {
        user_id: UserId,
        since: Option<DateTime<Utc>>,
        response: oneshot::Sender<Result<Vec<Transaction>>>,
    },

    /// Hold credit against a job
    Reserve {
        job_id: String,
        account_id: UserId,
        response: oneshot::Sender<Result<Reservation>>,
    },

    /// Consume held credit after job success
    CommitReservation {
        job_id: String,
        response: oneshot::Sender<Result<Reservation>>,
    },

    /// Return held credit after job failure or timeout
    ReleaseReservation {
        job_id: String,
        response: oneshot::Sender<Result<Reservation>>,
    },

    /// Release every HELD reservation created before `cutoff`
    SweepExpired {
        cutoff: DateTime<Utc>,
        response: oneshot::Sender<Result<usize>>,
    },

    /// Get reservation state
    GetReservation {
        job_id: String,
        response: oneshot::Sender<Result<Reservation>>,
    },

    /// Mint a new invite code for an existing account
    CreateInviteCode {
        inviter_id: UserId,
        response: oneshot::Sender<Result<String>>,
    },

    /// Attribute an invitee to an inviter and reward the inviter once
    RegisterInvitee {
        invitee_id: UserId,
        invite_code: String,
        response: oneshot::Sender<Result<InviteRecord>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Credit amounts policy
    config: Config,

    /// Prometheus counters
    metrics: Metrics,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        config: Config,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            mailbox,
            config,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown => break,
                _ => self.handle_message(msg),
            }
        }
        tracing::debug!("Ledger actor stopped");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::CreateAccount { user_id, response } => {
                let _ = response.send(self.create_account(user_id));
            }

            LedgerMessage::Credit {
                account_id,
                amount,
                kind,
                reference_key,
                response,
            } => {
                let _ = response.send(self.credit(account_id, amount, kind, &reference_key));
            }

            LedgerMessage::TryDebit {
                account_id,
                amount,
                kind,
                reference_key,
                response,
            } => {
                let _ = response.send(self.try_debit(account_id, amount, kind, &reference_key));
            }

            LedgerMessage::GetAccount { user_id, response } => {
                let _ = response.send(self.storage.get_account(user_id));
            }

            LedgerMessage::ListTransactions {
                user_id,
                since,
                response,
            } => {
                let _ = response.send(self.storage.list_account_transactions(user_id, since));
            }

            LedgerMessage::Reserve {
                job_id,
                account_id,
                response,
            } => {
                let _ = response.send(self.reserve(&job_id, account_id));
            }

            LedgerMessage::CommitReservation { job_id, response } => {
                let _ = response.send(self.commit_reservation(&job_id));
            }

            LedgerMessage::ReleaseReservation { job_id, response } => {
                let _ = response.send(self.release_reservation(&job_id));
            }

            LedgerMessage::SweepExpired { cutoff, response } => {
                let _ = response.send(self.sweep_expired(cutoff));
            }

            LedgerMessage::GetReservation { job_id, response } => {
                let _ = response.send(
                    self.storage
                        .get_reservation(&job_id)
                        .and_then(|r| r.ok_or(Error::ReservationNotFound(job_id))),
                );
            }

            LedgerMessage::CreateInviteCode {
                inviter_id,
                response,
            } => {
                let _ = response.send(self.create_invite_code(inviter_id));
            }

            LedgerMessage::RegisterInvitee {
                invitee_id,
                invite_code,
                response,
            } => {
                let _ = response.send(self.register_invitee(invitee_id, &invite_code));
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    // Operation implementations.
    //
    // The actor is the only writer, so a read-check-write sequence here is
    // atomic with respect to every other operation.

    fn create_account(&self, user_id: UserId) -> Result<Account> {
        if let Some(existing) = self.storage.maybe_account(user_id)? {
            self.metrics.replays_absorbed.inc();
            return Ok(existing);
        }

        let account = Account::new(user_id, self.config.signup_bonus);
        let txn = Transaction::new(
            user_id,
            self.config.signup_bonus as i64,
            TxnKind::SignupBonus,
            user_id.to_string(),
        );

        self.storage.commit_mutation(&account, &txn)?;
        self.metrics.transactions_total.inc();

        tracing::info!(user_id = %user_id, bonus = self.config.signup_bonus, "Account created");

        Ok(account)
    }

    fn credit(
        &self,
        account_id: UserId,
        amount: u64,
        kind: TxnKind,
        reference_key: &str,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(Error::InvalidAmount("Credit amount must be positive".to_string()));
        }

        if let Some(existing) = self.storage.find_transaction(kind, reference_key)? {
            self.metrics.replays_absorbed.inc();
            tracing::debug!(kind = %kind, reference_key, "Credit replay absorbed");
            return Ok(existing);
        }

        let mut account = self.storage.get_account(account_id)?;
        account.balance += amount;
        account.touch();

        let txn = Transaction::new(account_id, amount as i64, kind, reference_key);
        self.storage.commit_mutation(&account, &txn)?;
        self.metrics.transactions_total.inc();

        Ok(txn)
    }

    fn try_debit(
        &self,
        account_id: UserId,
        amount: u64,
        kind: TxnKind,
        reference_key: &str,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(Error::InvalidAmount("Debit amount must be positive".to_string()));
        }

        if let Some(existing) = self.storage.find_transaction(kind, reference_key)? {
            self.metrics.replays_absorbed.inc();
            tracing::debug!(kind = %kind, reference_key, "Debit replay absorbed");
            return Ok(existing);
        }

        let mut account = self.storage.get_account(account_id)?;
        if account.balance < amount {
            self.metrics.debits_refused.inc();
            return Err(Error::InsufficientCredit {
                available: account.balance,
                required: amount,
            });
        }

        account.balance -= amount;
        account.touch();

        let txn = Transaction::new(account_id, -(amount as i64), kind, reference_key);
        self.storage.commit_mutation(&account, &txn)?;
        self.metrics.transactions_total.inc();

        Ok(txn)
    }

    fn reserve(&self, job_id: &str, account_id: UserId) -> Result<Reservation> {
        if let Some(existing) = self.storage.get_reservation(job_id)? {
            if existing.account_id != account_id {
                return Err(Error::DuplicateJob {
                    job_id: job_id.to_string(),
                });
            }
            self.metrics.replays_absorbed.inc();
            return Ok(existing);
        }

        let amount = self.config.job_hold_amount;
        let mut account = self.storage.get_account(account_id)?;
        if account.balance < amount {
            self.metrics.debits_refused.inc();
            return Err(Error::InsufficientCredit {
                available: account.balance,
                required: amount,
            });
        }

        account.balance -= amount;
        account.touch();

        let txn = Transaction::new(account_id, -(amount as i64), TxnKind::JobReserve, job_id);
        let reservation = Reservation::held(job_id, account_id, amount);

        self.storage
            .commit_mutation_with_reservation(&account, &txn, &reservation)?;
        self.metrics.transactions_total.inc();

        tracing::info!(job_id, account = %account_id, balance = account.balance, "Credit held");

        Ok(reservation)
    }

    fn commit_reservation(&self, job_id: &str) -> Result<Reservation> {
        let mut reservation = self
            .storage
            .get_reservation(job_id)?
            .ok_or_else(|| Error::ReservationNotFound(job_id.to_string()))?;

        if reservation.is_terminal() {
            self.metrics.replays_absorbed.inc();
            return Ok(reservation);
        }

        reservation.state = ReservationState::Committed;
        reservation.updated_at = Utc::now();

        // Zero-delta marker: the credit was spent at reserve time
        let mut account = self.storage.get_account(reservation.account_id)?;
        account.touch();
        let txn = Transaction::new(reservation.account_id, 0, TxnKind::JobCommit, job_id);

        self.storage
            .commit_mutation_with_reservation(&account, &txn, &reservation)?;
        self.metrics.transactions_total.inc();

        tracing::info!(job_id, account = %reservation.account_id, "Reservation committed");

        Ok(reservation)
    }

    fn release_reservation(&self, job_id: &str) -> Result<Reservation> {
        let mut reservation = self
            .storage
            .get_reservation(job_id)?
            .ok_or_else(|| Error::ReservationNotFound(job_id.to_string()))?;

        if reservation.is_terminal() {
            self.metrics.replays_absorbed.inc();
            return Ok(reservation);
        }

        reservation.state = ReservationState::Released;
        reservation.updated_at = Utc::now();

        let mut account = self.storage.get_account(reservation.account_id)?;
        account.balance += reservation.amount;
        account.touch();

        let txn = Transaction::new(
            reservation.account_id,
            reservation.amount as i64,
            TxnKind::JobRelease,
            job_id,
        );

        self.storage
            .commit_mutation_with_reservation(&account, &txn, &reservation)?;
        self.metrics.transactions_total.inc();

        tracing::info!(
            job_id,
            account = %reservation.account_id,
            refund = reservation.amount,
            "Reservation released"
        );

        Ok(reservation)
    }

    fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let expired = self.storage.list_expired_held(cutoff)?;
        let mut released = 0usize;

        for job_id in expired {
            match self.release_reservation(&job_id) {
                Ok(res) if res.state == ReservationState::Released => {
                    released += 1;
                    self.metrics.reservations_swept.inc();
                }
                Ok(_) => {} // raced a commit; terminal state wins
                Err(e) => {
                    tracing::error!(job_id, error = %e, "Sweep release failed");
                }
            }
        }

        if released > 0 {
            tracing::info!(released, "Expired reservations reclaimed");
        }

        Ok(released)
    }

    fn create_invite_code(&self, inviter_id: UserId) -> Result<String> {
        // Codes belong to registered accounts only
        self.storage.get_account(inviter_id)?;

        loop {
            let code = Alphanumeric
                .sample_string(&mut rand::thread_rng(), INVITE_CODE_LEN)
                .to_uppercase();

            if self.storage.resolve_invite_code(&code)?.is_none() {
                self.storage.put_invite_code(&code, inviter_id)?;
                tracing::info!(inviter = %inviter_id, code, "Invite code created");
                return Ok(code);
            }
        }
    }

    fn register_invitee(&self, invitee_id: UserId, invite_code: &str) -> Result<InviteRecord> {
        // First successful registration wins; later attempts with any code
        // return the original attribution
        if let Some(existing) = self.storage.get_invite(invitee_id)? {
            self.metrics.replays_absorbed.inc();
            return Ok(existing);
        }

        let inviter_id = self
            .storage
            .resolve_invite_code(invite_code)?
            .ok_or_else(|| Error::InvalidCode(invite_code.to_string()))?;

        if inviter_id == invitee_id {
            return Err(Error::SelfReferral(invitee_id.to_string()));
        }

        let reward = self.config.invite_reward;
        let mut inviter_account = self.storage.get_account(inviter_id)?;
        inviter_account.balance += reward;
        inviter_account.touch();

        let txn = Transaction::new(
            inviter_id,
            reward as i64,
            TxnKind::InviteReward,
            invitee_id.to_string(),
        );

        let record = InviteRecord {
            inviter_id,
            invitee_id,
            invite_code: invite_code.to_string(),
            rewarded: true,
            created_at: Utc::now(),
        };

        self.storage
            .commit_mutation_with_invite(&inviter_account, &txn, &record)?;
        self.metrics.transactions_total.inc();

        tracing::info!(inviter = %inviter_id, invitee = %invitee_id, "Invite reward granted");

        Ok(record)
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Create account if absent
    pub async fn create_account(&self, user_id: UserId) -> Result<Account> {
        self.request(|response| LedgerMessage::CreateAccount { user_id, response })
            .await
    }

    /// Credit an account
    pub async fn credit(
        &self,
        account_id: UserId,
        amount: u64,
        kind: TxnKind,
        reference_key: impl Into<String>,
    ) -> Result<Transaction> {
        let reference_key = reference_key.into();
        self.request(|response| LedgerMessage::Credit {
            account_id,
            amount,
            kind,
            reference_key,
            response,
        })
        .await
    }

    /// Debit an account if the balance allows it
    pub async fn try_debit(
        &self,
        account_id: UserId,
        amount: u64,
        kind: TxnKind,
        reference_key: impl Into<String>,
    ) -> Result<Transaction> {
        let reference_key = reference_key.into();
        self.request(|response| LedgerMessage::TryDebit {
            account_id,
            amount,
            kind,
            reference_key,
            response,
        })
        .await
    }

    /// Get account state
    pub async fn get_account(&self, user_id: UserId) -> Result<Account> {
        self.request(|response| LedgerMessage::GetAccount { user_id, response })
            .await
    }

    /// Get account transactions
    pub async fn list_transactions(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>> {
        self.request(|response| LedgerMessage::ListTransactions {
            user_id,
            since,
            response,
        })
        .await
    }

    /// Hold credit against a job
    pub async fn reserve(&self, job_id: impl Into<String>, account_id: UserId) -> Result<Reservation> {
        let job_id = job_id.into();
        self.request(|response| LedgerMessage::Reserve {
            job_id,
            account_id,
            response,
        })
        .await
    }

    /// Consume held credit after job success
    pub async fn commit_reservation(&self, job_id: impl Into<String>) -> Result<Reservation> {
        let job_id = job_id.into();
        self.request(|response| LedgerMessage::CommitReservation { job_id, response })
            .await
    }

    /// Return held credit after job failure or timeout
    pub async fn release_reservation(&self, job_id: impl Into<String>) -> Result<Reservation> {
        let job_id = job_id.into();
        self.request(|response| LedgerMessage::ReleaseReservation { job_id, response })
            .await
    }

    /// Release every HELD reservation created before `cutoff`
    pub async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.request(|response| LedgerMessage::SweepExpired { cutoff, response })
            .await
    }

    /// Get reservation state
    pub async fn get_reservation(&self, job_id: impl Into<String>) -> Result<Reservation> {
        let job_id = job_id.into();
        self.request(|response| LedgerMessage::GetReservation { job_id, response })
            .await
    }

    /// Mint a new invite code
    pub async fn create_invite_code(&self, inviter_id: UserId) -> Result<String> {
        self.request(|response| LedgerMessage::CreateInviteCode {
            inviter_id,
            response,
        })
        .await
    }

    /// Attribute an invitee and reward the inviter once
    pub async fn register_invitee(
        &self,
        invitee_id: UserId,
        invite_code: impl Into<String>,
    ) -> Result<InviteRecord> {
        let invite_code = invite_code.into();
        self.request(|response| LedgerMessage::RegisterInvitee {
            invitee_id,
            invite_code,
            response,
        })
        .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(storage: Arc<Storage>, config: Config, metrics: Metrics) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, rx, config, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
