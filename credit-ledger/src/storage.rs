//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account state (key: user_id, big-endian)
//! - `transactions` - Append-only transaction log (key: txn_id)
//! - `txn_index` - Unique `(kind, reference_key)` index (key: kind_tag || reference_key)
//! - `account_txns` - Per-account history (key: user_id || txn_id; UUIDv7 keys give time order)
//! - `reservations` - Job reservations (key: job_id)
//! - `invites` - Invite records (key: invitee_id)
//! - `invite_codes` - Code resolution (key: code, value: inviter_id)
//!
//! Every multi-key mutation goes through a single `WriteBatch`: either the
//! balance change and its transaction record both persist, or neither does.

use crate::{
    error::{Error, Result},
    types::{Account, InviteRecord, Reservation, ReservationState, Transaction, TxnKind, UserId},
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_TRANSACTIONS: &str = "transactions";
const CF_TXN_INDEX: &str = "txn_index";
const CF_ACCOUNT_TXNS: &str = "account_txns";
const CF_RESERVATIONS: &str = "reservations";
const CF_INVITES: &str = "invites";
const CF_INVITE_CODES: &str = "invite_codes";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_TXN_INDEX, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_ACCOUNT_TXNS, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_RESERVATIONS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_INVITES, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_INVITE_CODES, Self::cf_options_index()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // State is frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_index() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Index key helpers

    fn index_key_kind_reference(kind: TxnKind, reference_key: &str) -> Vec<u8> {
        let mut key = vec![kind.tag()];
        key.extend_from_slice(reference_key.as_bytes());
        key
    }

    fn index_key_account_txn(account_id: UserId, txn_id: Uuid) -> Vec<u8> {
        let mut key = account_id.key_bytes().to_vec();
        key.extend_from_slice(txn_id.as_bytes());
        key
    }

    // Account operations

    /// Get account by user ID
    pub fn get_account(&self, user_id: UserId) -> Result<Account> {
        self.maybe_account(user_id)?
            .ok_or_else(|| Error::AccountNotFound(user_id.to_string()))
    }

    /// Get account by user ID, None if absent
    pub fn maybe_account(&self, user_id: UserId) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        match self.db.get_cf(cf, user_id.key_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Transaction operations

    /// Get transaction by ID
    pub fn get_transaction(&self, txn_id: Uuid) -> Result<Transaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = self
            .db
            .get_cf(cf, txn_id.as_bytes())?
            .ok_or_else(|| Error::Storage(format!("Transaction not found: {}", txn_id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Look up the transaction recorded for `(kind, reference_key)`, if any
    pub fn find_transaction(&self, kind: TxnKind, reference_key: &str) -> Result<Option<Transaction>> {
        let cf = self.cf_handle(CF_TXN_INDEX)?;
        let key = Self::index_key_kind_reference(kind, reference_key);

        match self.db.get_cf(cf, &key)? {
            Some(value) => {
                let txn_id_bytes: [u8; 16] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Corrupt txn_index entry".to_string()))?;
                let txn = self.get_transaction(Uuid::from_bytes(txn_id_bytes))?;
                Ok(Some(txn))
            }
            None => Ok(None),
        }
    }

    /// Get transactions for an account, oldest first, optionally bounded below
    pub fn list_account_transactions(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>> {
        let cf_index = self.cf_handle(CF_ACCOUNT_TXNS)?;
        let prefix = user_id.key_bytes();

        let iter = self.db.prefix_iterator_cf(cf_index, prefix);

        let mut txns = Vec::new();
        for item in iter {
            let (key, _) = item?;

            // prefix_iterator can run past the prefix; stop at the boundary
            if key.len() < 24 || key[..8] != prefix {
                break;
            }

            let txn_id_bytes: [u8; 16] = key[8..24]
                .try_into()
                .map_err(|_| Error::Storage("Corrupt account_txns key".to_string()))?;
            let txn = self.get_transaction(Uuid::from_bytes(txn_id_bytes))?;

            if let Some(cutoff) = since {
                if txn.created_at < cutoff {
                    continue;
                }
            }

            txns.push(txn);
        }

        Ok(txns)
    }

    // Reservation operations

    /// Get reservation by job ID, None if absent
    pub fn get_reservation(&self, job_id: &str) -> Result<Option<Reservation>> {
        let cf = self.cf_handle(CF_RESERVATIONS)?;
        match self.db.get_cf(cf, job_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Job IDs of HELD reservations created before `cutoff`
    pub fn list_expired_held(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let cf = self.cf_handle(CF_RESERVATIONS)?;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);

        let mut expired = Vec::new();
        for item in iter {
            let (_, value) = item?;
            let res: Reservation = bincode::deserialize(&value)?;
            if res.state == ReservationState::Held && res.created_at < cutoff {
                expired.push(res.job_id);
            }
        }

        Ok(expired)
    }

    // Invite operations

    /// Get invite record by invitee ID, None if absent
    pub fn get_invite(&self, invitee_id: UserId) -> Result<Option<InviteRecord>> {
        let cf = self.cf_handle(CF_INVITES)?;
        match self.db.get_cf(cf, invitee_id.key_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Resolve an invite code to its owning inviter, None if unknown
    pub fn resolve_invite_code(&self, code: &str) -> Result<Option<UserId>> {
        let cf = self.cf_handle(CF_INVITE_CODES)?;
        match self.db.get_cf(cf, code.as_bytes())? {
            Some(value) => {
                let id_bytes: [u8; 8] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Corrupt invite_codes entry".to_string()))?;
                Ok(Some(UserId::new(i64::from_be_bytes(id_bytes))))
            }
            None => Ok(None),
        }
    }

    /// Persist a new invite code for an inviter
    pub fn put_invite_code(&self, code: &str, inviter_id: UserId) -> Result<()> {
        let cf = self.cf_handle(CF_INVITE_CODES)?;
        self.db
            .put_cf(cf, code.as_bytes(), inviter_id.key_bytes())?;
        Ok(())
    }

    // Batch operations (atomic)

    /// Stage the account + transaction + index writes common to every mutation
    fn stage_mutation(
        &self,
        batch: &mut WriteBatch,
        account: &Account,
        txn: &Transaction,
    ) -> Result<()> {
        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        batch.put_cf(cf_accounts, account.user_id.key_bytes(), bincode::serialize(account)?);

        let cf_txns = self.cf_handle(CF_TRANSACTIONS)?;
        batch.put_cf(cf_txns, txn.txn_id.as_bytes(), bincode::serialize(txn)?);

        let cf_index = self.cf_handle(CF_TXN_INDEX)?;
        let idx_key = Self::index_key_kind_reference(txn.kind, &txn.reference_key);
        batch.put_cf(cf_index, &idx_key, txn.txn_id.as_bytes());

        let cf_account_txns = self.cf_handle(CF_ACCOUNT_TXNS)?;
        let history_key = Self::index_key_account_txn(txn.account_id, txn.txn_id);
        batch.put_cf(cf_account_txns, &history_key, &[]);

        Ok(())
    }

    /// Commit balance change + transaction record atomically
    pub fn commit_mutation(&self, account: &Account, txn: &Transaction) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_mutation(&mut batch, account, txn)?;
        self.db.write(batch)?;

        tracing::debug!(
            txn_id = %txn.txn_id,
            account = %account.user_id,
            kind = %txn.kind,
            delta = txn.delta,
            balance = account.balance,
            "Transaction appended"
        );

        Ok(())
    }

    /// Commit a mutation together with a reservation transition atomically
    pub fn commit_mutation_with_reservation(
        &self,
        account: &Account,
        txn: &Transaction,
        reservation: &Reservation,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_mutation(&mut batch, account, txn)?;

        let cf_res = self.cf_handle(CF_RESERVATIONS)?;
        batch.put_cf(
            cf_res,
            reservation.job_id.as_bytes(),
            bincode::serialize(reservation)?,
        );

        self.db.write(batch)?;

        tracing::debug!(
            job_id = %reservation.job_id,
            account = %account.user_id,
            state = ?reservation.state,
            "Reservation transition committed"
        );

        Ok(())
    }

    /// Commit inviter reward + invite record atomically
    pub fn commit_mutation_with_invite(
        &self,
        account: &Account,
        txn: &Transaction,
        record: &InviteRecord,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_mutation(&mut batch, account, txn)?;

        let cf_invites = self.cf_handle(CF_INVITES)?;
        batch.put_cf(
            cf_invites,
            record.invitee_id.key_bytes(),
            bincode::serialize(record)?,
        );

        self.db.write(batch)?;

        tracing::debug!(
            inviter = %record.inviter_id,
            invitee = %record.invitee_id,
            code = %record.invite_code,
            "Invite reward committed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    #[test]
    fn test_storage_open() {
        let (storage, _temp) = test_storage();
        assert!(storage.db.cf_handle(CF_ACCOUNTS).is_some());
        assert!(storage.db.cf_handle(CF_TXN_INDEX).is_some());
    }

    #[test]
    fn test_commit_and_read_back() {
        let (storage, _temp) = test_storage();

        let user = UserId::new(42);
        let account = Account::new(user, 1);
        let txn = Transaction::new(user, 1, TxnKind::SignupBonus, user.to_string());

        storage.commit_mutation(&account, &txn).unwrap();

        let read = storage.get_account(user).unwrap();
        assert_eq!(read.balance, 1);
        assert_eq!(read.version, 1);

        let found = storage
            .find_transaction(TxnKind::SignupBonus, "42")
            .unwrap()
            .unwrap();
        assert_eq!(found.txn_id, txn.txn_id);
    }

    #[test]
    fn test_kind_scopes_reference_keys() {
        let (storage, _temp) = test_storage();

        let user = UserId::new(7);
        let account = Account::new(user, 5);
        let txn = Transaction::new(user, -1, TxnKind::JobReserve, "job-1");
        storage.commit_mutation(&account, &txn).unwrap();

        // Same reference key under a different kind is a different scope
        assert!(storage
            .find_transaction(TxnKind::JobRelease, "job-1")
            .unwrap()
            .is_none());
        assert!(storage
            .find_transaction(TxnKind::JobReserve, "job-1")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_account_history_ordered() {
        let (storage, _temp) = test_storage();

        let user = UserId::new(9);
        let mut account = Account::new(user, 0);

        for i in 0..3 {
            account.balance += 1;
            account.touch();
            let txn = Transaction::new(user, 1, TxnKind::AdminGrant, format!("grant-{}", i));
            storage.commit_mutation(&account, &txn).unwrap();
        }

        let history = storage.list_account_transactions(user, None).unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn test_reservation_roundtrip_and_expiry_scan() {
        let (storage, _temp) = test_storage();

        let user = UserId::new(3);
        let mut account = Account::new(user, 2);
        account.balance -= 1;
        account.touch();

        let txn = Transaction::new(user, -1, TxnKind::JobReserve, "job-a");
        let res = Reservation::held("job-a", user, 1);
        storage
            .commit_mutation_with_reservation(&account, &txn, &res)
            .unwrap();

        let read = storage.get_reservation("job-a").unwrap().unwrap();
        assert_eq!(read.state, ReservationState::Held);

        let future = Utc::now() + chrono::Duration::seconds(5);
        let expired = storage.list_expired_held(future).unwrap();
        assert_eq!(expired, vec!["job-a".to_string()]);

        let past = Utc::now() - chrono::Duration::seconds(60);
        assert!(storage.list_expired_held(past).unwrap().is_empty());
    }

    #[test]
    fn test_invite_code_resolution() {
        let (storage, _temp) = test_storage();

        let inviter = UserId::new(100);
        storage.put_invite_code("AB12CD34", inviter).unwrap();

        assert_eq!(
            storage.resolve_invite_code("AB12CD34").unwrap(),
            Some(inviter)
        );
        assert_eq!(storage.resolve_invite_code("ZZZZZZZZ").unwrap(), None);
    }
}
