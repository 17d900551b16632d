// src/storage/encrypted/store.rs
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use super::{cipher::StorageCipher, errors::*};
use crate::core::verification::{
    AuditRecord, SubjectId, UserVerificationGrant, VerificationRequest,
};
use crate::utils::config::StorageConfig;

const REQUEST_PREFIX: &str = "request:";
const SUBJECT_PREFIX: &str = "subject:";
const GRANT_PREFIX: &str = "grant:";
const AUDIT_PREFIX: &str = "audit:";

fn request_key(id: &Uuid) -> String {
    format!("{}{}", REQUEST_PREFIX, id)
}

fn subject_key(subject: &SubjectId) -> String {
    format!("{}{}", SUBJECT_PREFIX, hex::encode(subject.as_str()))
}

fn grant_prefix(subject: &SubjectId) -> String {
    format!("{}{}:", GRANT_PREFIX, hex::encode(subject.as_str()))
}

fn grant_key(grant: &UserVerificationGrant) -> String {
    format!("{}{}", grant_prefix(&grant.subject), grant.id)
}

// Zero-padded so lexicographic order is chronological.
fn audit_key(record: &AuditRecord) -> String {
    format!(
        "{}{:020}:{}",
        AUDIT_PREFIX,
        record.timestamp.timestamp_micros().max(0),
        record.id
    )
}

/// Encrypted persistence for requests, grants and the audit log.
///
/// All state changes go through a [`StoreTransaction`], which holds the
/// commit lock from the moment it is opened until it is committed or dropped.
/// Reads performed while holding a transaction therefore see a stable view
/// for check-then-write sequences.
pub struct EncryptedStore {
    db: DB,
    cipher: StorageCipher,
    commit_lock: Mutex<()>,
}

impl EncryptedStore {
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let path = Path::new(&config.path);
        if !path.exists() {
            std::fs::create_dir_all(path)?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_keep_log_file_num(10);
        if config.compression_enabled {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let db = DB::open(&opts, path)?;
        info!("Opened verification store at {:?}", path);

        Ok(Self {
            db,
            cipher: StorageCipher::new(config.encryption_key.as_bytes()),
            commit_lock: Mutex::new(()),
        })
    }

    /// Opens a transaction. Blocks other writers until it is committed or dropped.
    pub async fn begin(&self) -> StoreTransaction<'_> {
        let guard = self.commit_lock.lock().await;
        StoreTransaction {
            store: self,
            batch: WriteBatch::default(),
            _guard: guard,
        }
    }

    fn seal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let serialized = serde_json::to_vec(value)?;
        self.cipher.encrypt(&serialized)
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let encrypted = match self.db.get(key.as_bytes())? {
            Some(data) => data,
            None => return Ok(None),
        };

        let decrypted = self.cipher.decrypt(&encrypted)?;
        Ok(Some(serde_json::from_slice(&decrypted)?))
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let mut values = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        for item in iter {
            let (key, encrypted) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let decrypted = self.cipher.decrypt(&encrypted)?;
            values.push(serde_json::from_slice(&decrypted)?);
        }

        Ok(values)
    }

    pub fn get_request(&self, id: &Uuid) -> Result<Option<VerificationRequest>> {
        self.get(&request_key(id))
    }

    pub fn request_for_subject(&self, subject: &SubjectId) -> Result<Option<VerificationRequest>> {
        match self.get::<Uuid>(&subject_key(subject))? {
            Some(id) => self.get_request(&id),
            None => Ok(None),
        }
    }

    pub fn list_requests(&self) -> Result<Vec<VerificationRequest>> {
        self.scan(REQUEST_PREFIX)
    }

    pub fn grants_for_subject(&self, subject: &SubjectId) -> Result<Vec<UserVerificationGrant>> {
        self.scan(&grant_prefix(subject))
    }

    pub fn list_grants(&self) -> Result<Vec<UserVerificationGrant>> {
        self.scan(GRANT_PREFIX)
    }

    /// Audit records in chronological order.
    pub fn audit_records(&self) -> Result<Vec<AuditRecord>> {
        self.scan(AUDIT_PREFIX)
    }

    pub fn audit_for_request(&self, request_id: &Uuid) -> Result<Vec<AuditRecord>> {
        Ok(self
            .audit_records()?
            .into_iter()
            .filter(|record| record.request_id == *request_id)
            .collect())
    }

    pub fn is_writable(&self) -> bool {
        self.db.put(b"health:probe", b"1").is_ok()
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// A batch of writes applied atomically on [`commit`](Self::commit).
/// Dropping it without committing discards every staged write.
pub struct StoreTransaction<'a> {
    store: &'a EncryptedStore,
    batch: WriteBatch,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> StoreTransaction<'a> {
    pub fn store(&self) -> &'a EncryptedStore {
        self.store
    }

    /// Stages the request and its subject index entry.
    pub fn put_request(&mut self, request: &VerificationRequest) -> Result<()> {
        let sealed = self.store.seal(request)?;
        self.batch.put(request_key(&request.id).as_bytes(), sealed);

        let index = self.store.seal(&request.id)?;
        self.batch.put(subject_key(&request.subject).as_bytes(), index);
        Ok(())
    }

    pub fn put_grant(&mut self, grant: &UserVerificationGrant) -> Result<()> {
        let sealed = self.store.seal(grant)?;
        self.batch.put(grant_key(grant).as_bytes(), sealed);
        Ok(())
    }

    pub fn append_audit(&mut self, record: &AuditRecord) -> Result<()> {
        let sealed = self.store.seal(record)?;
        self.batch.put(audit_key(record).as_bytes(), sealed);
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        let writes = self.batch.len();
        self.store.db.write(self.batch)?;
        debug!("Committed {} staged writes", writes);
        Ok(())
    }
}
