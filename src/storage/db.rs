// Database - Abstraction RocksDB pour l'index des transactions
use rocksdb::{Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// RocksDB handle with bincode-encoded values
#[derive(Clone)]
pub struct Database {
    db: Arc<DB>,
}

impl Database {
    /// Ouvre ou crée la base
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Limiter l'accumulation de fichiers de log
        opts.set_keep_log_file_num(5);
        opts.set_max_background_jobs(2);

        let db = DB::open(&opts, path).map_err(|e| DatabaseError::OpenFailed(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Raw read
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError> {
        self.db
            .get(key)
            .map_err(|e| DatabaseError::ReadFailed(e.to_string()))
    }

    /// Read and decode a value
    pub fn get_decoded<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, DatabaseError> {
        match self.get(key)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| DatabaseError::SerializationFailed(e.to_string())),
            None => Ok(None),
        }
    }

    /// Apply all writes atomically
    pub fn write(&self, batch: DbBatch) -> Result<(), DatabaseError> {
        self.db
            .write(batch.inner)
            .map_err(|e| DatabaseError::WriteFailed(e.to_string()))
    }
}

/// Pending writes, committed with [`Database::write`]
#[derive(Default)]
pub struct DbBatch {
    inner: WriteBatch,
}

impl DbBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_raw(&mut self, key: &[u8], value: &[u8]) {
        self.inner.put(key, value);
    }

    pub fn put_encoded<T: Serialize>(&mut self, key: &[u8], value: &T) -> Result<(), DatabaseError> {
        let bytes =
            bincode::serialize(value).map_err(|e| DatabaseError::SerializationFailed(e.to_string()))?;
        self.inner.put(key, bytes);
        Ok(())
    }
}

/// Erreurs de base de données
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Échec d'ouverture de la DB: {0}")]
    OpenFailed(String),

    #[error("Échec de lecture: {0}")]
    ReadFailed(String),

    #[error("Échec d'écriture: {0}")]
    WriteFailed(String),

    #[error("Sérialisation échouée: {0}")]
    SerializationFailed(String),
}
