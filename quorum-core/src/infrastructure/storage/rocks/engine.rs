//! RocksDB storage engine.
//!
//! Contexts and requests are stored as JSON since they carry free-form app values; sealed key
//! shares use bincode with fixed-width integers. `insert_key_share` is a check-then-put serialized
//! by `share_guard` so a stored share is never replaced.

use crate::foundation::ThresholdError;
use crate::infrastructure::storage::rocks::schema::{open_db, CF_METADATA, SCHEMA_VERSION_KEY};
use crate::storage_err;
use bincode::Options;
use log::{debug, info, warn};
use rocksdb::{ColumnFamily, Direction, IteratorMode, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

mod storage;

const SCHEMA_VERSION: u32 = 1;
const DB_DIR_NAME: &str = "quorum-node";

pub struct RocksStorage {
    db: DB,
    share_guard: Mutex<()>,
}

impl RocksStorage {
    /// Opens `<data_dir>/quorum-node`, creating the directory when missing.
    pub fn open_in_dir(data_dir: impl AsRef<Path>) -> Result<Self, ThresholdError> {
        Self::open_in_dir_with_options(data_dir, false)
    }

    /// Like `open_in_dir`; with `allow_schema_wipe` a database written by another schema version is
    /// deleted and recreated instead of refusing to start.
    pub fn open_in_dir_with_options(data_dir: impl AsRef<Path>, allow_schema_wipe: bool) -> Result<Self, ThresholdError> {
        let dir = data_dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Err(ThresholdError::ConfigError("storage data_dir is empty".to_string()));
        }
        fs::create_dir_all(dir).map_err(|err| storage_err!("create data dir", err))?;
        let path = dir.join(DB_DIR_NAME);
        match Self::open_at(&path) {
            Err(ThresholdError::SchemaMismatch { stored, current }) if allow_schema_wipe => {
                warn!("wiping database on schema change path={} stored={} current={}", path.display(), stored, current);
                fs::remove_dir_all(&path).map_err(|err| storage_err!("schema wipe", err))?;
                Self::open_at(&path)
            }
            other => other,
        }
    }

    fn open_at(path: &Path) -> Result<Self, ThresholdError> {
        debug!("opening rocksdb path={}", path.display());
        let storage = Self { db: open_db(path)?, share_guard: Mutex::new(()) };
        storage.check_schema()?;
        info!("rocksdb storage opened path={} schema_version={}", path.display(), SCHEMA_VERSION);
        Ok(storage)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, ThresholdError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ThresholdError::StorageError { operation: "rocksdb cf_handle".to_string(), details: format!("missing column family {}", name) })
    }

    /// Stamps a fresh database with the current version and rejects any other stored version.
    fn check_schema(&self) -> Result<(), ThresholdError> {
        let cf = self.cf(CF_METADATA)?;
        let stored = self.db.get_cf(cf, SCHEMA_VERSION_KEY).map_err(|err| storage_err!("read schema version", err))?;
        let Some(bytes) = stored else {
            return self.db.put_cf(cf, SCHEMA_VERSION_KEY, SCHEMA_VERSION.to_be_bytes()).map_err(ThresholdError::from);
        };
        let raw: [u8; 4] = bytes.as_slice().try_into().map_err(|_| ThresholdError::StorageError {
            operation: "read schema version".to_string(),
            details: format!("expected 4 bytes, found {}", bytes.len()),
        })?;
        match u32::from_be_bytes(raw) {
            SCHEMA_VERSION => Ok(()),
            stored => Err(ThresholdError::SchemaMismatch { stored, current: SCHEMA_VERSION }),
        }
    }

    fn to_bincode<T: Serialize>(value: &T) -> Result<Vec<u8>, ThresholdError> {
        Ok(bincode::DefaultOptions::new().with_fixint_encoding().serialize(value)?)
    }

    fn from_bincode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ThresholdError> {
        Ok(bincode::DefaultOptions::new().with_fixint_encoding().deserialize(bytes)?)
    }

    fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, ThresholdError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ThresholdError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8], decode: fn(&[u8]) -> Result<T, ThresholdError>) -> Result<Option<T>, ThresholdError> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key).map_err(|err| storage_err!(format!("rocksdb get {}", cf_name), err))? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Every `(key, value)` of `cf_name` under `prefix`, in key order.
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ThresholdError> {
        let cf = self.cf(cf_name)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|err| storage_err!(format!("rocksdb scan {}", cf_name), err))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.into_vec(), value.into_vec()));
        }
        Ok(out)
    }
}
