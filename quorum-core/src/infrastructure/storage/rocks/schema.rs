//! On-disk layout: column families, key prefixes and key encoding.
//!
//! Context and key-share keys are `<prefix><app_id>:<seed>`; request keys are
//! `req:` followed by the raw 32-byte id.

use crate::foundation::{AppId, RequestId, Seed, ThresholdError};
use rocksdb::{ColumnFamilyDescriptor, Options as RocksOptions, DB};
use std::path::Path;

pub const CF_METADATA: &str = "metadata";
pub const CF_CONTEXT: &str = "context";
pub const CF_KEY_SHARE: &str = "key_share";
pub const CF_REQUEST: &str = "request";

const COLUMN_FAMILIES: [&str; 5] = [rocksdb::DEFAULT_COLUMN_FAMILY_NAME, CF_METADATA, CF_CONTEXT, CF_KEY_SHARE, CF_REQUEST];

pub const PREFIX_CONTEXT: &[u8] = b"ctx:";
pub const PREFIX_KEY_SHARE: &[u8] = b"ks:";
pub const PREFIX_REQUEST: &[u8] = b"req:";

pub const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";

fn scoped(prefix: &[u8], app_id: &AppId, seed: Option<&Seed>) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + app_id.len() + 1 + seed.map_or(0, |s| s.len()));
    key.extend_from_slice(prefix);
    key.extend_from_slice(app_id.as_bytes());
    key.push(b':');
    if let Some(seed) = seed {
        key.extend_from_slice(seed.as_bytes());
    }
    key
}

/// Prefix shared by every context of `app_id`.
pub fn context_prefix(app_id: &AppId) -> Vec<u8> {
    scoped(PREFIX_CONTEXT, app_id, None)
}

pub fn context_key(app_id: &AppId, seed: &Seed) -> Vec<u8> {
    scoped(PREFIX_CONTEXT, app_id, Some(seed))
}

pub fn key_share_key(app_id: &AppId, seed: &Seed) -> Vec<u8> {
    scoped(PREFIX_KEY_SHARE, app_id, Some(seed))
}

pub fn request_key(req_id: &RequestId) -> Vec<u8> {
    [PREFIX_REQUEST, req_id.as_hash().as_slice()].concat()
}

/// Opens (or creates) the database with every column family of the layout.
pub fn open_db(path: &Path) -> Result<DB, ThresholdError> {
    let mut options = RocksOptions::default();
    options.create_if_missing(true);
    options.create_missing_column_families(true);
    options.set_use_fsync(true);
    options.set_paranoid_checks(true);
    options.optimize_for_point_lookup(64);

    let descriptors = COLUMN_FAMILIES.iter().map(|name| ColumnFamilyDescriptor::new(*name, RocksOptions::default()));
    DB::open_cf_descriptors(&options, path, descriptors)
        .map_err(|err| ThresholdError::StorageError { operation: "rocksdb open".to_string(), details: err.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keys_share_the_app_prefix() {
        let app_id = AppId::from("7");
        let key = context_key(&app_id, &Seed::from("abc"));
        assert_eq!(key, b"ctx:7:abc".to_vec());
        assert!(key.starts_with(&context_prefix(&app_id)));
        assert!(!context_key(&AppId::from("77"), &Seed::from("abc")).starts_with(&context_prefix(&app_id)));
    }

    #[test]
    fn test_request_key_is_prefixed_raw_id() {
        let key = request_key(&RequestId::new([9u8; 32]));
        assert_eq!(key.len(), PREFIX_REQUEST.len() + 32);
        assert!(key.starts_with(PREFIX_REQUEST));
    }
}
