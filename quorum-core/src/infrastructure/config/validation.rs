use crate::foundation::{MAX_NONCE_BATCH_SIZE, MAX_PARTY_SIZE};
use crate::infrastructure::config::types::{AppConfig, StorageBackend};
use std::collections::HashSet;

const MAX_REQUEST_TIMEOUT_MS: u64 = 600_000;

impl AppConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.devnet.enabled && self.node.id.trim().is_empty() {
            errors.push("node.id is required outside devnet".to_string());
        }
        let seed = self.node.identity_seed_hex.trim();
        if !seed.is_empty() && hex::decode(seed.trim_start_matches("0x")).map(|b| b.len() != 32).unwrap_or(true) {
            errors.push("node.identity_seed_hex must be 32 bytes of hex".to_string());
        }

        let mut seen = HashSet::new();
        for peer in &self.network.peers {
            if peer.id.trim().is_empty() {
                errors.push("network.peers entry has an empty id".to_string());
            }
            if !seen.insert(peer.id.trim()) {
                errors.push(format!("network.peers lists {} twice", peer.id));
            }
            if hex::decode(peer.pubkey_hex.trim()).map(|b| b.len() != 32).unwrap_or(true) {
                errors.push(format!("network.peers {} pubkey_hex must be 32 bytes of hex", peer.id));
            }
        }
        if !self.devnet.enabled {
            for deployer in &self.network.deployers {
                if !seen.contains(deployer.as_str()) {
                    errors.push(format!("network.deployers entry {} is not a configured peer", deployer));
                }
            }
        }

        if self.runtime.request_timeout_ms == 0 || self.runtime.request_timeout_ms > MAX_REQUEST_TIMEOUT_MS {
            errors.push(format!("runtime.request_timeout_ms must be in 1..={}", MAX_REQUEST_TIMEOUT_MS));
        }
        if self.runtime.partner_call_timeout_ms == 0 {
            errors.push("runtime.partner_call_timeout_ms must be > 0".to_string());
        }
        if self.runtime.partner_call_timeout_ms > self.runtime.request_timeout_ms {
            errors.push("runtime.partner_call_timeout_ms cannot exceed runtime.request_timeout_ms".to_string());
        }
        if self.runtime.nonce_batch_size == 0 || self.runtime.nonce_batch_size > MAX_NONCE_BATCH_SIZE {
            errors.push(format!("runtime.nonce_batch_size must be in 1..={}", MAX_NONCE_BATCH_SIZE));
        }
        if self.runtime.nonce_lock_ttl_ms == 0 || self.runtime.nonce_lock_wait_ms == 0 {
            errors.push("runtime.nonce_lock_ttl_ms and nonce_lock_wait_ms must be > 0".to_string());
        }

        if self.tss.default_threshold == 0 || self.tss.default_threshold > self.tss.default_party_size {
            errors.push("tss.default_threshold must be in 1..=tss.default_party_size".to_string());
        }
        if self.tss.default_party_size > MAX_PARTY_SIZE {
            errors.push(format!("tss.default_party_size should not exceed {}", MAX_PARTY_SIZE));
        }
        if self.tss.rotation_coefficient.is_nan() || self.tss.rotation_coefficient < 1.0 {
            errors.push("tss.rotation_coefficient must be >= 1.0".to_string());
        }

        if self.scheduler.leading_period_secs == 0 {
            errors.push("scheduler.leading_period_secs must be > 0".to_string());
        }
        if self.scheduler.leading_gap_secs >= self.scheduler.leading_period_secs {
            errors.push("scheduler.leading_gap_secs must be shorter than the leading period".to_string());
        }

        if self.rpc.enabled && self.rpc.addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("rpc.addr is not a socket address: {}", self.rpc.addr));
        }

        if self.devnet.enabled {
            if self.devnet.nodes == 0 || self.devnet.deployers == 0 || self.devnet.deployers > self.devnet.nodes {
                errors.push("devnet.deployers must be in 1..=devnet.nodes".to_string());
            }
            if self.devnet.genesis_threshold == 0 || self.devnet.genesis_threshold > self.devnet.deployers {
                errors.push("devnet.genesis_threshold must be in 1..=devnet.deployers".to_string());
            }
        }
        if self.storage.allow_schema_wipe && self.storage.backend == StorageBackend::Rocksdb && !self.devnet.enabled {
            errors.push("storage.allow_schema_wipe is only allowed on devnet".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
