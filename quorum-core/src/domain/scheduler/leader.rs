//! Time-partitioned leader election for periodic jobs.
//!
//! Time is cut into leading periods. The first `gap` seconds of each period have no leader so a
//! previous leader's work can settle; afterwards every node computes the same leader from the job
//! id, the deployer set and the period index.

use crate::foundation::{Hash32, NodeId};
use serde::{Deserialize, Serialize};

const LEADER_DOMAIN: &[u8] = b"quorum:leader:v1:";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderSchedule {
    pub period_secs: u64,
    pub gap_secs: u64,
}

impl LeaderSchedule {
    pub fn period_index(&self, now_secs: u64) -> u64 {
        now_secs / self.period_secs.max(1)
    }

    pub fn in_gap(&self, now_secs: u64) -> bool {
        now_secs % self.period_secs.max(1) < self.gap_secs
    }
}

fn leader_score(node: &NodeId, job_id: &str) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(LEADER_DOMAIN);
    hasher.update(node.as_bytes());
    hasher.update(&[0]);
    hasher.update(job_id.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Leader of `job_id` at `now_secs`, or `None` inside the leading gap or without deployers.
pub fn leader_of(job_id: &str, deployers: &[NodeId], now_secs: u64, schedule: &LeaderSchedule) -> Option<NodeId> {
    if deployers.is_empty() || schedule.in_gap(now_secs) {
        return None;
    }
    let mut ranked: Vec<&NodeId> = deployers.iter().collect();
    ranked.sort_by_key(|node| (leader_score(node, job_id), node.as_str().to_string()));
    ranked.dedup();
    let slot = schedule.period_index(now_secs) % ranked.len() as u64;
    ranked.get(slot as usize).map(|node| (*node).clone())
}
