use quorum_core::domain::scheduler::leader::{leader_of, LeaderSchedule};
use quorum_core::foundation::NodeId;
use std::collections::HashSet;

fn deployers() -> Vec<NodeId> {
    (1..=4).map(|i| NodeId::new(format!("deployer-{i}"))).collect()
}

#[test]
fn every_node_computes_the_same_leader() {
    let schedule = LeaderSchedule { period_secs: 300, gap_secs: 30 };
    let mut reversed = deployers();
    reversed.reverse();
    for now in [31u64, 299, 330, 10_000, 1_000_000] {
        assert_eq!(leader_of("reshare", &deployers(), now, &schedule), leader_of("reshare", &reversed, now, &schedule));
    }
}

#[test]
fn leading_gap_has_no_leader() {
    let schedule = LeaderSchedule { period_secs: 300, gap_secs: 30 };
    for now in [0u64, 29, 300, 329, 600] {
        assert_eq!(leader_of("reshare", &deployers(), now, &schedule), None, "now={now}");
    }
    assert!(leader_of("reshare", &deployers(), 330, &schedule).is_some());
}

#[test]
fn leadership_rotates_across_periods() {
    let schedule = LeaderSchedule { period_secs: 60, gap_secs: 5 };
    let leaders: HashSet<NodeId> = (0..4u64).filter_map(|period| leader_of("reshare", &deployers(), period * 60 + 30, &schedule)).collect();
    assert_eq!(leaders.len(), 4);
    assert_eq!(leader_of("reshare", &[], 30, &schedule), None);
}
