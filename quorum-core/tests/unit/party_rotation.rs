use quorum_core::domain::party::selection::{retained_count, rotate_party, select_party};
use quorum_core::foundation::{NodeId, Seed, ThresholdError};

fn nodes(count: usize) -> Vec<NodeId> {
    (1..=count).map(|i| NodeId::new(format!("node-{i}"))).collect()
}

#[test]
fn retained_count_is_clamped() {
    assert_eq!(retained_count(3, 7, 7, 1.5), 5);
    assert_eq!(retained_count(4, 5, 5, 1.5), 5);
    assert_eq!(retained_count(3, 7, 2, 1.5), 2);
    assert_eq!(retained_count(2, 4, 4, 1.0), 2);
}

#[test]
fn rotation_keeps_old_members_first_and_fills_with_fresh_nodes() {
    let candidates = nodes(12);
    let previous = select_party(&Seed::from("epoch-1"), &candidates, 3, 5).expect("select");
    let rotated = rotate_party(&previous, &Seed::from("epoch-2"), &candidates, 3, 5, 1.5).expect("rotate");
    assert_eq!(rotated.len(), 5);
    // ceil(3 * 1.5) covers the whole previous party
    let mut kept = rotated.clone();
    kept.sort();
    let mut old = previous.clone();
    old.sort();
    assert_eq!(kept, old);

    let rotated = rotate_party(&previous, &Seed::from("epoch-2"), &candidates, 2, 5, 1.5).expect("rotate");
    assert!(rotated[..3].iter().all(|n| previous.contains(n)));
    let mut unique = rotated.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), rotated.len());
}

#[test]
fn departed_members_are_not_retained() {
    let candidates = nodes(8);
    let previous = select_party(&Seed::from("epoch-1"), &candidates, 2, 4).expect("select");
    let remaining: Vec<NodeId> = candidates.iter().filter(|n| **n != previous[0]).cloned().collect();
    let rotated = rotate_party(&previous, &Seed::from("epoch-2"), &remaining, 2, 4, 1.5).expect("rotate");
    assert!(!rotated.contains(&previous[0]));
    assert_eq!(rotated.len(), 4);
}

#[test]
fn rotation_beyond_candidates_fails() {
    let candidates = nodes(3);
    let err = rotate_party(&candidates, &Seed::from("s"), &candidates, 3, 5, 1.5).expect_err("too few nodes");
    assert!(matches!(err, ThresholdError::PartySelection(_)));
}
