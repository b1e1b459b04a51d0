//! Deterministic party selection.
//!
//! Every node ranks candidates by a seed-keyed hash, so all honest nodes derive the same party for
//! the same seed and candidate set without exchanging messages.

use crate::foundation::{Hash32, NodeId, Seed, ThresholdError, MAX_PARTY_SIZE, MIN_THRESHOLD};
use std::collections::HashSet;

const SELECTION_DOMAIN: &[u8] = b"quorum:party:selection:v1:";

pub fn selection_score(seed: &Seed, node: &NodeId) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SELECTION_DOMAIN);
    hasher.update(seed.as_bytes());
    hasher.update(&[0]);
    hasher.update(node.as_bytes());
    *hasher.finalize().as_bytes()
}

fn ranked<'a>(seed: &Seed, nodes: impl IntoIterator<Item = &'a NodeId>) -> Vec<NodeId> {
    let mut unique: Vec<&NodeId> = nodes.into_iter().collect::<HashSet<_>>().into_iter().collect();
    unique.sort_by_key(|node| (selection_score(seed, node), node.as_str().to_string()));
    unique.into_iter().cloned().collect()
}

fn check_bounds(t: u16, n: u16, available: usize) -> Result<(), ThresholdError> {
    if t < MIN_THRESHOLD || t > n {
        return Err(ThresholdError::PartySelection(format!("invalid threshold t={t} n={n}")));
    }
    if n > MAX_PARTY_SIZE {
        return Err(ThresholdError::PartySelection(format!("party size {n} exceeds max {MAX_PARTY_SIZE}")));
    }
    if usize::from(n) > available {
        return Err(ThresholdError::PartySelection(format!("party size {n} exceeds {available} candidates")));
    }
    Ok(())
}

/// Picks `n` partners for a fresh context.
pub fn select_party(seed: &Seed, candidates: &[NodeId], t: u16, n: u16) -> Result<Vec<NodeId>, ThresholdError> {
    let ranked = ranked(seed, candidates);
    check_bounds(t, n, ranked.len())?;
    Ok(ranked.into_iter().take(usize::from(n)).collect())
}

/// Number of previous partners carried into a rotated party: `ceil(t * coefficient)`, at most `n`
/// and at most the size of the previous party.
pub fn retained_count(t: u16, n: u16, previous_len: usize, coefficient: f64) -> usize {
    let wanted = (f64::from(t) * coefficient).ceil().max(0.0) as usize;
    wanted.min(usize::from(n)).min(previous_len)
}

/// Picks the party of a rotated context: top-ranked previous partners first, then fresh nodes.
pub fn rotate_party(
    previous: &[NodeId],
    seed: &Seed,
    candidates: &[NodeId],
    t: u16,
    n: u16,
    coefficient: f64,
) -> Result<Vec<NodeId>, ThresholdError> {
    let candidate_set: HashSet<&NodeId> = candidates.iter().collect();
    let still_available: Vec<&NodeId> = previous.iter().filter(|p| candidate_set.contains(p)).collect();
    let keep = retained_count(t, n, still_available.len(), coefficient);
    let mut party: Vec<NodeId> = ranked(seed, still_available).into_iter().take(keep).collect();

    let mut total = party.iter().collect::<HashSet<_>>().len();
    let fresh: Vec<NodeId> = ranked(seed, candidates).into_iter().filter(|c| !party.contains(c)).collect();
    total += fresh.len();
    check_bounds(t, n, total)?;

    for node in fresh {
        if party.len() >= usize::from(n) {
            break;
        }
        party.push(node);
    }
    Ok(party)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(count: usize) -> Vec<NodeId> {
        (1..=count).map(|i| NodeId::new(format!("node-{i}"))).collect()
    }

    #[test]
    fn test_selection_is_deterministic_and_order_independent() {
        let candidates = nodes(10);
        let mut shuffled = candidates.clone();
        shuffled.reverse();
        let seed = Seed::from("seed-a");
        let a = select_party(&seed, &candidates, 3, 5).expect("select");
        let b = select_party(&seed, &shuffled, 3, 5).expect("select");
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert_ne!(a, select_party(&Seed::from("seed-b"), &candidates, 3, 5).expect("select"));
    }

    #[test]
    fn test_selection_bounds() {
        let candidates = nodes(4);
        assert!(select_party(&Seed::from("s"), &candidates, 3, 5).is_err());
        assert!(select_party(&Seed::from("s"), &candidates, 0, 3).is_err());
        assert!(select_party(&Seed::from("s"), &candidates, 4, 3).is_err());
    }

    #[test]
    fn test_rotation_retains_ceil_of_threshold_times_coefficient() {
        let candidates = nodes(20);
        let previous = select_party(&Seed::from("old"), &candidates, 3, 7).expect("select");
        let rotated = rotate_party(&previous, &Seed::from("new"), &candidates, 3, 7, 1.5).expect("rotate");
        assert_eq!(rotated.len(), 7);
        let retained = rotated.iter().filter(|n| previous.contains(n)).count();
        // ceil(3 * 1.5) = 5 kept; fresh picks never repeat old members
        assert!(retained >= 5);
        assert!(rotated[..5].iter().all(|n| previous.contains(n)));
    }

    #[test]
    fn test_retained_count_clamps() {
        assert_eq!(retained_count(3, 7, 7, 1.5), 5);
        assert_eq!(retained_count(4, 5, 5, 1.5), 5);
        assert_eq!(retained_count(4, 5, 3, 1.5), 3);
        assert_eq!(retained_count(2, 2, 2, 1.5), 2);
    }

    #[test]
    fn test_rotation_skips_departed_nodes() {
        let candidates = nodes(8);
        let previous: Vec<NodeId> = vec!["gone-1".into(), "gone-2".into(), "node-1".into()];
        let rotated = rotate_party(&previous, &Seed::from("x"), &candidates, 2, 4, 1.5).expect("rotate");
        assert!(!rotated.iter().any(|n| n.starts_with("gone")));
        assert_eq!(rotated[0], NodeId::from("node-1"));
        assert_eq!(rotated.len(), 4);
    }
}
