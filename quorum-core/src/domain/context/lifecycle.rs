use crate::domain::context::{AppContext, ContextStatus};
use crate::foundation::ThresholdError;

const VALID_TRANSITIONS: &[(ContextStatus, ContextStatus)] = &[
    (ContextStatus::New, ContextStatus::TssGroupSelected),
    (ContextStatus::TssGroupSelected, ContextStatus::Deployed),
    (ContextStatus::TssGroupSelected, ContextStatus::Pending),
    (ContextStatus::TssGroupSelected, ContextStatus::Expired),
    (ContextStatus::Deployed, ContextStatus::Pending),
    (ContextStatus::Deployed, ContextStatus::Expired),
    (ContextStatus::Pending, ContextStatus::Expired),
];

pub fn ensure_valid_transition(from: ContextStatus, to: ContextStatus) -> Result<(), ThresholdError> {
    if from == to || VALID_TRANSITIONS.contains(&(from, to)) {
        return Ok(());
    }
    Err(ThresholdError::InvalidStateTransition { from: from.to_string(), to: to.to_string() })
}

/// Checks that `updated` only moves `existing` forward.
///
/// A selected party, an installed key and its commitments never change for a seed; a rotation
/// must use a new seed.
pub fn ensure_forward(existing: Option<&AppContext>, updated: &AppContext, now_nanos: u64) -> Result<(), ThresholdError> {
    let Some(existing) = existing else {
        return Ok(());
    };
    if existing.app_id != updated.app_id || existing.seed != updated.seed {
        return Err(ThresholdError::ValidationError(format!(
            "context identity changed {} -> {}",
            existing.key_label(),
            updated.key_label()
        )));
    }
    if !existing.party.partners.is_empty() && existing.party != updated.party {
        return Err(ThresholdError::ValidationError(format!("party of {} is fixed", existing.key_label())));
    }
    if existing.public_key.is_some() && (existing.public_key != updated.public_key || existing.commitments != updated.commitments) {
        return Err(ThresholdError::ValidationError(format!("key of {} is fixed", existing.key_label())));
    }
    if existing.previous_seed.is_some() && existing.previous_seed != updated.previous_seed {
        return Err(ThresholdError::ValidationError(format!("previous seed of {} is fixed", existing.key_label())));
    }
    let from = existing.status_at(now_nanos);
    let to = updated.status_at(now_nanos);
    if to.rank() < from.rank() {
        return Err(ThresholdError::InvalidStateTransition { from: from.to_string(), to: to.to_string() });
    }
    ensure_valid_transition(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::Party;
    use crate::domain::signing::tss::{self, GroupPublicKey};
    use crate::foundation::{AppId, Seed};
    use k256::ProjectivePoint;

    fn selected() -> AppContext {
        let mut ctx = AppContext::new(AppId::from("7"), "demo", Seed::from("s1"), 100, 10, 0);
        ctx.party = Party { t: 2, max: 3, partners: vec!["a".into(), "b".into(), "c".into()] };
        ctx
    }

    #[test]
    fn test_key_install_moves_forward() {
        let existing = selected();
        let mut updated = existing.clone();
        updated.public_key = Some(GroupPublicKey::from_point(&ProjectivePoint::GENERATOR));
        updated.commitments = vec![tss::point_hex(&ProjectivePoint::GENERATOR)];
        updated.deployed_at = Some(1);
        ensure_forward(Some(&existing), &updated, 2).expect("forward");
        assert!(ensure_forward(Some(&updated), &existing, 2).is_err());
    }

    #[test]
    fn test_party_cannot_change() {
        let existing = selected();
        let mut updated = existing.clone();
        updated.party.partners.reverse();
        assert!(ensure_forward(Some(&existing), &updated, 0).is_err());
    }

    #[test]
    fn test_new_context_is_accepted() {
        ensure_forward(None, &selected(), 0).expect("new");
    }

    #[test]
    fn test_transition_table() {
        assert!(ensure_valid_transition(ContextStatus::Deployed, ContextStatus::TssGroupSelected).is_err());
        assert!(ensure_valid_transition(ContextStatus::Expired, ContextStatus::Deployed).is_err());
        ensure_valid_transition(ContextStatus::New, ContextStatus::TssGroupSelected).expect("select");
    }
}
