use crate::foundation::{NodeId, RequestId, Seed, ThresholdError};
use serde_json::Value;

const REQUEST_ID_DOMAIN: &[u8] = b"quorum:request:id:v1:";

/// Deterministic request id over the request content.
///
/// `params` is serialized through `serde_json::Value`, whose object maps are ordered by key, so
/// partners recompute the same id regardless of the field order a client used.
pub fn compute_request_id(
    app: &str,
    method: &str,
    params: &Value,
    seed: &Seed,
    gateway: &NodeId,
    started_at: u64,
) -> Result<RequestId, ThresholdError> {
    let payload = serde_json::to_vec(&(app, method, params, seed.as_str(), gateway.as_str(), started_at))?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(REQUEST_ID_DOMAIN);
    hasher.update(&payload);
    Ok(RequestId::new(*hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_id_ignores_param_key_order() {
        let a: Value = serde_json::from_str(r#"{"b": 2, "a": 1}"#).expect("json");
        let b = json!({"a": 1, "b": 2});
        let seed = Seed::from("s");
        let gw = NodeId::from("n1");
        assert_eq!(
            compute_request_id("app", "m", &a, &seed, &gw, 5).expect("id"),
            compute_request_id("app", "m", &b, &seed, &gw, 5).expect("id")
        );
    }

    #[test]
    fn test_request_id_changes_with_content() {
        let seed = Seed::from("s");
        let gw = NodeId::from("n1");
        let base = compute_request_id("app", "m", &json!({"a": 1}), &seed, &gw, 5).expect("id");
        assert_ne!(base, compute_request_id("app", "m", &json!({"a": 2}), &seed, &gw, 5).expect("id"));
        assert_ne!(base, compute_request_id("app", "other", &json!({"a": 1}), &seed, &gw, 5).expect("id"));
        assert_ne!(base, compute_request_id("app", "m", &json!({"a": 1}), &seed, &gw, 6).expect("id"));
    }
}
