use quorum_core::domain::app::sign_hash;
use quorum_core::domain::request::compute_request_id;
use quorum_core::domain::TypedValue;
use quorum_core::foundation::{AppId, NodeId, RequestId, Seed};
use serde_json::json;
use sha3::{Digest, Keccak256};

#[test]
fn sign_hash_is_keccak_of_framed_params() {
    let req_id = RequestId::new([0xab; 32]);
    let params = vec![TypedValue::uint(1), TypedValue::Bool(true), TypedValue::string("eth")];

    let mut framed = vec![0x03, 0, 0, 0, 1, b'7', 0x05];
    framed.extend_from_slice(&[0xab; 32]);
    let mut one = [0u8; 32];
    one[31] = 1;
    framed.push(0x01);
    framed.extend_from_slice(&one);
    framed.extend_from_slice(&[0x04, 1]);
    framed.extend_from_slice(&[0x03, 0, 0, 0, 3]);
    framed.extend_from_slice(b"eth");
    let mut expected = [0u8; 32];
    expected.copy_from_slice(&Keccak256::digest(&framed));

    assert_eq!(sign_hash(&AppId::from("7"), &req_id, &params).expect("hash"), expected);
}

#[test]
fn sign_hash_differs_when_string_boundaries_move() {
    let app = AppId::from("oracle");
    let req_id = RequestId::new([1; 32]);
    let left = sign_hash(&app, &req_id, &[TypedValue::string("ab"), TypedValue::string("c")]).expect("hash");
    let right = sign_hash(&app, &req_id, &[TypedValue::string("a"), TypedValue::string("bc")]).expect("hash");
    assert_ne!(left, right);
}

#[test]
fn request_id_is_stable_across_param_order() {
    let seed = Seed::from("seed");
    let gateway = NodeId::from("node-1");
    let a = compute_request_id("echo", "echo", &json!({"value": "x", "n": 1}), &seed, &gateway, 10).expect("id");
    let b = compute_request_id("echo", "echo", &json!({"n": 1, "value": "x"}), &seed, &gateway, 10).expect("id");
    assert_eq!(a, b);
    let other_gateway = compute_request_id("echo", "echo", &json!({"n": 1, "value": "x"}), &seed, &NodeId::from("node-2"), 10).expect("id");
    assert_ne!(a, other_gateway);
}

#[test]
fn typed_values_round_trip_through_wire_form() {
    let params = vec![TypedValue::Address("0x00000000000000000000000000000000000000ff".to_string()), TypedValue::uint(u64::MAX)];
    let wire = serde_json::to_value(&params).expect("serialize");
    assert_eq!(wire[0]["type"], "address");
    assert_eq!(wire[1]["value"], u64::MAX.to_string());
    let back: Vec<TypedValue> = serde_json::from_value(wire).expect("deserialize");
    assert_eq!(back, params);
}
