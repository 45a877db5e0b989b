//! # Canonical Digest Vectors
//!
//! Fixed inputs and the SHA-256 of their JCS serialization. Audit checksums
//! are stored alongside the rows they cover and recomputed by verification
//! jobs, so these bytes must never drift between releases.

use serde_json::json;
use tally_core::{CanonicalBytes, Checksum};

fn digest(value: &serde_json::Value) -> String {
    let cb = CanonicalBytes::new(value).expect("canonicalization should succeed");
    Checksum::of(&cb).to_hex()
}

#[test]
fn empty_object() {
    assert_eq!(
        digest(&json!({})),
        "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
    );
}

#[test]
fn key_order_does_not_matter() {
    let a = json!({"b": 1, "a": "x"});
    let b = json!({"a": "x", "b": 1});
    let cb = CanonicalBytes::new(&a).unwrap();
    assert_eq!(cb.as_bytes(), br#"{"a":"x","b":1}"#);
    assert_eq!(digest(&a), digest(&b));
    assert_eq!(
        digest(&a),
        "cdab067e9f3beb32d1252cfd63e492592fecbf591b0d08cadb24bb17f3864246"
    );
}

#[test]
fn audit_checksum_shape() {
    let payload = json!({
        "timestamp": "2026-01-15T10:00:00Z",
        "reason": null,
        "entity_id": "inv-1",
        "entity": "Invoice",
        "actor": "u-1",
        "action": "UPDATE",
    });
    assert_eq!(
        digest(&payload),
        "b860c63ba6f7585ff8f4aa2347576f1ede975ebb55064a0da0c300aca7225967"
    );
}

#[test]
fn floats_never_reach_a_digest() {
    assert!(CanonicalBytes::new(&json!({"amount": 1.5})).is_err());
}
