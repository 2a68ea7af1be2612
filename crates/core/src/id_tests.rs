// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::WorkloadId;
use std::collections::HashSet;

/// Crockford Base32 alphabet used by the ULID string form.
const ALPHABET: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";

#[test]
fn generated_id_is_26_crockford_chars() {
    let id = WorkloadId::generate();
    assert_eq!(id.as_str().len(), WorkloadId::LEN);
    for c in id.as_str().chars() {
        assert!(ALPHABET.contains(c), "unexpected character {c:?} in {id}");
    }
}

#[test]
fn thousand_ids_are_distinct_and_time_ordered() {
    let ids: Vec<WorkloadId> = (0..1000).map(|_| WorkloadId::generate()).collect();

    let distinct: HashSet<&str> = ids.iter().map(|id| id.as_str()).collect();
    assert_eq!(distinct.len(), 1000);

    // Monotonic generation implies the batch is already in sorted order.
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn serde_is_transparent() {
    let id = WorkloadId::generate();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));

    let back: WorkloadId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
