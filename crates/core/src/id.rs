// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workload identifier generation

use std::sync::OnceLock;

use parking_lot::Mutex;
use ulid::{Generator, Ulid};

/// Process-wide monotonic ULID generator.
///
/// Serialized behind a mutex so two ids generated in the same millisecond
/// still sort in generation order.
fn generator() -> &'static Mutex<Generator> {
    static GEN: OnceLock<Mutex<Generator>> = OnceLock::new();
    GEN.get_or_init(|| Mutex::new(Generator::new()))
}

/// Unique identifier for a workload.
///
/// The string form of a ULID: 26 characters of Crockford Base32 encoding
/// creation-time millis in the high bits, so ids sort lexicographically by
/// creation time. Opaque to clients; the core never parses it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct WorkloadId(String);

impl WorkloadId {
    /// Length of the canonical string form.
    pub const LEN: usize = 26;

    /// Generate a fresh id, monotonic within a millisecond.
    pub fn generate() -> Self {
        let mut monotonic = generator().lock();
        // The generator only errors when the random tail overflows within a
        // single millisecond; fall back to a fresh random ULID.
        let ulid = monotonic.generate().unwrap_or_else(|_| Ulid::new());
        Self(ulid.to_string())
    }

    /// Create an id from an existing string (parsing/deserialization).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkloadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkloadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for WorkloadId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for WorkloadId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for WorkloadId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for WorkloadId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
