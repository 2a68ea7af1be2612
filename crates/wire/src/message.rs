// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Guest protocol message types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vulcan_core::Runtime;

/// The single request a guest receives per connection.
///
/// `code` is either source text written verbatim to the entrypoint, or a
/// base64 payload whose decoded bytes start with the gzip magic, in which
/// case it is extracted as a gzip tar archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestRequest {
    pub runtime: Runtime,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_s: Option<u64>,
}

/// Streamed message from guest to host.
///
/// A connection carries zero or more `log` messages terminated by exactly
/// one `result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GuestMessage {
    Log { line: String },
    Result { response: GuestResponse },
}

/// Terminal outcome of a guest execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestResponse {
    pub exit_code: i32,
    /// Captured stdout+stderr, in arrival order
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
