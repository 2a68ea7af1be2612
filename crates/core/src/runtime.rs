// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Language runtime vocabulary and command table.

use serde::{Deserialize, Serialize};

/// Language runtime a workload executes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Go,
    Node,
    Python,
    Wasm,
    Oci,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::Node => "node",
            Self::Python => "python",
            Self::Wasm => "wasm",
            Self::Oci => "oci",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "go" => Some(Self::Go),
            "node" => Some(Self::Node),
            "python" => Some(Self::Python),
            "wasm" => Some(Self::Wasm),
            "oci" => Some(Self::Oci),
            _ => None,
        }
    }

    /// Default entrypoint file name, for runtimes executed from a source file.
    ///
    /// `wasm` and `oci` workloads carry their entrypoint inside the payload
    /// and have no file-level default.
    pub fn default_entrypoint(&self) -> Option<&'static str> {
        match self {
            Self::Go => Some("main.go"),
            Self::Node => Some("index.js"),
            Self::Python => Some("main.py"),
            Self::Wasm | Self::Oci => None,
        }
    }

    /// Command line that executes `entrypoint` from a work directory.
    ///
    /// Returns `None` for runtimes without a direct host command; backends
    /// that support those runtimes supply their own execution path.
    pub fn command(&self, entrypoint: &str) -> Option<(&'static str, Vec<String>)> {
        match self {
            Self::Go => Some(("go", vec!["run".to_string(), entrypoint.to_string()])),
            Self::Node => Some(("node", vec![entrypoint.to_string()])),
            Self::Python => Some(("python3", vec![entrypoint.to_string()])),
            Self::Wasm | Self::Oci => None,
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
