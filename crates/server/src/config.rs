// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment configuration for vulcand.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address {0:?}")]
    InvalidListenAddr(String),

    #[error("invalid log level {0:?} (expected debug, info, warn, or error)")]
    InvalidLogLevel(String),
}

/// Paths required to boot the microVM backend.
#[derive(Debug, Clone)]
pub struct MicrovmPaths {
    pub hypervisor_bin: PathBuf,
    pub kernel_image: PathBuf,
    pub rootfs_template: PathBuf,
}

/// Server configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// `VULCAN_LISTEN_ADDR`, default `:8080`
    pub listen_addr: SocketAddr,
    /// `VULCAN_DB_PATH`, default `vulcan.db`; `:memory:` disables the journal
    pub db_path: String,
    /// `VULCAN_LOG_LEVEL`, default `info`
    pub log_level: String,
    /// `VULCAN_NODE_ID`, default `node-0`
    pub node_id: String,
    /// `VULCAN_WORK_ROOT`, default `<tmp>/vulcan`
    pub work_root: PathBuf,
    /// `VULCAN_MICROVM_BIN` / `VULCAN_MICROVM_KERNEL` / `VULCAN_MICROVM_ROOTFS`,
    /// all three required for the microvm backend to register
    pub microvm: Option<MicrovmPaths>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let listen_addr = parse_listen_addr(&env_or("VULCAN_LISTEN_ADDR", ":8080"))?;
        let log_level = parse_log_level(&env_or("VULCAN_LOG_LEVEL", "info"))?;
        let db_path = env_or("VULCAN_DB_PATH", "vulcan.db");
        let node_id = env_or("VULCAN_NODE_ID", "node-0");
        let work_root = std::env::var("VULCAN_WORK_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("vulcan"));

        let microvm = match (
            std::env::var("VULCAN_MICROVM_BIN"),
            std::env::var("VULCAN_MICROVM_KERNEL"),
            std::env::var("VULCAN_MICROVM_ROOTFS"),
        ) {
            (Ok(bin), Ok(kernel), Ok(rootfs)) => Some(MicrovmPaths {
                hypervisor_bin: PathBuf::from(bin),
                kernel_image: PathBuf::from(kernel),
                rootfs_template: PathBuf::from(rootfs),
            }),
            _ => None,
        };

        Ok(Self {
            listen_addr,
            db_path,
            log_level,
            node_id,
            work_root,
            microvm,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Accept both `host:port` and the bare `:port` shorthand.
fn parse_listen_addr(raw: &str) -> Result<SocketAddr, ConfigError> {
    let candidate = if raw.starts_with(':') {
        format!("0.0.0.0{raw}")
    } else {
        raw.to_string()
    };
    candidate
        .parse()
        .map_err(|_| ConfigError::InvalidListenAddr(raw.to_string()))
}

/// Case-insensitive level vocabulary check.
fn parse_log_level(raw: &str) -> Result<String, ConfigError> {
    let level = raw.to_ascii_lowercase();
    match level.as_str() {
        "debug" | "info" | "warn" | "error" => Ok(level),
        _ => Err(ConfigError::InvalidLogLevel(raw.to_string())),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
