// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! HTTP surface and process assembly for the Vulcan server

mod config;
mod dto;
mod error;
mod http;

pub use config::{Config, ConfigError, MicrovmPaths};
pub use dto::{
    BackendBody, CreateWorkloadRequest, LogHistoryResponse, LogLineBody, WorkloadBody,
    WorkloadListResponse,
};
pub use error::ApiError;
pub use http::{router, AppState};

use std::sync::Arc;
use tracing::{info, warn};
use vulcan_backends::{Backend, BackendRegistry, MicrovmBackend, MicrovmConfig, ProcessBackend};
use vulcan_core::IsolationMode;

/// Assemble the backend registry from configuration.
///
/// The process backend always registers. The microVM backend registers
/// only when its artifacts are configured and its self-check passes.
pub fn build_registry(config: &Config) -> BackendRegistry {
    let mut builder = BackendRegistry::builder();

    if let Some(paths) = &config.microvm {
        let backend = MicrovmBackend::new(MicrovmConfig::new(
            &paths.hypervisor_bin,
            &paths.kernel_image,
            &paths.rootfs_template,
            config.work_root.join("microvm"),
        ));
        match backend.verify() {
            Ok(()) => {
                info!("microvm backend registered");
                builder = builder.register(IsolationMode::Microvm, Arc::new(backend));
            }
            Err(e) => {
                warn!(error = %e, "microvm backend configured but failed verification, skipping");
            }
        }
    }

    builder = builder.register(
        IsolationMode::Isolate,
        Arc::new(ProcessBackend::new(config.work_root.join("isolate"))),
    );

    builder.build()
}
