// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use thiserror::Error;
use vulcan_backends::RouteError;
use vulcan_core::WorkloadId;
use vulcan_storage::StoreError;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A synchronous submit outlived its deadline. The workload itself is
    /// persisted as killed.
    #[error("workload {id} did not terminate before the synchronous deadline")]
    SyncTimeout { id: WorkloadId },
}
