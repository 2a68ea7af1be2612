// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Execution backends for Vulcan
//!
//! A `Backend` runs one workload to termination under an isolation
//! boundary. The registry maps isolation modes to registered backends and
//! resolves `auto` requests deterministically.

mod backend;
mod microvm;
mod process;
mod registry;

pub use backend::{Backend, BackendError, Capabilities, ExecSpec, LogWriter, WorkloadResult};
pub use microvm::{MicrovmBackend, MicrovmConfig};
pub use process::ProcessBackend;
pub use registry::{BackendRegistry, RegistryBuilder, RouteError};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBackend, FakeBehavior};
