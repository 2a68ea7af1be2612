// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vulcan-core: domain model for the Vulcan workload control plane

pub mod id;
pub mod log_line;
pub mod runtime;
pub mod workload;

pub use id::WorkloadId;
pub use log_line::LogLine;
pub use runtime::Runtime;
pub use workload::{valid_transition, IsolationMode, Workload, WorkloadStatus};
