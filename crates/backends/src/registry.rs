// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Isolation mode -> backend registry with auto-routing.

use crate::backend::{Backend, Capabilities};
use std::sync::Arc;
use thiserror::Error;
use vulcan_core::{IsolationMode, Runtime};

/// Routing failures surfaced at submit time.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("unsupported runtime {runtime} for isolation {isolation}")]
    UnsupportedRuntime {
        runtime: Runtime,
        isolation: IsolationMode,
    },

    #[error("no backend registered for isolation {0}")]
    NoBackend(IsolationMode),
}

/// Write-once mapping from isolation mode to backend.
///
/// Built at startup, immutable and lock-free afterwards.
pub struct BackendRegistry {
    backends: Vec<(IsolationMode, Arc<dyn Backend>)>,
}

/// Startup-time builder for [`BackendRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    backends: Vec<(IsolationMode, Arc<dyn Backend>)>,
}

impl RegistryBuilder {
    /// Register a backend for a concrete isolation mode.
    ///
    /// Registering the same mode twice replaces the earlier entry.
    pub fn register(mut self, mode: IsolationMode, backend: Arc<dyn Backend>) -> Self {
        self.backends.retain(|(m, _)| *m != mode);
        self.backends.push((mode, backend));
        self
    }

    pub fn build(self) -> BackendRegistry {
        BackendRegistry {
            backends: self.backends,
        }
    }
}

impl BackendRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Backend registered for a concrete isolation mode, if any.
    pub fn lookup(&self, mode: IsolationMode) -> Option<Arc<dyn Backend>> {
        self.backends
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, b)| Arc::clone(b))
    }

    /// Resolve a submission's isolation request to a concrete backend.
    ///
    /// `auto` walks [`IsolationMode::AUTO_PRIORITY`] and picks the first
    /// registered backend supporting the runtime. A concrete request fails
    /// with `NoBackend` when nothing is registered for that mode, and with
    /// `UnsupportedRuntime` when the registered backend cannot run the
    /// runtime.
    pub fn resolve(
        &self,
        isolation: IsolationMode,
        runtime: Runtime,
    ) -> Result<(IsolationMode, Arc<dyn Backend>), RouteError> {
        if isolation == IsolationMode::Auto {
            for mode in IsolationMode::AUTO_PRIORITY {
                if let Some(backend) = self.lookup(mode) {
                    if backend.capabilities().supported_runtimes.contains(&runtime) {
                        return Ok((mode, backend));
                    }
                }
            }
            return Err(RouteError::UnsupportedRuntime {
                runtime,
                isolation: IsolationMode::Auto,
            });
        }

        let backend = self
            .lookup(isolation)
            .ok_or(RouteError::NoBackend(isolation))?;
        if !backend.capabilities().supported_runtimes.contains(&runtime) {
            return Err(RouteError::UnsupportedRuntime { runtime, isolation });
        }
        Ok((isolation, backend))
    }

    /// Capabilities of every registered backend, in registration order.
    pub fn capabilities(&self) -> Vec<Capabilities> {
        self.backends
            .iter()
            .map(|(_, b)| b.capabilities())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
