// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PID-1 system setup: essential mounts and a usable PATH.

use nix::mount::{mount, MsFlags};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mount {target} failed: {source}")]
    Mount {
        target: &'static str,
        source: nix::Error,
    },
}

/// Default PATH when the kernel env carries none.
const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Mount `/proc`, `/sys`, and `/dev` when running as init.
///
/// An already-mounted target (EBUSY) is fine: the hypervisor image may
/// pre-mount some of these.
pub fn mount_essentials() -> Result<(), SetupError> {
    for (source, target, fstype) in [
        ("proc", "/proc", "proc"),
        ("sysfs", "/sys", "sysfs"),
        ("devtmpfs", "/dev", "devtmpfs"),
    ] {
        std::fs::create_dir_all(target)?;
        match mount(
            Some(source),
            target,
            Some(fstype),
            MsFlags::empty(),
            None::<&str>,
        ) {
            Ok(()) => {}
            Err(nix::Error::EBUSY) => {}
            Err(source) => return Err(SetupError::Mount { target, source }),
        }
    }
    Ok(())
}

/// Set a default PATH when the environment has none.
pub fn ensure_path() {
    if std::env::var("PATH").map(|p| p.is_empty()).unwrap_or(true) {
        std::env::set_var("PATH", DEFAULT_PATH);
    }
}
