// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vulcan microVM guest agent
//!
//! Launched as PID 1 by the hypervisor. Mounts the essential filesystems,
//! opens a vsock listener, and serves one workload request per connection:
//! framed request in, framed log stream out, terminated by a result frame.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod serve;
mod setup;

use std::path::Path;
use tokio_vsock::{VsockAddr, VsockListener, VMADDR_CID_ANY};
use tracing::{error, info};

/// Default vsock port, overridable for host-mode testing.
const DEFAULT_PORT: u32 = 52;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Capability check, not a build-time flag: mounted essentials are only
    // ours to set up when the kernel handed us init.
    let is_init = std::process::id() == 1;
    if is_init {
        setup::mount_essentials()?;
    }
    setup::ensure_path();

    let port = std::env::var("VULCAN_GUEST_PORT")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(DEFAULT_PORT);

    let mut listener = VsockListener::bind(VsockAddr::new(VMADDR_CID_ANY, port))?;
    info!(port, is_init, "guest agent listening");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!(cid = addr.cid(), "connection accepted");
                tokio::spawn(async move {
                    if let Err(e) =
                        serve::serve_conn(stream, Path::new(serve::WORKDIR)).await
                    {
                        error!("connection error: {e}");
                    }
                });
            }
            Err(e) => {
                error!("accept error: {e}");
            }
        }
    }
}
