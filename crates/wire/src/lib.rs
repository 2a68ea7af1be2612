// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Guest protocol for host <-> microVM communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. The same
//! framing runs on both sides of the vsock; tests drive it over in-memory
//! duplex streams. Payload staging (verbatim source or base64 gzip-tar
//! archives) lives here too, shared by the guest agent and any host-side
//! backend that materializes work directories.

mod frame;
mod message;
mod payload;

pub use frame::{decode, encode, read_message, write_message, ProtocolError, MAX_MESSAGE_SIZE};
pub use message::{GuestMessage, GuestRequest, GuestResponse};
pub use payload::{stage_payload, PayloadError};
