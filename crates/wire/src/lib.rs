// SPDX-License-Identifier: MIT

//! Wire protocol for gateway-node connections.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod frame;

pub use codec::{decode, encode, read_message, write_message, ProtocolError, DEFAULT_MAX_FRAME_BYTES};
pub use frame::{Frame, FrameResultStatus};
