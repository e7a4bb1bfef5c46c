//! # subd-protocol
//!
//! Wire protocol implementation for the subd record server.
//!
//! This crate provides:
//! - Length-prefixed framing (4-byte little-endian length + UTF-8 payload)
//! - Detection of the out-of-band change-notification sentinel
//! - Builders for every command verb the server understands
//! - A tolerant parser for status and tabular replies

pub mod codec;
pub mod command;
pub mod error;
pub mod frame;
pub mod reply;

pub use codec::{Decoder, Encoder};
pub use command::{Command, Filter, PageRange, RecordFields, Verb};
pub use error::ProtocolError;
pub use frame::{Frame, Prefix, LENGTH_PREFIX_SIZE, SENTINEL, SENTINEL_BYTES};
pub use reply::{Record, Reply};

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum frame payload size (64 MiB).
///
/// Must stay strictly below `u32::MAX`, which is the sentinel read unsigned.
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;
