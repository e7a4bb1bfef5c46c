//! # subd-client
//!
//! Client library for the subd record server.
//!
//! This crate provides:
//! - A transport session that sends one framed command at a time and reads
//!   the matching reply
//! - Detection of "database changed" notifications on the idle connection
//! - A background poller that surfaces those notifications as events
//! - Pagination and query state, persisted between runs
//! - A high-level `Session` that turns user actions into status updates

pub mod config;
pub mod connection;
pub mod error;
pub mod poller;
pub mod session;
pub mod state;
pub mod stream;

#[cfg(test)]
mod testing;

pub use config::{ClientConfig, ConfigError};
pub use connection::{Connection, ConnectionConfig, PollOutcome, SyncEvent};
pub use error::ClientError;
pub use poller::SyncPoller;
pub use session::{Action, Session, Status, Update};
pub use state::{PageState, Phase, PersistedState, StateStore};
pub use stream::PeekStream;
