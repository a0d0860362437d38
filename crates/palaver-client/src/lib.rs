//! Synchronization engine for Palaver
//!
//! Action-based state machine that keeps a client's view of rooms, rosters,
//! and message logs consistent with a chat server across a live channel and
//! an HTTP fallback.
//!
//! # Architecture
//!
//! The engine follows the same sans-IO pattern as [`palaver_core`]: it
//! receives events ([`ClientEvent`]), processes them through pure state
//! machine logic, and returns actions ([`ClientAction`]) for the caller to
//! execute. State changes of interest to the UI are published as typed
//! [`SyncEvent`]s inside those actions; there are no callbacks and no global
//! instance - the [`Client`] handle is passed explicitly to whoever needs
//! it.
//!
//! # Components
//!
//! - [`Client`]: top-level engine combining the connection manager with the
//!   reconcilers below
//! - [`MessageLog`]: ordered, deduplicated per-room message log merging
//!   history pages, live pushes, and optimistic sends
//! - [`Directory`]: room directory and active-room roster, snapshot plus
//!   deltas
//! - [`DraftStore`]: debounced per-room draft persistence over a [`KvStore`]
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::connect_channel`]: WebSocket live channel
//! - [`transport::HttpApi`]: request/response fallback endpoints

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod directory;
mod dispatch;
mod drafts;
mod error;
mod event;
mod messages;
mod storage;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::Client;
pub use directory::{Directory, RoomSort};
pub use drafts::{DRAFT_DEBOUNCE, Draft, DraftStore};
pub use error::{ClientError, StoreError};
pub use event::{ClientAction, ClientEvent, HttpCall, SyncEvent};
pub use messages::{LogEntry, MessageLog, PENDING_MATCH_WINDOW, PushOutcome};
pub use palaver_core::{
    Connection, ConnectionError, ConnectionPhase,
    env::{Environment, SystemEnv},
};
pub use storage::{KvStore, MemoryKv, keys};
