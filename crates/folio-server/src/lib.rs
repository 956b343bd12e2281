//! Folio server library
//!
//! Realtime collaboration over the Folio kernel: per-block locks, live
//! sessions, a JSON message protocol on a WebSocket, and an HTTP API.

pub mod api;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod hub;
pub mod locks;
pub mod protocol;
pub mod server;
pub mod sessions;
pub mod ws;

pub use api::router;
pub use config::ServerConfig;
pub use connection::{Connection, ConnectionState};
pub use error::DispatchError;
pub use hub::Hub;
pub use locks::{Acquire, LockHolder, LockInfo, LockKey, LockTable, Release};
pub use protocol::{ClientMessage, OptionsJson, ServerMessage};
pub use server::{FolioServer, serve};
pub use sessions::{Outbox, SessionRegistry};
