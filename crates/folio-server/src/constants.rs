//! Server configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default HTTP/WebSocket port.
pub const DEFAULT_PORT: u16 = 8888;

/// Default bind address (localhost only).
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Interval between WebSocket pings to each connected client.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// SQLite file name inside the data directory.
pub const DB_FILE_NAME: &str = "folio.db";

/// Template directory name inside the data directory.
pub const TEMPLATE_DIR_NAME: &str = "templates";

/// Author label for HTTP mutations that name no author.
pub const DEFAULT_AUTHOR: &str = "anonymous";

/// Path of the realtime WebSocket endpoint.
pub const WEBSOCKET_PATH: &str = "/websocket";
