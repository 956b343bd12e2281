//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::constants::{DB_FILE_NAME, DEFAULT_PORT, TEMPLATE_DIR_NAME};

/// Where the server listens and keeps its data.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub template_dir: PathBuf,
}

impl ServerConfig {
    /// Localhost on `port`, data under [`ServerConfig::default_data_dir`].
    pub fn production(port: u16) -> Self {
        let data_dir = Self::default_data_dir();
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
            db_path: data_dir.join(DB_FILE_NAME),
            template_dir: data_dir.join(TEMPLATE_DIR_NAME),
        }
    }

    /// Localhost on an OS-assigned port, data under `dir` (for testing).
    pub fn ephemeral(dir: &Path) -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            db_path: dir.join(DB_FILE_NAME),
            template_dir: dir.join(TEMPLATE_DIR_NAME),
        }
    }

    /// `$XDG_DATA_HOME/folio` (or the platform equivalent), falling back to
    /// `./folio`.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("folio")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::production(DEFAULT_PORT)
    }
}
