//! Folio server binary
//!
//! HTTP + WebSocket server for collaborative block documents.
//!
//! ## Usage
//!
//! ```bash
//! folio-server                        # 127.0.0.1:8888, data in the XDG data dir
//! folio-server --port 9000 --bind 0.0.0.0
//! folio-server --db ./folio.db --templates ./templates
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use folio_server::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_PORT};
use folio_server::{FolioServer, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "folio-server")]
#[command(about = "Collaborative block document server")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = DEFAULT_BIND_ADDRESS)]
    bind: IpAddr,

    /// SQLite database path (default: <data dir>/folio/folio.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Template directory (default: <data dir>/folio/templates)
    #[arg(long)]
    templates: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig::production(self.port);
        config.bind_addr = SocketAddr::new(self.bind, self.port);
        if let Some(db) = self.db {
            config.db_path = db;
        }
        if let Some(templates) = self.templates {
            config.template_dir = templates;
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Args::parse().into_config();
    tracing::info!(
        db = %config.db_path.display(),
        templates = %config.template_dir.display(),
        "data paths"
    );

    let server = FolioServer::new(config);
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {:#}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
