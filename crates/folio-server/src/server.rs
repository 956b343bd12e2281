//! Server assembly: storage, hub, router, listener.

use std::sync::Arc;

use anyhow::Context;
use folio_kernel::{DirTemplateStore, DocumentDb, SharedDocumentStore, shared_document_store};
use tokio::net::TcpListener;

use crate::api::router;
use crate::config::ServerConfig;
use crate::hub::Hub;

pub struct FolioServer {
    config: ServerConfig,
}

impl FolioServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open the database and template directory, seeding the default
    /// template into an empty directory.
    pub fn open_store(&self) -> anyhow::Result<SharedDocumentStore> {
        if let Some(parent) = self.config.db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating data dir {}", parent.display()))?;
        }
        let db = DocumentDb::open(&self.config.db_path)
            .with_context(|| format!("opening database {}", self.config.db_path.display()))?;
        let templates = DirTemplateStore::open(&self.config.template_dir).with_context(|| {
            format!("opening template dir {}", self.config.template_dir.display())
        })?;
        if templates.seed_default()? {
            tracing::info!(dir = %self.config.template_dir.display(), "seeded default template");
        }
        Ok(shared_document_store(db, Arc::new(templates)))
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> anyhow::Result<()> {
        let hub = Arc::new(Hub::new(self.open_store()?));
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .with_context(|| format!("binding {}", self.config.bind_addr))?;
        serve(listener, hub).await
    }
}

/// Serve the HTTP and WebSocket surface for `hub` on `listener`.
pub async fn serve(listener: TcpListener, hub: Arc<Hub>) -> anyhow::Result<()> {
    tracing::info!("Starting folio server on {}", listener.local_addr()?);
    axum::serve(listener, router(hub)).await?;
    Ok(())
}
