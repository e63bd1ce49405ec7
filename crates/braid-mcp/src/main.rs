//! Braid Tool Server
//!
//! Stdio transport over the braid memory engine: one JSON envelope per
//! line in, one per line out. Fourteen operations — recall,
//! project_context, entanglement, trace, alerts, search, stats, projects,
//! session, decide, thread, flag, pattern, remember — all carried over the
//! same request/response shapes as the HTTP transport.
//!
//! Logs go to stderr; stdout is the protocol channel.

mod protocol;
mod server;
mod tools;

use std::sync::Arc;

use braid_core::{Config, Embedder, HashedEmbedder, MemoryService, SqliteVectorStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::protocol::stdio::StdioTransport;
use crate::server::ToolServer;

fn build_embedder(config: &Config) -> Arc<dyn Embedder> {
    #[cfg(feature = "embeddings")]
    {
        if config.embedding_model != braid_core::DEFAULT_EMBEDDING_MODEL {
            return Arc::new(braid_core::LocalEmbedder::new());
        }
    }
    let _ = config;
    Arc::new(HashedEmbedder::new())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {}", e);
            std::process::exit(2);
        }
    };

    let store = match SqliteVectorStore::new(config.db_path.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let embedder = build_embedder(&config);
    info!(model = embedder.model(), "braid tool server starting");

    let service = match MemoryService::new(store, embedder, config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("failed to start service: {}", e);
            std::process::exit(1);
        }
    };

    let transport = StdioTransport::new();
    if let Err(e) = transport.run(ToolServer::new(service)).await {
        error!("transport error: {}", e);
        std::process::exit(1);
    }
}
