//! Codex RAG server binary
//!
//! Run with: cargo run -p codex-rag --bin codex-rag-server

use codex_rag::{config::RagConfig, server::RagServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codex_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                         Codex RAG                         ║
║           Document Q&A with Source Citations              ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    // Load configuration
    let config = RagConfig::from_env()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Embedding model: {}", config.llm.embed_model);
    tracing::info!("  - LLM model: {}", config.llm.generate_model);
    tracing::info!(
        "  - Citation chunks: {} chars, {} overlap, {:?} policy",
        config.citation.chunk_size,
        config.citation.chunk_overlap,
        config.citation.policy
    );
    tracing::info!("  - Index: {}", config.index.storage_path.display());

    // Create and start server
    let server = RagServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/documents    - Index a document");
    println!("  POST /api/query        - Ask a question");
    println!("  POST /api/query/stream - Ask a question (SSE)");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
