use tracing::info;
use tracing_subscriber::EnvFilter;

use vault_server::{Directory, FileStorage, Server, ServerConfig, ServerState};
use vault_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vault_server=debug")),
        )
        .init();

    info!("Starting vault server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.db_path)?;
    let directory = Directory::load(db)?;
    let storage = FileStorage::new(config.storage_path.clone()).await?;

    let state = ServerState::new(directory, storage, &config);
    let server = Server::bind(config.listen_addr(), state).await?;

    // -----------------------------------------------------------------------
    // 4. Accept connections until shutdown
    // -----------------------------------------------------------------------
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Server failed");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
