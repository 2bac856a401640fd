use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vault_client::identity::DEFAULT_IDENTITY_FILE;
use vault_client::{Client, Identity, UploadOutcome};

#[derive(Parser)]
#[command(name = "vault-client")]
#[command(about = "Register with a vault server and upload one file", long_about = None)]
#[command(version)]
struct Cli {
    /// Server address as host:port
    #[arg(short, long, env = "VAULT_SERVER", default_value = "127.0.0.1:1234")]
    server: String,

    /// Where the issued client id is kept between runs
    #[arg(short, long, default_value = DEFAULT_IDENTITY_FILE)]
    identity: PathBuf,

    /// Name to register under (at most 255 bytes)
    name: String,

    /// File to upload
    file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let content = tokio::fs::read(&cli.file)
        .await
        .with_context(|| format!("reading {}", cli.file.display()))?;
    let filename = cli
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .context("file path has no usable file name")?
        .to_string();

    let mut client = Client::connect(&cli.server)
        .await
        .with_context(|| format!("connecting to {}", cli.server))?;

    let saved = Identity::load(&cli.identity)
        .await
        .with_context(|| format!("reading {}", cli.identity.display()))?;
    let id = client
        .register_or_resume(&cli.name, saved.as_ref())
        .await
        .context("registration")?;
    info!(client = %id, "Registered as {}", cli.name);

    if saved.as_ref().map(|identity| identity.client_id) != Some(id) {
        Identity::new(cli.name.as_str(), id)
            .save(&cli.identity)
            .await
            .with_context(|| format!("writing {}", cli.identity.display()))?;
    }

    client.exchange_keys(&cli.name).await.context("key exchange")?;

    match client.upload(&filename, &content).await? {
        UploadOutcome::Verified { attempts } => {
            info!(file = %filename, attempts, "Upload verified");
        }
        UploadOutcome::Rejected { attempts } => {
            anyhow::bail!("{filename} failed verification after {attempts} attempts");
        }
    }

    Ok(())
}
