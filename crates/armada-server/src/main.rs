//! Fleet manager server binary.

use anyhow::{Context, Result};
use clap::Parser;

use armada_server::{FleetServer, load_settings_from_path, settings};

/// Edge fleet manager server.
#[derive(Parser, Debug)]
#[command(name = "armada-server", about = "Edge fleet manager server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file.
    #[arg(long)]
    settings: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();
    let settings_path = args.settings.unwrap_or_else(settings::settings_path);
    let mut server_settings =
        load_settings_from_path(&settings_path).context("failed to load settings")?;
    if let Some(host) = args.host {
        server_settings.host = host;
    }
    if let Some(port) = args.port {
        server_settings.port = port;
    }

    let server = FleetServer::new(server_settings);
    let (addr, handle) = server.listen().await.context("failed to bind server")?;
    tracing::info!("armada fleet manager listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    server.shutdown().graceful_shutdown(vec![handle], None).await;
    tracing::info!("shutdown complete");
    Ok(())
}
