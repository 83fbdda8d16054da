use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ircserv::config::Cli;
use ircserv::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // JSON logs when IRCSERV_LOG_JSON=1, human-readable otherwise
    let json_logs = std::env::var("IRCSERV_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("ircserv=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = cli.into_config();
    tracing::info!("Starting IRC server on {}", config.listen_addr);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received");
                on_signal.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for interrupt: {e}"),
        }
    });

    let result = Server::new(config).run(cancel).await;
    if let Err(ref e) = result {
        tracing::error!("Server failed: {e:#}");
    }
    result
}
