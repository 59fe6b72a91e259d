use anyhow::Context;
use clap::Parser;
use commrelay::metrics::{init_metrics, start_metrics_server, MetricsConfig};
use commrelay::{Communicator, CommunicatorConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "commrelay")]
#[command(about = "Multi-transport store-and-forward message relay")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "COMMRELAY_CONFIG", default_value = "commrelay.toml")]
    config: PathBuf,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,

    /// How often received messages are drained, in milliseconds
    #[arg(long, default_value_t = 250)]
    drain_interval_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,commrelay=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let config = CommunicatorConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.metrics_addr {
        Some(addr) => {
            start_metrics_server(MetricsConfig::with_addr(addr)).context("starting metrics exporter")?;
            info!(%addr, "Metrics exporter listening");
        }
        None => init_metrics(),
    }

    let communicator = Communicator::new(config);
    communicator.open().await;

    let mut ticker = tokio::time::interval(Duration::from_millis(cli.drain_interval_ms.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                while let Some(message) = communicator.receive() {
                    info!(?message, "Message received");
                }
            }
        }
    }

    info!("Shutting down");
    communicator.close().await;
    let (outbound, inbound) = communicator.queue_stats();
    info!(
        sent = outbound.total_processed,
        received = inbound.total_enqueued,
        dropped = inbound.total_rejected,
        "Relay totals"
    );
    Ok(())
}
