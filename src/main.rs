use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use auth_gateway::config;
use auth_gateway::lifecycle::{wait_for_signal, Shutdown};
use auth_gateway::observability::{logging, metrics};
use auth_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "auth-gateway")]
#[command(about = "Login service issuing signed access tokens", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = config::load(args.config.as_deref())?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "auth-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        directory = %config.directory.base_url,
        breaker_max_requests = config.breaker.max_requests,
        breaker_timeout_secs = config.breaker.timeout_secs,
        "Configuration loaded"
    );

    if let Some(collector) = &config.observability.tracing_collector {
        tracing::info!(collector = %collector, "Trace collector configured; spans are logged locally only");
    }

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;
    let shutdown = Shutdown::new();
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut server_task => {
            result??;
            return Ok(());
        }
        signal = wait_for_signal() => {
            let signal = signal?;
            tracing::info!(signal, "Shutdown signal received");
            shutdown.trigger();
            tracing::debug!(subscribers = shutdown.receiver_count(), "Shutdown broadcast sent");
        }
    }

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
