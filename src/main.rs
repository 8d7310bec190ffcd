use std::sync::Arc;

use clap::Parser;
use nodewire::config::{CliArgs, Command, ServerConfig};
use nodewire::node::{node_registry, MemoryNode};
use nodewire::server::NodeServer;
use nodewire::telemetry::init_telemetry;
use nodewire::transport::Listener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let node = Arc::new(MemoryNode::new());
    for namespace in &config.namespaces {
        node.create_namespace(namespace);
    }

    let server = NodeServer::builder(node_registry(node.clone()))
        .max_concurrent_calls(config.max_concurrent_calls)
        .max_pending_frames(config.writer.max_pending_frames)
        .channel_capacity(config.writer.channel_capacity)
        .backpressure_timeout(config.writer.backpressure_timeout)
        .default_timeout(config.default_timeout)
        .max_payload_size(config.max_payload_size)
        .build();

    if config.command == Command::Schema {
        println!("{}", server.schema().to_json()?);
        return Ok(());
    }

    init_telemetry(config.log_json)?;

    let listener = Listener::bind(&config.listen).await?;
    tracing::info!(
        listen = %listener.local_addr()?,
        namespaces = ?node.namespaces(),
        max_concurrent_calls = config.max_concurrent_calls,
        "Starting node server"
    );

    tokio::spawn(shutdown_signal(server.shutdown_token()));
    server.serve(listener).await?;

    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler not installed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler not installed");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    shutdown.cancel();
}
