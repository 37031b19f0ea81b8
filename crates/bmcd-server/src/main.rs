use bmcd_server::server::{
    config::{CliArgs, ServerConfig},
    interceptor::{Chain, RpcMetrics, TracingCallLog},
    lifecycle,
    service::{MachineService, MethodRouter},
    telemetry::init_telemetry,
};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry(config.log_level)?;
    log_startup_info(&config);

    let mut registry = Registry::default();
    let metrics = Arc::new(RpcMetrics::new(&mut registry));
    let registry = Arc::new(registry);

    // Device operations are provided by the embedding deployment; an empty
    // router answers every call with `Unimplemented` after the chain runs.
    let router = MethodRouter::new();
    let pipeline = Chain::standard(metrics, Arc::new(TracingCallLog)).compose(Arc::new(router));
    let service = MachineService::new(pipeline);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    if let Err(err) = lifecycle::run(shutdown, &config, service, registry).await {
        tracing::error!(error = ?anyhow::Error::from(err), "server terminated");
        anyhow::bail!("server terminated with a listener failure");
    }

    tracing::info!("server shut down cleanly");
    Ok(())
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(?config, "starting bmcd-server");
    } else {
        tracing::info!(
            rpc_addr = %config.rpc_addr,
            metrics_addr = %config.metrics_addr,
            "starting bmcd-server"
        );
    }
}

/// Cancels `shutdown` on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C signal"),
        () = terminate => tracing::info!("received SIGTERM signal"),
    }

    tracing::info!("shutdown signal received, terminating gracefully");
    shutdown.cancel();
}
