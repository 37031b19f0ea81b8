//! The gRPC listener: `bmcd.v1.Machine` behind the interceptor pipeline, plus
//! the standard health service.
//!
//! Health checks are answered directly by `tonic-health` and never pass
//! through the interceptor chain, so they do not show up as call records or
//! RPC metrics.

use crate::server::service::{MachineService, build_machine_service};
use bmcd_core::proto::machine_server::MachineServer;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

/// Serves on an already bound listener until `shutdown` fires, then stops
/// accepting and lets in-flight calls finish.
///
/// # Errors
///
/// Returns the transport error that stopped the server.
pub async fn serve_on(
    listener: TcpListener,
    service: MachineService,
    shutdown: CancellationToken,
) -> Result<(), tonic::transport::Error> {
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<MachineServer<MachineService>>()
        .await;

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "gRPC listener accepting calls");
    }

    Server::builder()
        .http2_adaptive_window(Some(true))
        .add_service(health_service)
        .add_service(build_machine_service(service))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            shutdown.cancelled().await;
            tracing::info!("gRPC listener draining");
            health_reporter
                .set_not_serving::<MachineServer<MachineService>>()
                .await;
        })
        .await?;

    tracing::info!("gRPC listener stopped");
    Ok(())
}
