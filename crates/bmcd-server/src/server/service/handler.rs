//! gRPC entry point for the `bmcd.v1.Machine` service.
//!
//! [`MachineService`] implements the generated [`Machine`] trait by handing
//! every call to the composed [`Pipeline`]. It holds no business logic of its
//! own: interceptors wrap each call, and the terminal [`MethodRouter`]
//! decides what actually happens.
//!
//! [`MethodRouter`]: super::router::MethodRouter

use crate::server::interceptor::Pipeline;
use bmcd_core::{
    proto::machine_server::{Machine, MachineServer},
    types::{DeviceRequest, DeviceResponse, PowerRequest, PowerResponse, methods},
};
use tonic::{Request, Response, Status, codec::CompressionEncoding};

#[derive(Clone)]
pub struct MachineService {
    pipeline: Pipeline,
}

impl MachineService {
    pub const fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }
}

#[tonic::async_trait]
impl Machine for MachineService {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn power(&self, request: Request<PowerRequest>) -> Result<Response<PowerResponse>, Status> {
        self.pipeline.unary(methods::POWER, request).await
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn boot_device(
        &self,
        request: Request<DeviceRequest>,
    ) -> Result<Response<DeviceResponse>, Status> {
        self.pipeline.unary(methods::BOOT_DEVICE, request).await
    }
}

/// Wraps the service in its generated server, with compression enabled in
/// both directions.
pub fn build_machine_service(service: MachineService) -> MachineServer<MachineService> {
    MachineServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}
