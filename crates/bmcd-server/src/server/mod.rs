//! Server-side components of the `bmcd` RPC front-end.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/env configuration and the immutable [`config::ServerConfig`].
//! - [`context`] - per-call state shared by the interceptors.
//! - [`interceptor`] - the interceptor chain and its five standard stages.
//! - [`service`] - the `Machine` gRPC service and the terminal method router.
//! - [`metrics`] - the Prometheus scrape endpoint.
//! - [`rpc`] - the gRPC listener.
//! - [`lifecycle`] - runs both listeners under one cancellation scope.
//! - [`telemetry`] - `tracing` subscriber setup.

pub mod config;
pub mod context;
pub mod interceptor;
pub mod lifecycle;
pub mod metrics;
pub mod rpc;
pub mod service;
pub mod telemetry;
