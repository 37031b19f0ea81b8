//! Prometheus RPC metrics, recorded by the outermost interceptor.
//!
//! Families follow the usual `grpc_server_*` naming so existing dashboards
//! work unchanged. Counters get their `_total` suffix from the encoder.

use super::{CallRequest, Interceptor, Next, Reply, code_name};
use crate::server::context::{CallContext, MethodInfo};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};
use std::sync::Arc;
use tonic::{Code, Status};

/// Latency buckets in seconds.
const HANDLING_SECONDS_BUCKETS: [f64; 12] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// Only unary calls go through the pipeline.
const GRPC_TYPE_UNARY: &str = "unary";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MethodLabels {
    pub grpc_type: String,
    pub grpc_service: String,
    pub grpc_method: String,
}

impl MethodLabels {
    fn unary(method: MethodInfo) -> Self {
        Self {
            grpc_type: GRPC_TYPE_UNARY.to_string(),
            grpc_service: method.service().to_string(),
            grpc_method: method.method().to_string(),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HandledLabels {
    pub grpc_type: String,
    pub grpc_service: String,
    pub grpc_method: String,
    pub grpc_code: String,
}

/// Server-side RPC metric families, registered once at startup.
#[derive(Clone, Debug)]
pub struct RpcMetrics {
    pub started: Family<MethodLabels, Counter>,
    pub handled: Family<HandledLabels, Counter>,
    pub msg_received: Family<MethodLabels, Counter>,
    pub msg_sent: Family<MethodLabels, Counter>,
    pub handling_seconds: Family<MethodLabels, Histogram>,
}

impl RpcMetrics {
    /// Creates the families and registers them with `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let started = Family::<MethodLabels, Counter>::default();
        registry.register(
            "grpc_server_started",
            "Total number of RPCs started on the server",
            started.clone(),
        );

        let handled = Family::<HandledLabels, Counter>::default();
        registry.register(
            "grpc_server_handled",
            "Total number of RPCs completed on the server, regardless of success or failure",
            handled.clone(),
        );

        let msg_received = Family::<MethodLabels, Counter>::default();
        registry.register(
            "grpc_server_msg_received",
            "Total number of RPC messages received on the server",
            msg_received.clone(),
        );

        let msg_sent = Family::<MethodLabels, Counter>::default();
        registry.register(
            "grpc_server_msg_sent",
            "Total number of gRPC messages sent by the server",
            msg_sent.clone(),
        );

        let handling_seconds = Family::<MethodLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(HANDLING_SECONDS_BUCKETS.iter().copied())
        });
        registry.register(
            "grpc_server_handling_seconds",
            "Histogram of response latency (seconds) of gRPC that had been application-level handled by the server",
            handling_seconds.clone(),
        );

        Self {
            started,
            handled,
            msg_received,
            msg_sent,
            handling_seconds,
        }
    }

    fn record_start(&self, labels: &MethodLabels) {
        self.started.get_or_create(labels).inc();
        self.msg_received.get_or_create(labels).inc();
    }

    fn record_finish(&self, labels: MethodLabels, code: Code, seconds: f64) {
        if code == Code::Ok {
            self.msg_sent.get_or_create(&labels).inc();
        }
        self.handling_seconds.get_or_create(&labels).observe(seconds);

        let MethodLabels {
            grpc_type,
            grpc_service,
            grpc_method,
        } = labels;
        self.handled
            .get_or_create(&HandledLabels {
                grpc_type,
                grpc_service,
                grpc_method,
                grpc_code: code_name(code).to_string(),
            })
            .inc();
    }
}

/// Counts and times every call, including time spent in inner interceptors.
#[derive(Clone, Debug)]
pub struct MetricsInterceptor {
    metrics: Arc<RpcMetrics>,
}

impl MetricsInterceptor {
    pub const fn new(metrics: Arc<RpcMetrics>) -> Self {
        Self { metrics }
    }
}

#[tonic::async_trait]
impl Interceptor for MetricsInterceptor {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn intercept(
        &self,
        ctx: &mut CallContext,
        request: CallRequest,
        next: Next<'_>,
    ) -> Result<Reply, Status> {
        let labels = MethodLabels::unary(ctx.method());
        self.metrics.record_start(&labels);

        let result = next.run(ctx, request).await;

        let code = result.as_ref().map_or_else(Status::code, |_| Code::Ok);
        self.metrics
            .record_finish(labels, code, ctx.elapsed().as_secs_f64());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Chain, testing::CountingHandler, testing::Ping};
    use super::*;
    use prometheus_client::encoding::text::encode;
    use tonic::Request;

    fn setup() -> (Registry, Arc<RpcMetrics>) {
        let mut registry = Registry::default();
        let metrics = Arc::new(RpcMetrics::new(&mut registry));
        (registry, metrics)
    }

    fn render(registry: &Registry) -> String {
        let mut buffer = String::new();
        encode(&mut buffer, registry).unwrap();
        buffer
    }

    fn handled(metrics: &RpcMetrics, code: &str) -> u64 {
        metrics
            .handled
            .get_or_create(&HandledLabels {
                grpc_type: "unary".to_string(),
                grpc_service: "test.Svc".to_string(),
                grpc_method: "Ping".to_string(),
                grpc_code: code.to_string(),
            })
            .get()
    }

    #[tokio::test]
    async fn counts_successful_calls() {
        let (registry, metrics) = setup();
        let chain = Chain::new(vec![Arc::new(MetricsInterceptor::new(metrics.clone()))]);
        let pipeline = chain.compose(Arc::new(CountingHandler::default()));

        pipeline
            .unary::<_, &'static str>("/test.Svc/Ping", Request::new(Ping { valid: true, host: "h" }))
            .await
            .unwrap();

        let labels = MethodLabels::unary(MethodInfo::new("/test.Svc/Ping"));
        assert_eq!(metrics.started.get_or_create(&labels).get(), 1);
        assert_eq!(metrics.msg_received.get_or_create(&labels).get(), 1);
        assert_eq!(metrics.msg_sent.get_or_create(&labels).get(), 1);
        assert_eq!(handled(&metrics, "OK"), 1);

        let text = render(&registry);
        assert!(text.contains("grpc_server_started_total"));
        assert!(text.contains("grpc_server_handling_seconds_bucket"));
        assert!(text.contains(r#"grpc_code="OK""#));
    }

    #[tokio::test]
    async fn failed_calls_are_labelled_with_their_code() {
        let (_registry, metrics) = setup();
        let chain = Chain::new(vec![Arc::new(MetricsInterceptor::new(metrics.clone()))]);
        let pipeline = chain.compose(Arc::new(CountingHandler::failing(Code::Unavailable)));

        let status = pipeline
            .unary::<_, &'static str>("/test.Svc/Ping", Request::new(Ping { valid: true, host: "h" }))
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(handled(&metrics, "Unavailable"), 1);
        assert_eq!(handled(&metrics, "OK"), 0);
        let labels = MethodLabels::unary(MethodInfo::new("/test.Svc/Ping"));
        assert_eq!(metrics.msg_sent.get_or_create(&labels).get(), 0);
    }
}
