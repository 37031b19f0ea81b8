//! The interceptor chain wrapped around every unary call.
//!
//! An [`Interceptor`] sees a call on its way in and its result on the way
//! out. A [`Chain`] is an ordered list of interceptors; [`Chain::compose`]
//! folds it around a terminal [`Handler`] once, at startup, producing a
//! [`Pipeline`]. Calling the pipeline is equivalent to calling
//! `interceptors[0]`, which calls `interceptors[1]`, ..., which calls the
//! terminal handler, and then unwinding in reverse.
//!
//! ## Standard order
//!
//! [`Chain::standard`] builds the order every production call goes through:
//!
//! 1. [`MetricsInterceptor`] - outermost, times and counts everything below.
//! 2. [`TagsInterceptor`] - service, method, peer and request-field tags.
//! 3. [`RequestIdInterceptor`] - assigns and echoes `x-request-id`.
//! 4. [`LoggingInterceptor`] - one record per call, keyed by `requestID`.
//! 5. [`ValidationInterceptor`] - innermost, rejects malformed payloads
//!    before the handler runs.
//!
//! Interceptors never swallow errors. They may annotate the call and return
//! the error (or a more specific one), nothing else.

pub mod logging;
pub mod metrics;
pub mod request_id;
pub mod tags;
pub mod validation;

pub use logging::{CallLog, CallRecord, LoggingInterceptor, TracingCallLog};
pub use metrics::{MetricsInterceptor, RpcMetrics};
pub use request_id::RequestIdInterceptor;
pub use tags::TagsInterceptor;
pub use validation::ValidationInterceptor;

use crate::server::context::{CallContext, MethodInfo};
use bmcd_core::{
    Error,
    validate::{RequestFields, Validate},
};
use core::{any::Any, fmt};
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// A request message as seen by the chain, with its concrete type erased.
///
/// Implemented for every `Validate + RequestFields` message, so interceptors
/// can check and tag payloads without knowing the method being called.
pub trait Message: Validate + RequestFields + fmt::Debug + Send + Sync + 'static {
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T> Message for T
where
    T: Validate + RequestFields + fmt::Debug + Send + Sync + 'static,
{
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Inbound request flowing through the chain.
pub type CallRequest = Request<Box<dyn Message>>;

/// Outbound response flowing back through the chain.
pub type Reply = Response<Box<dyn Any + Send>>;

/// Anything that can answer a call: the business handler, or a chain stage
/// wrapping it.
#[tonic::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, ctx: &mut CallContext, request: CallRequest) -> Result<Reply, Status>;
}

/// Cross-cutting logic wrapped around a [`Handler`].
#[tonic::async_trait]
pub trait Interceptor: Send + Sync + 'static {
    /// Short name used in logs and tests.
    fn name(&self) -> &'static str;

    /// Observes or gates a call. Continue with `next.run(ctx, request)`, or
    /// return early to short-circuit everything below this interceptor.
    async fn intercept(
        &self,
        ctx: &mut CallContext,
        request: CallRequest,
        next: Next<'_>,
    ) -> Result<Reply, Status>;
}

/// The remainder of the chain below the current interceptor.
pub struct Next<'a> {
    inner: &'a dyn Handler,
}

impl Next<'_> {
    pub async fn run(self, ctx: &mut CallContext, request: CallRequest) -> Result<Reply, Status> {
        self.inner.call(ctx, request).await
    }
}

/// One folded stage: an interceptor and everything beneath it.
struct Stage {
    interceptor: Arc<dyn Interceptor>,
    inner: Arc<dyn Handler>,
}

#[tonic::async_trait]
impl Handler for Stage {
    async fn call(&self, ctx: &mut CallContext, request: CallRequest) -> Result<Reply, Status> {
        let next = Next {
            inner: self.inner.as_ref(),
        };
        self.interceptor.intercept(ctx, request, next).await
    }
}

/// Innermost stage: holds the terminal handler to the reply type the caller
/// declared, so a mismatch unwinds through every interceptor as `Internal`.
struct ReplyCheck {
    inner: Arc<dyn Handler>,
}

#[tonic::async_trait]
impl Handler for ReplyCheck {
    async fn call(&self, ctx: &mut CallContext, request: CallRequest) -> Result<Reply, Status> {
        let reply = self.inner.call(ctx, request).await?;
        let message: &(dyn Any + Send) = &**reply.get_ref();
        if !ctx.accepts_reply(message.type_id()) {
            return Err(Error::UnexpectedMessage {
                method: ctx.method().path().to_string(),
            }
            .into());
        }
        Ok(reply)
    }
}

/// Canonical name of a gRPC status code, as used in logs and metric labels.
pub const fn code_name(code: tonic::Code) -> &'static str {
    use tonic::Code;
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}

/// An ordered list of interceptors, outermost first.
#[derive(Clone, Default)]
pub struct Chain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Chain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { interceptors }
    }

    /// The fixed production order: metrics, tags, request id, logging,
    /// validation.
    pub fn standard(metrics: Arc<RpcMetrics>, log: Arc<dyn CallLog>) -> Self {
        Self::new(vec![
            Arc::new(MetricsInterceptor::new(metrics)),
            Arc::new(TagsInterceptor),
            Arc::new(RequestIdInterceptor),
            Arc::new(LoggingInterceptor::new(log)),
            Arc::new(ValidationInterceptor),
        ])
    }

    /// Names of the interceptors, outermost first.
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Folds the chain around `terminal`, innermost interceptor first.
    pub fn compose(&self, terminal: Arc<dyn Handler>) -> Pipeline {
        let terminal: Arc<dyn Handler> = Arc::new(ReplyCheck { inner: terminal });
        let handler = self
            .interceptors
            .iter()
            .rev()
            .fold(terminal, |inner, interceptor| {
                Arc::new(Stage {
                    interceptor: Arc::clone(interceptor),
                    inner,
                }) as Arc<dyn Handler>
            });
        Pipeline { handler }
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// A chain composed around its terminal handler, ready to serve calls.
#[derive(Clone)]
pub struct Pipeline {
    handler: Arc<dyn Handler>,
}

impl Pipeline {
    /// Runs a typed unary call through the pipeline.
    ///
    /// The request message is erased on the way in and the response message
    /// restored on the way out. A handler answering with the wrong message
    /// type yields `Internal`, which every interceptor observes.
    pub async fn unary<Req, Resp>(
        &self,
        method: &'static str,
        request: Request<Req>,
    ) -> Result<Response<Resp>, Status>
    where
        Req: Message,
        Resp: Send + 'static,
    {
        let mut ctx = CallContext::new(MethodInfo::new(method));
        ctx.expect_reply::<Resp>();
        let request = request.map(|message| Box::new(message) as Box<dyn Message>);
        let reply = self.handler.call(&mut ctx, request).await?;

        let (metadata, message, extensions) = reply.into_parts();
        let message = message.downcast::<Resp>().map_err(|_| Error::UnexpectedMessage {
            method: method.to_string(),
        })?;
        Ok(Response::from_parts(metadata, *message, extensions))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{CountingHandler, Ping};
    use super::*;
    use parking_lot::Mutex;

    /// Records entry and exit order into a shared trace.
    struct Recorder {
        name: &'static str,
        trace: Arc<Mutex<Vec<String>>>,
    }

    #[tonic::async_trait]
    impl Interceptor for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn intercept(
            &self,
            ctx: &mut CallContext,
            request: CallRequest,
            next: Next<'_>,
        ) -> Result<Reply, Status> {
            self.trace.lock().push(format!("enter {}", self.name));
            let result = next.run(ctx, request).await;
            self.trace.lock().push(format!("exit {}", self.name));
            result
        }
    }

    struct Reject;

    #[tonic::async_trait]
    impl Interceptor for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        async fn intercept(
            &self,
            _ctx: &mut CallContext,
            _request: CallRequest,
            _next: Next<'_>,
        ) -> Result<Reply, Status> {
            Err(Status::permission_denied("nope"))
        }
    }

    fn recorder(name: &'static str, trace: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Interceptor> {
        Arc::new(Recorder {
            name,
            trace: Arc::clone(trace),
        })
    }

    #[tokio::test]
    async fn calls_interceptors_in_order_and_unwinds_in_reverse() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(CountingHandler::default());
        let chain = Chain::new(vec![
            recorder("a", &trace),
            recorder("b", &trace),
            recorder("c", &trace),
        ]);
        let pipeline = chain.compose(handler.clone());

        let reply: Response<&'static str> = pipeline
            .unary("/test.Svc/Ping", Request::new(Ping { valid: true, host: "h" }))
            .await
            .unwrap();

        assert_eq!(*reply.get_ref(), "pong");
        assert_eq!(handler.count(), 1);
        assert_eq!(
            *trace.lock(),
            ["enter a", "enter b", "enter c", "exit c", "exit b", "exit a"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_stages_but_outer_ones_unwind() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(CountingHandler::default());
        let chain = Chain::new(vec![
            recorder("outer", &trace),
            Arc::new(Reject),
            recorder("inner", &trace),
        ]);
        let pipeline = chain.compose(handler.clone());

        let status = pipeline
            .unary::<_, &'static str>("/test.Svc/Ping", Request::new(Ping { valid: true, host: "h" }))
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::PermissionDenied);
        assert_eq!(handler.count(), 0);
        assert_eq!(*trace.lock(), ["enter outer", "exit outer"]);
    }

    #[tokio::test]
    async fn wrong_response_type_is_internal() {
        let pipeline = Chain::default().compose(Arc::new(CountingHandler::default()));

        let status = pipeline
            .unary::<_, u64>("/test.Svc/Ping", Request::new(Ping { valid: true, host: "h" }))
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::Internal);
    }

    mod standard {
        use super::super::logging::testing::MemoryCallLog;
        use super::super::metrics::HandledLabels;
        use super::*;
        use crate::server::context::REQUEST_ID_KEY;
        use prometheus_client::registry::Registry;

        struct Fixture {
            pipeline: Pipeline,
            handler: Arc<CountingHandler>,
            log: Arc<MemoryCallLog>,
            metrics: Arc<RpcMetrics>,
        }

        fn fixture() -> Fixture {
            let mut registry = Registry::default();
            let metrics = Arc::new(RpcMetrics::new(&mut registry));
            let log = Arc::new(MemoryCallLog::default());
            let handler = Arc::new(CountingHandler::default());
            let pipeline = Chain::standard(metrics.clone(), log.clone()).compose(handler.clone());
            Fixture {
                pipeline,
                handler,
                log,
                metrics,
            }
        }

        #[tokio::test]
        async fn valid_call_with_inbound_id() {
            let f = fixture();
            let mut request = Request::new(Ping { valid: true, host: "10.0.0.7" });
            request
                .metadata_mut()
                .insert(REQUEST_ID_KEY, "abc-123".parse().unwrap());

            let reply = f
                .pipeline
                .unary::<_, &'static str>("/bmcd.v1.Machine/Power", request)
                .await
                .unwrap();

            assert_eq!(
                reply.metadata().get(REQUEST_ID_KEY).unwrap().to_str().unwrap(),
                "abc-123"
            );
            assert_eq!(f.handler.count(), 1);

            let records = f.log.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].request_id, "abc-123");
            assert_eq!(records[0].tags.get("grpc.method"), Some("Power"));
            assert_eq!(records[0].tags.get("grpc.request.host"), Some("10.0.0.7"));
        }

        #[tokio::test]
        async fn invalid_call_without_id_is_logged_and_measured() {
            let f = fixture();

            let status = f
                .pipeline
                .unary::<_, &'static str>(
                    "/bmcd.v1.Machine/Power",
                    Request::new(Ping { valid: false, host: "" }),
                )
                .await
                .unwrap_err();

            assert_eq!(status.code(), tonic::Code::InvalidArgument);
            assert_eq!(f.handler.count(), 0);

            let records = f.log.records();
            assert_eq!(records.len(), 1);
            assert!(!records[0].request_id.is_empty());
            assert_eq!(records[0].code, tonic::Code::InvalidArgument);
            assert_eq!(
                status.metadata().get(REQUEST_ID_KEY).unwrap().to_str().unwrap(),
                records[0].request_id
            );

            let handled = f
                .metrics
                .handled
                .get_or_create(&HandledLabels {
                    grpc_type: "unary".to_string(),
                    grpc_service: "bmcd.v1.Machine".to_string(),
                    grpc_method: "Power".to_string(),
                    grpc_code: "InvalidArgument".to_string(),
                })
                .get();
            assert_eq!(handled, 1);
        }

        #[tokio::test]
        async fn handler_error_is_logged_once() {
            let mut registry = Registry::default();
            let metrics = Arc::new(RpcMetrics::new(&mut registry));
            let log = Arc::new(MemoryCallLog::default());
            let handler = Arc::new(CountingHandler::failing(tonic::Code::Unavailable));
            let pipeline = Chain::standard(metrics, log.clone()).compose(handler.clone());

            let status = pipeline
                .unary::<_, &'static str>(
                    "/bmcd.v1.Machine/Power",
                    Request::new(Ping { valid: true, host: "h" }),
                )
                .await
                .unwrap_err();

            assert_eq!(status.code(), tonic::Code::Unavailable);
            assert_eq!(handler.count(), 1);
            assert_eq!(log.records().len(), 1);
        }

        #[tokio::test]
        async fn wrong_reply_type_is_seen_by_every_stage() {
            let f = fixture();

            let status = f
                .pipeline
                .unary::<_, u64>("/bmcd.v1.Machine/Power", Request::new(Ping { valid: true, host: "h" }))
                .await
                .unwrap_err();

            assert_eq!(status.code(), tonic::Code::Internal);
            assert_eq!(f.handler.count(), 1);

            let records = f.log.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].code, tonic::Code::Internal);
            assert_eq!(
                status.metadata().get(REQUEST_ID_KEY).unwrap().to_str().unwrap(),
                records[0].request_id
            );

            let handled = |code: &str| {
                f.metrics
                    .handled
                    .get_or_create(&HandledLabels {
                        grpc_type: "unary".to_string(),
                        grpc_service: "bmcd.v1.Machine".to_string(),
                        grpc_method: "Power".to_string(),
                        grpc_code: code.to_string(),
                    })
                    .get()
            };
            assert_eq!(handled("Internal"), 1);
            assert_eq!(handled("OK"), 0);
        }
    }

    #[test]
    fn every_code_has_a_distinct_name() {
        let names: std::collections::HashSet<_> = (0..=16)
            .map(|code| code_name(tonic::Code::from_i32(code)))
            .collect();
        assert_eq!(names.len(), 17);
        assert_eq!(code_name(tonic::Code::Cancelled), "Canceled");
    }

    #[test]
    fn standard_chain_has_fixed_order() {
        let mut registry = prometheus_client::registry::Registry::default();
        let metrics = Arc::new(RpcMetrics::new(&mut registry));
        let chain = Chain::standard(metrics, Arc::new(TracingCallLog));

        assert_eq!(
            chain.names(),
            ["metrics", "tags", "request_id", "logging", "validation"]
        );
    }
}
