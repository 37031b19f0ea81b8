//! One structured log record per call.
//!
//! The record is handed to a [`CallLog`] sink chosen when the chain is built.
//! Production uses [`TracingCallLog`], which emits a `tracing` event whose
//! level follows the status code:
//!
//! | Level | Codes |
//! |-------|-------|
//! | INFO  | OK, Canceled, InvalidArgument, NotFound, AlreadyExists, Unauthenticated |
//! | WARN  | DeadlineExceeded, PermissionDenied, ResourceExhausted, FailedPrecondition, Aborted, OutOfRange, Unavailable |
//! | ERROR | Unknown, Unimplemented, Internal, DataLoss |
//!
//! Well-known tags (`peer.address`, `grpc.request.host`, ...) become fields of
//! their own. Any other tag lands in the `grpc.tags` map.

use super::tags::{
    TAG_METHOD, TAG_PEER, TAG_REQUEST_BOOT_DEVICE, TAG_REQUEST_HOST, TAG_REQUEST_POWER_ACTION,
    TAG_SERVICE,
};
use super::{CallRequest, Interceptor, Next, Reply, code_name};
use crate::server::context::{CallContext, MethodInfo, Tags};
use bmcd_core::Error;
use core::fmt;
use std::{sync::Arc, time::Duration};
use tonic::{Code, Status};
use tracing::Level;

/// Everything known about a finished call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord {
    pub request_id: String,
    pub method: MethodInfo,
    pub code: Code,
    pub elapsed: Duration,
    pub error: Option<String>,
    pub tags: Tags,
}

impl CallRecord {
    pub fn level(&self) -> Level {
        level_for(self.code)
    }

    pub fn message(&self) -> String {
        format!("finished unary call with code {}", code_name(self.code))
    }
}

/// Destination for call records.
pub trait CallLog: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`Error::CallLog`] if the record could not be written.
    fn write(&self, record: &CallRecord) -> Result<(), Error>;
}

pub const fn level_for(code: Code) -> Level {
    match code {
        Code::Ok
        | Code::Cancelled
        | Code::InvalidArgument
        | Code::NotFound
        | Code::AlreadyExists
        | Code::Unauthenticated => Level::INFO,
        Code::DeadlineExceeded
        | Code::PermissionDenied
        | Code::ResourceExhausted
        | Code::FailedPrecondition
        | Code::Aborted
        | Code::OutOfRange
        | Code::Unavailable => Level::WARN,
        Code::Unknown | Code::Unimplemented | Code::Internal | Code::DataLoss => Level::ERROR,
    }
}

/// Tags written as dedicated fields rather than into `grpc.tags`.
const FIELD_TAGS: [&str; 6] = [
    TAG_SERVICE,
    TAG_METHOD,
    TAG_PEER,
    TAG_REQUEST_HOST,
    TAG_REQUEST_POWER_ACTION,
    TAG_REQUEST_BOOT_DEVICE,
];

/// The tags without a dedicated field, rendered as a map.
struct ExtraTags<'a>(&'a Tags);

impl fmt::Debug for ExtraTags<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().filter(|(key, _)| !FIELD_TAGS.contains(key)))
            .finish()
    }
}

/// Writes call records as `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingCallLog;

macro_rules! emit_call_record {
    ($level:expr, $record:expr) => {{
        let record = $record;
        tracing::event!(
            $level,
            requestID = %record.request_id,
            grpc.service = record.method.service(),
            grpc.method = record.method.method(),
            grpc.code = code_name(record.code),
            grpc.time_ms = record.elapsed.as_secs_f64() * 1000.0,
            grpc.error = record.error.as_deref(),
            peer.address = record.tags.get(TAG_PEER),
            grpc.request.host = record.tags.get(TAG_REQUEST_HOST),
            grpc.request.power_action = record.tags.get(TAG_REQUEST_POWER_ACTION),
            grpc.request.boot_device = record.tags.get(TAG_REQUEST_BOOT_DEVICE),
            grpc.tags = ?ExtraTags(&record.tags),
            "{}",
            record.message()
        )
    }};
}

impl CallLog for TracingCallLog {
    fn write(&self, record: &CallRecord) -> Result<(), Error> {
        let level = record.level();
        if level == Level::ERROR {
            emit_call_record!(Level::ERROR, record);
        } else if level == Level::WARN {
            emit_call_record!(Level::WARN, record);
        } else {
            emit_call_record!(Level::INFO, record);
        }
        Ok(())
    }
}

/// Hands one [`CallRecord`] per call to the configured [`CallLog`].
///
/// Runs inside the request id interceptor, so every record carries the
/// call's identifier. The call's result is returned unchanged; a sink that
/// fails to take the record is reported as an `error` event instead.
#[derive(Clone)]
pub struct LoggingInterceptor {
    log: Arc<dyn CallLog>,
}

impl LoggingInterceptor {
    pub fn new(log: Arc<dyn CallLog>) -> Self {
        Self { log }
    }
}

#[tonic::async_trait]
impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn intercept(
        &self,
        ctx: &mut CallContext,
        request: CallRequest,
        next: Next<'_>,
    ) -> Result<Reply, Status> {
        let result = next.run(ctx, request).await;

        let (code, error) = match &result {
            Ok(_) => (Code::Ok, None),
            Err(status) => (status.code(), Some(status.message().to_string())),
        };
        let record = CallRecord {
            request_id: ctx.request_id().map(ToString::to_string).unwrap_or_default(),
            method: ctx.method(),
            code,
            elapsed: ctx.elapsed(),
            error,
            tags: ctx.tags().clone(),
        };
        if let Err(err) = self.log.write(&record) {
            tracing::error!(
                requestID = %record.request_id,
                grpc.code = code_name(record.code),
                error = %err,
                "failed to write call record"
            );
        }

        result
    }
}
