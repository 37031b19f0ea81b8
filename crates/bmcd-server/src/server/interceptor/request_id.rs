use super::{CallRequest, Interceptor, Next, Reply};
use crate::server::context::{CallContext, REQUEST_ID_KEY, RequestId};
use tonic::Status;

/// Assigns every call a correlation identifier and echoes it back.
///
/// An acceptable inbound `x-request-id` is reused verbatim; anything else
/// (missing, empty, non-ASCII or over the length limit) is replaced with a
/// freshly generated one. The identifier is written to the call context, to
/// the inbound metadata the handler sees, and to the outbound metadata of the
/// response or error status.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestIdInterceptor;

fn inbound_request_id(request: &CallRequest) -> Option<RequestId> {
    let value = request.metadata().get(REQUEST_ID_KEY)?.to_str().ok()?;
    RequestId::from_inbound(value)
}

#[tonic::async_trait]
impl Interceptor for RequestIdInterceptor {
    fn name(&self) -> &'static str {
        "request_id"
    }

    async fn intercept(
        &self,
        ctx: &mut CallContext,
        mut request: CallRequest,
        next: Next<'_>,
    ) -> Result<Reply, Status> {
        let id = inbound_request_id(&request).unwrap_or_else(|| {
            let id = RequestId::generate();
            tracing::trace!(request_id = %id, "generated request id");
            id
        });
        let value = ctx.assign_request_id(id)?.to_metadata()?;
        request.metadata_mut().insert(REQUEST_ID_KEY, value.clone());

        match next.run(ctx, request).await {
            Ok(mut reply) => {
                reply.metadata_mut().insert(REQUEST_ID_KEY, value);
                Ok(reply)
            }
            Err(mut status) => {
                status.metadata_mut().insert(REQUEST_ID_KEY, value);
                Err(status)
            }
        }
    }
}
