use super::{CallRequest, Interceptor, Next, Reply};
use crate::server::context::CallContext;
use bmcd_core::Error;
use tonic::Status;

/// Rejects structurally invalid requests with `InvalidArgument` before the
/// handler runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidationInterceptor;

#[tonic::async_trait]
impl Interceptor for ValidationInterceptor {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn intercept(
        &self,
        ctx: &mut CallContext,
        request: CallRequest,
        next: Next<'_>,
    ) -> Result<Reply, Status> {
        if let Err(violation) = request.get_ref().validate() {
            tracing::debug!(method = %ctx.method(), %violation, "rejecting invalid request");
            return Err(Error::from(violation).into());
        }
        next.run(ctx, request).await
    }
}
