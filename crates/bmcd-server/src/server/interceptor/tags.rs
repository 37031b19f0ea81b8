use super::{CallRequest, Interceptor, Next, Reply};
use crate::server::context::CallContext;
use tonic::Status;

pub const TAG_SERVICE: &str = "grpc.service";
pub const TAG_METHOD: &str = "grpc.method";
pub const TAG_PEER: &str = "peer.address";

/// Prefix for tags derived from request message fields.
pub const TAG_REQUEST_PREFIX: &str = "grpc.request.";

pub const TAG_REQUEST_HOST: &str = "grpc.request.host";
pub const TAG_REQUEST_POWER_ACTION: &str = "grpc.request.power_action";
pub const TAG_REQUEST_BOOT_DEVICE: &str = "grpc.request.boot_device";

/// Derives structural tags for the call: service, method, peer address and
/// the request message's exposed fields.
#[derive(Clone, Copy, Debug, Default)]
pub struct TagsInterceptor;

#[tonic::async_trait]
impl Interceptor for TagsInterceptor {
    fn name(&self) -> &'static str {
        "tags"
    }

    async fn intercept(
        &self,
        ctx: &mut CallContext,
        request: CallRequest,
        next: Next<'_>,
    ) -> Result<Reply, Status> {
        let method = ctx.method();
        let tags = ctx.tags_mut();
        tags.insert(TAG_SERVICE, method.service());
        tags.insert(TAG_METHOD, method.method());
        if let Some(peer) = request.remote_addr() {
            tags.insert(TAG_PEER, peer.to_string());
        }
        for (field, value) in request.get_ref().request_fields() {
            tags.insert(format!("{TAG_REQUEST_PREFIX}{field}"), value);
        }

        next.run(ctx, request).await
    }
}
