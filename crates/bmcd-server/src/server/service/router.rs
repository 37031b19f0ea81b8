//! Terminal handler dispatching calls to per-method business logic.

use crate::server::{
    context::CallContext,
    interceptor::{CallRequest, Handler, Message, Reply},
};
use bmcd_core::Error;
use core::{any::Any, future::Future};
use futures::{FutureExt, future::BoxFuture};
use std::{collections::HashMap, sync::Arc};
use tonic::{Request, Response, Status};

type RouteFuture = BoxFuture<'static, Result<Reply, Status>>;
type Route = Arc<dyn Fn(CallRequest) -> Result<RouteFuture, Status> + Send + Sync>;

/// Maps full method paths to typed async handlers.
///
/// Methods without a registered route answer `Unimplemented`. The router sits
/// beneath the interceptor chain, so routed handlers only ever see requests
/// that have passed validation.
#[derive(Clone, Default)]
pub struct MethodRouter {
    routes: HashMap<&'static str, Route>,
}

impl MethodRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method`, replacing any previous route.
    #[must_use]
    pub fn route<Req, Resp, F, Fut>(mut self, method: &'static str, handler: F) -> Self
    where
        Req: Message,
        Resp: Send + 'static,
        F: Fn(Request<Req>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<Resp>, Status>> + Send + 'static,
    {
        let route: Route = Arc::new(move |request: CallRequest| -> Result<RouteFuture, Status> {
            let (metadata, extensions, message) = request.into_parts();
            let message = message
                .into_any()
                .downcast::<Req>()
                .map_err(|_| Error::UnexpectedMessage {
                    method: method.to_string(),
                })?;
            let call = handler(Request::from_parts(metadata, extensions, *message));
            Ok(call
                .map(|result| {
                    result.map(|response| response.map(|message| Box::new(message) as Box<dyn Any + Send>))
                })
                .boxed())
        });
        self.routes.insert(method, route);
        self
    }
}

#[tonic::async_trait]
impl Handler for MethodRouter {
    async fn call(&self, ctx: &mut CallContext, request: CallRequest) -> Result<Reply, Status> {
        let method = ctx.method().path();
        let Some(route) = self.routes.get(method) else {
            return Err(Error::Unimplemented {
                method: method.to_string(),
            }
            .into());
        };
        route(request)?.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{context::MethodInfo, interceptor::Chain};
    use bmcd_core::types::{DeviceResponse, PowerRequest, PowerResponse, methods};
    use tonic::Code;

    fn erased(message: PowerRequest) -> CallRequest {
        Request::new(Box::new(message) as Box<dyn Message>)
    }

    #[tokio::test]
    async fn dispatches_to_registered_route() {
        let router = MethodRouter::new().route(methods::POWER, |_req: Request<PowerRequest>| async {
            Ok::<_, Status>(Response::new(PowerResponse {
                task_id: "task-1".to_string(),
            }))
        });
        let mut ctx = CallContext::new(MethodInfo::new(methods::POWER));

        let reply = router
            .call(&mut ctx, erased(PowerRequest::default()))
            .await
            .unwrap();

        let response = reply.into_inner().downcast::<PowerResponse>().unwrap();
        assert_eq!(response.task_id, "task-1");
    }

    #[tokio::test]
    async fn unregistered_method_is_unimplemented() {
        let router = MethodRouter::new();
        let mut ctx = CallContext::new(MethodInfo::new(methods::BOOT_DEVICE));

        let status = router
            .call(&mut ctx, erased(PowerRequest::default()))
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::Unimplemented);
    }

    #[tokio::test]
    async fn route_replying_with_another_message_is_internal() {
        let router = MethodRouter::new().route(methods::POWER, |_req: Request<PowerRequest>| async {
            Ok::<_, Status>(Response::new(DeviceResponse {
                task_id: "task-1".to_string(),
            }))
        });
        let pipeline = Chain::default().compose(Arc::new(router));

        let status = pipeline
            .unary::<_, PowerResponse>(methods::POWER, Request::new(PowerRequest::default()))
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::Internal);
    }
}
