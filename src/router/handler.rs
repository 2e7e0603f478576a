//! Handler contract for locally routed requests.

use crate::error::ApiError;
use crate::facade::ResponseEnvelope;
use crate::router::context::RequestContext;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

/// What a handler produces: a response now, or one later.
pub enum Reply {
    Ready(Result<ResponseEnvelope, ApiError>),
    Deferred(BoxFuture<'static, Result<ResponseEnvelope, ApiError>>),
}

impl Reply {
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<ResponseEnvelope, ApiError>> + Send + 'static,
    {
        Reply::Deferred(Box::pin(future))
    }

    pub fn failed(error: ApiError) -> Self {
        Reply::Ready(Err(error))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Reply::Deferred(_))
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Reply::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<ResponseEnvelope> for Reply {
    fn from(envelope: ResponseEnvelope) -> Self {
        Reply::Ready(Ok(envelope))
    }
}

impl From<Result<ResponseEnvelope, ApiError>> for Reply {
    fn from(result: Result<ResponseEnvelope, ApiError>) -> Self {
        Reply::Ready(result)
    }
}

impl From<String> for Reply {
    fn from(body: String) -> Self {
        Reply::Ready(Ok(ResponseEnvelope::Raw(body)))
    }
}

impl From<&str> for Reply {
    fn from(body: &str) -> Self {
        Reply::Ready(Ok(ResponseEnvelope::Raw(body.to_string())))
    }
}

pub trait Handler: Send + Sync {
    fn call(&self, ctx: RequestContext) -> Reply;
}

impl<F> Handler for F
where
    F: Fn(RequestContext) -> Reply + Send + Sync,
{
    fn call(&self, ctx: RequestContext) -> Reply {
        self(ctx)
    }
}
