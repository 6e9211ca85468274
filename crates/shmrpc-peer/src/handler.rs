use std::future::Future;
use std::sync::Arc;

use futures_core::future::BoxFuture;
use shmrpc_codec::{Serializer, Strategy};
use shmrpc_memory::{BufferPool, ConstBuffer, SharedMemory};
use shmrpc_transport::{self as raw, HandlerError, MalformedRequest};

use crate::Message;

/// Serves the typed calls of one connection.
pub type Handler<Req, Resp> =
    Arc<dyn Fn(Req) -> BoxFuture<'static, Result<Resp, HandlerError>> + Send + Sync>;

/// Builds the typed handler of each accepted connection from its
/// `(input_memory, output_memory)` pair.
pub type HandlerFactory<Req, Resp> =
    Arc<dyn Fn(&Arc<SharedMemory>, &Arc<SharedMemory>) -> Handler<Req, Resp> + Send + Sync>;

/// Box an async function as a typed [`Handler`].
pub fn handler_fn<Req, Resp, F, Fut>(f: F) -> Handler<Req, Resp>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
{
    Arc::new(move |request| -> BoxFuture<'static, Result<Resp, HandlerError>> {
        Box::pin(f(request))
    })
}

/// Wrap a closure as a typed [`HandlerFactory`].
pub fn handler_factory<Req, Resp, F>(f: F) -> HandlerFactory<Req, Resp>
where
    F: Fn(&Arc<SharedMemory>, &Arc<SharedMemory>) -> Handler<Req, Resp> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Factory for connections that answer every request with the same function.
pub fn service_fn<Req: 'static, Resp: 'static, F, Fut>(f: F) -> HandlerFactory<Req, Resp>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
{
    let handler = handler_fn(f);
    Arc::new(move |_input: &Arc<SharedMemory>, _output: &Arc<SharedMemory>| {
        handler.clone()
    })
}

/// Turn a typed factory into the raw transport's buffer-to-buffer factory.
///
/// Every accepted connection gets one serializer bound to its own memory.
pub(crate) fn adapt<Req, Resp>(
    strategy: Strategy,
    min_blob_size: usize,
    factory: HandlerFactory<Req, Resp>,
) -> raw::HandlerFactory
where
    Req: Message,
    Resp: Message,
{
    raw::handler_factory(move |input, output| {
        let serializer = Arc::new(Serializer::with_strategy(
            strategy,
            BufferPool::new(output.clone()),
            input.clone(),
            min_blob_size,
        ));
        let handler = factory(input, output);
        raw::handler_fn(move |request| handle(serializer.clone(), handler.clone(), request))
    })
}

async fn handle<Req, Resp>(
    serializer: Arc<Serializer>,
    handler: Handler<Req, Resp>,
    request: ConstBuffer,
) -> Result<ConstBuffer, HandlerError>
where
    Req: Message,
    Resp: Message,
{
    let decoded = serializer.deserialize::<Req>(&request);
    drop(request);
    let request = decoded.map_err(|err| MalformedRequest(Box::new(err)))?;
    let response = handler(request).await?;
    Ok(serializer.serialize(&response)?)
}
