//! # Call Adapters
//!
//! A call adapter invokes a statically typed handler (or pipeline stage) method through a
//! uniform, type-erased signature. Each adapter wraps a function monomorphized for one
//! capability: it recovers the exact handler, message and response types at a single
//! internal boundary, so the dispatcher never needs them again.
//!
//! The monomorphized entry points are produced when a handler declares a capability through
//! [`HandlerInstance::builder`](crate::registry::HandlerInstance::builder): that generic call
//! is where the concrete types are known. [`InvokerCompiler`] turns an entry point into a
//! shared adapter once per capability and caches it for the lifetime of the dispatcher, so
//! every later dispatch is a direct call with no type inspection.

use crate::dispatch::cache::TypeKeyedCache;
use crate::dispatch::capability::{Capability, CapabilityKey};
use crate::dispatch::pipeline::Next;
use crate::error::{DispatchError, DispatchResult, HandlerResult};
use crate::handlers::{
    CommandHandler, CommandPipeline, EventHandler, EventPipeline, RequestHandler, RequestPipeline,
};
use crate::message::{BoxedResponse, Message, Payload, Response};
use crate::registry::HandlerInstance;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Erased handler call: `(handler view, message, token) -> boxed response`
pub type HandlerFn = for<'a> fn(
    &'a Payload,
    &'a Payload,
    CancellationToken,
) -> BoxFuture<'a, HandlerResult<BoxedResponse>>;

/// Erased stage call: `(stage view, concrete handler, message, next, token) -> boxed response`
pub type StageFn = for<'a> fn(
    &'a Payload,
    &'a Payload,
    &'a Payload,
    Next<'a, BoxedResponse>,
    CancellationToken,
) -> BoxFuture<'a, HandlerResult<BoxedResponse>>;

/// Monomorphized call entry point attached to a capability view
#[derive(Clone, Copy)]
pub enum EntryPoint {
    Handler(HandlerFn),
    Stage(StageFn),
}

impl EntryPoint {
    fn shape(&self) -> &'static str {
        match self {
            EntryPoint::Handler(_) => "handler",
            EntryPoint::Stage(_) => "pipeline stage",
        }
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryPoint({})", self.shape())
    }
}

/// Compiled adapter for a handler capability
pub struct HandlerAdapter {
    capability: Capability,
    invoke: HandlerFn,
}

impl HandlerAdapter {
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn invoke_fn(&self) -> HandlerFn {
        self.invoke
    }

    /// Invoke the handler directly
    pub fn invoke<'a>(
        &self,
        handler: &'a Payload,
        message: &'a Payload,
        token: CancellationToken,
    ) -> BoxFuture<'a, HandlerResult<BoxedResponse>> {
        (self.invoke)(handler, message, token)
    }
}

/// Compiled adapter for a pipeline stage capability
pub struct StageAdapter {
    capability: Capability,
    invoke: StageFn,
}

impl StageAdapter {
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn invoke_fn(&self) -> StageFn {
        self.invoke
    }
}

/// Compiles and caches call adapters per capability.
pub struct InvokerCompiler {
    handlers: TypeKeyedCache<CapabilityKey, Arc<HandlerAdapter>>,
    stages: TypeKeyedCache<CapabilityKey, Arc<StageAdapter>>,
    single_flight: bool,
}

impl InvokerCompiler {
    pub fn new(single_flight: bool) -> Self {
        Self {
            handlers: TypeKeyedCache::new(),
            stages: TypeKeyedCache::new(),
            single_flight,
        }
    }

    /// Adapter invoking `capability` on handlers such as `instance`
    pub fn compile_handler(
        &self,
        capability: &Capability,
        instance: &HandlerInstance,
    ) -> DispatchResult<Arc<HandlerAdapter>> {
        if let Some(adapter) = self.handlers.get(capability.key()) {
            return Ok(adapter);
        }

        let build = |_: &CapabilityKey| -> DispatchResult<Arc<HandlerAdapter>> {
            if capability.key().is_pipeline() {
                return Err(compilation_failure(capability, "capability names a pipeline stage"));
            }
            match entry_point(capability, instance)? {
                EntryPoint::Handler(invoke) => {
                    debug!(capability = %capability, "Compiled handler adapter");
                    Ok(Arc::new(HandlerAdapter {
                        capability: capability.clone(),
                        invoke,
                    }))
                }
                other => Err(compilation_failure(
                    capability,
                    &format!("expected a handler method, found a {} method", other.shape()),
                )),
            }
        };

        if self.single_flight {
            self.handlers.get_or_try_create_once(*capability.key(), build)
        } else {
            self.handlers.get_or_try_create(*capability.key(), build)
        }
    }

    /// Adapter invoking pipeline `capability` on stages such as `instance`
    pub fn compile_stage(
        &self,
        capability: &Capability,
        instance: &HandlerInstance,
    ) -> DispatchResult<Arc<StageAdapter>> {
        if let Some(adapter) = self.stages.get(capability.key()) {
            return Ok(adapter);
        }

        let build = |_: &CapabilityKey| -> DispatchResult<Arc<StageAdapter>> {
            if !capability.key().is_pipeline() {
                return Err(compilation_failure(capability, "capability names a handler"));
            }
            match entry_point(capability, instance)? {
                EntryPoint::Stage(invoke) => {
                    debug!(capability = %capability, "Compiled pipeline stage adapter");
                    Ok(Arc::new(StageAdapter {
                        capability: capability.clone(),
                        invoke,
                    }))
                }
                other => Err(compilation_failure(
                    capability,
                    &format!("expected a pipeline stage method, found a {} method", other.shape()),
                )),
            }
        };

        if self.single_flight {
            self.stages.get_or_try_create_once(*capability.key(), build)
        } else {
            self.stages.get_or_try_create(*capability.key(), build)
        }
    }

    pub fn compiled_handlers(&self) -> usize {
        self.handlers.len()
    }

    pub fn compiled_stages(&self) -> usize {
        self.stages.len()
    }
}

fn entry_point(capability: &Capability, instance: &HandlerInstance) -> DispatchResult<EntryPoint> {
    let view = instance.view(capability.key()).ok_or_else(|| {
        compilation_failure(
            capability,
            &format!("{} does not expose this capability", instance.type_key()),
        )
    })?;
    if view.shape() != capability.key() {
        return Err(compilation_failure(
            capability,
            &format!("view was built for {}", Capability::new(*view.shape())),
        ));
    }
    view.entry_point().ok_or_else(|| {
        compilation_failure(capability, "capability has no callable method shape")
    })
}

fn compilation_failure(capability: &Capability, reason: &str) -> DispatchError {
    DispatchError::CompilationFailure {
        capability: capability.clone(),
        reason: reason.to_string(),
    }
}

fn downcast<'a, T: 'static>(value: &'a Payload, context: &'static str) -> HandlerResult<&'a T> {
    value
        .downcast_ref::<T>()
        .ok_or_else(|| DispatchError::type_mismatch::<T>(context).into())
}

fn unit_response(_: ()) -> HandlerResult<BoxedResponse> {
    Ok(Box::new(()))
}

fn discard_response(_: BoxedResponse) -> HandlerResult<()> {
    Ok(())
}

fn unbox_response<R: Response>(response: BoxedResponse) -> HandlerResult<R> {
    response
        .downcast::<R>()
        .map(|response| *response)
        .map_err(|_| DispatchError::type_mismatch::<R>("pipeline response").into())
}

fn box_response<R: Response>(response: R) -> HandlerResult<BoxedResponse> {
    Ok(Box::new(response))
}

pub(crate) fn invoke_command<'a, C: Message>(
    handler: &'a Payload,
    message: &'a Payload,
    token: CancellationToken,
) -> BoxFuture<'a, HandlerResult<BoxedResponse>> {
    async move {
        let handler = downcast::<Arc<dyn CommandHandler<C>>>(handler, "command handler")?;
        let command = downcast::<C>(message, "command")?;
        handler.handle(command, token).await.and_then(unit_response)
    }
    .boxed()
}

pub(crate) fn invoke_event<'a, E: Message>(
    handler: &'a Payload,
    message: &'a Payload,
    token: CancellationToken,
) -> BoxFuture<'a, HandlerResult<BoxedResponse>> {
    async move {
        let handler = downcast::<Arc<dyn EventHandler<E>>>(handler, "event handler")?;
        let event = downcast::<E>(message, "event")?;
        handler.handle(event, token).await.and_then(unit_response)
    }
    .boxed()
}

pub(crate) fn invoke_request<'a, Q: Message, R: Response>(
    handler: &'a Payload,
    message: &'a Payload,
    token: CancellationToken,
) -> BoxFuture<'a, HandlerResult<BoxedResponse>> {
    async move {
        let handler = downcast::<Arc<dyn RequestHandler<Q, R>>>(handler, "request handler")?;
        let request = downcast::<Q>(message, "request")?;
        handler.handle(request, token).await.and_then(box_response)
    }
    .boxed()
}

pub(crate) fn invoke_command_stage<'a, H, C>(
    stage: &'a Payload,
    handler: &'a Payload,
    message: &'a Payload,
    next: Next<'a, BoxedResponse>,
    token: CancellationToken,
) -> BoxFuture<'a, HandlerResult<BoxedResponse>>
where
    H: CommandHandler<C>,
    C: Message,
{
    async move {
        let stage = downcast::<Arc<dyn CommandPipeline<H, C>>>(stage, "command pipeline stage")?;
        let handler = downcast::<H>(handler, "command handler")?;
        let command = downcast::<C>(message, "command")?;
        stage
            .handle(handler, command, next.map(discard_response), token)
            .await
            .and_then(unit_response)
    }
    .boxed()
}

pub(crate) fn invoke_event_stage<'a, H, E>(
    stage: &'a Payload,
    handler: &'a Payload,
    message: &'a Payload,
    next: Next<'a, BoxedResponse>,
    token: CancellationToken,
) -> BoxFuture<'a, HandlerResult<BoxedResponse>>
where
    H: EventHandler<E>,
    E: Message,
{
    async move {
        let stage = downcast::<Arc<dyn EventPipeline<H, E>>>(stage, "event pipeline stage")?;
        let handler = downcast::<H>(handler, "event handler")?;
        let event = downcast::<E>(message, "event")?;
        stage
            .handle(handler, event, next.map(discard_response), token)
            .await
            .and_then(unit_response)
    }
    .boxed()
}

pub(crate) fn invoke_request_stage<'a, H, Q, R>(
    stage: &'a Payload,
    handler: &'a Payload,
    message: &'a Payload,
    next: Next<'a, BoxedResponse>,
    token: CancellationToken,
) -> BoxFuture<'a, HandlerResult<BoxedResponse>>
where
    H: RequestHandler<Q, R>,
    Q: Message,
    R: Response,
{
    async move {
        let stage =
            downcast::<Arc<dyn RequestPipeline<H, Q, R>>>(stage, "request pipeline stage")?;
        let handler = downcast::<H>(handler, "request handler")?;
        let request = downcast::<Q>(message, "request")?;
        stage
            .handle(handler, request, next.map(unbox_response::<R>), token)
            .await
            .and_then(box_response)
    }
    .boxed()
}
