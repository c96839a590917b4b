//! Messages, handlers and pipeline stages that record what ran into a shared trace.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::registry::{HandlerInstance, ServiceRegistry};
use relay_core::{
    CommandHandler, CommandPipeline, EventHandler, EventPipeline, HandlerResult, Next,
    RequestHandler, RequestPipeline,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub type Trace = Arc<Mutex<Vec<String>>>;

pub fn new_trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(trace: &Trace) -> Vec<String> {
    trace.lock().clone()
}

#[derive(Debug, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Debug, Error)]
#[error("shipment {order_id} failed")]
pub struct ShipmentFailed {
    pub order_id: u64,
}

// Requests

pub struct Ping {
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong {
    pub value: u32,
}

pub struct PingHandler {
    pub trace: Trace,
}

#[async_trait]
impl RequestHandler<Ping, Pong> for PingHandler {
    async fn handle(&self, request: &Ping, token: CancellationToken) -> HandlerResult<Pong> {
        self.trace.lock().push("handler".to_string());
        if token.is_cancelled() {
            return Err(Box::new(Cancelled));
        }
        Ok(Pong {
            value: request.value + 1,
        })
    }
}

// Commands

pub struct ShipOrder {
    pub order_id: u64,
}

pub struct Shipping {
    pub trace: Trace,
    pub failures_remaining: AtomicU32,
}

impl Shipping {
    pub fn new(trace: Trace) -> Self {
        Self::flaky(trace, 0)
    }

    pub fn flaky(trace: Trace, failures: u32) -> Self {
        Self {
            trace,
            failures_remaining: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl CommandHandler<ShipOrder> for Shipping {
    async fn handle(&self, command: &ShipOrder, _token: CancellationToken) -> HandlerResult<()> {
        self.trace.lock().push("handler".to_string());
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Box::new(ShipmentFailed {
                order_id: command.order_id,
            }));
        }
        Ok(())
    }
}

// Events

pub struct OrderShipped {
    pub order_id: u64,
}

pub struct EmailNotifier {
    pub trace: Trace,
}

#[async_trait]
impl EventHandler<OrderShipped> for EmailNotifier {
    async fn handle(&self, event: &OrderShipped, _token: CancellationToken) -> HandlerResult<()> {
        self.trace.lock().push(format!("email-{}", event.order_id));
        Ok(())
    }
}

pub struct AuditLog {
    pub trace: Trace,
}

#[async_trait]
impl EventHandler<OrderShipped> for AuditLog {
    async fn handle(&self, event: &OrderShipped, _token: CancellationToken) -> HandlerResult<()> {
        self.trace.lock().push(format!("audit-{}", event.order_id));
        Ok(())
    }
}

pub struct FailingNotifier {
    pub trace: Trace,
}

#[async_trait]
impl EventHandler<OrderShipped> for FailingNotifier {
    async fn handle(&self, event: &OrderShipped, _token: CancellationToken) -> HandlerResult<()> {
        self.trace.lock().push(format!("failing-{}", event.order_id));
        Err(Box::new(ShipmentFailed {
            order_id: event.order_id,
        }))
    }
}

// Pipeline stages

/// Records `<name>-enter` and `<name>-exit` around the rest of the pipeline
pub struct TracingStage {
    pub name: String,
    pub trace: Trace,
}

impl TracingStage {
    async fn around<'a, T: Send + 'a>(
        &self,
        next: Next<'a, T>,
        token: CancellationToken,
    ) -> HandlerResult<T> {
        self.trace.lock().push(format!("{}-enter", self.name));
        let result = next.run(token).await;
        self.trace.lock().push(format!("{}-exit", self.name));
        result
    }
}

#[async_trait]
impl RequestPipeline<PingHandler, Ping, Pong> for TracingStage {
    async fn handle(
        &self,
        _handler: &PingHandler,
        _request: &Ping,
        next: Next<'_, Pong>,
        token: CancellationToken,
    ) -> HandlerResult<Pong> {
        self.around(next, token).await
    }
}

#[async_trait]
impl CommandPipeline<Shipping, ShipOrder> for TracingStage {
    async fn handle(
        &self,
        _handler: &Shipping,
        _command: &ShipOrder,
        next: Next<'_, ()>,
        token: CancellationToken,
    ) -> HandlerResult<()> {
        self.around(next, token).await
    }
}

#[async_trait]
impl EventPipeline<EmailNotifier, OrderShipped> for TracingStage {
    async fn handle(
        &self,
        _handler: &EmailNotifier,
        _event: &OrderShipped,
        next: Next<'_, ()>,
        token: CancellationToken,
    ) -> HandlerResult<()> {
        self.around(next, token).await
    }
}

/// Answers every ping itself without calling the rest of the pipeline
pub struct ShortCircuitStage {
    pub trace: Trace,
}

#[async_trait]
impl RequestPipeline<PingHandler, Ping, Pong> for ShortCircuitStage {
    async fn handle(
        &self,
        _handler: &PingHandler,
        _request: &Ping,
        _next: Next<'_, Pong>,
        _token: CancellationToken,
    ) -> HandlerResult<Pong> {
        self.trace.lock().push("short-circuit".to_string());
        Ok(Pong { value: 0 })
    }
}

/// Doubles the response produced by the rest of the pipeline
pub struct DoublingStage;

#[async_trait]
impl RequestPipeline<PingHandler, Ping, Pong> for DoublingStage {
    async fn handle(
        &self,
        _handler: &PingHandler,
        _request: &Ping,
        next: Next<'_, Pong>,
        token: CancellationToken,
    ) -> HandlerResult<Pong> {
        let pong = next.run(token).await?;
        Ok(Pong {
            value: pong.value * 2,
        })
    }
}

/// Runs the rest of the pipeline a second time when the first attempt fails
pub struct RetryStage;

#[async_trait]
impl CommandPipeline<Shipping, ShipOrder> for RetryStage {
    async fn handle(
        &self,
        _handler: &Shipping,
        _command: &ShipOrder,
        next: Next<'_, ()>,
        token: CancellationToken,
    ) -> HandlerResult<()> {
        match next.run(token.clone()).await {
            Ok(()) => Ok(()),
            Err(_) => next.run(token).await,
        }
    }
}

/// Cancels the token it hands to the rest of the pipeline
pub struct CancellingStage;

#[async_trait]
impl RequestPipeline<PingHandler, Ping, Pong> for CancellingStage {
    async fn handle(
        &self,
        _handler: &PingHandler,
        _request: &Ping,
        next: Next<'_, Pong>,
        token: CancellationToken,
    ) -> HandlerResult<Pong> {
        let child = token.child_token();
        child.cancel();
        next.run(child).await
    }
}

// Registration helpers

pub fn ping_handler(trace: &Trace) -> HandlerInstance {
    HandlerInstance::builder(PingHandler {
        trace: trace.clone(),
    })
    .request::<Ping, Pong>()
    .build()
}

pub fn shipping_handler(trace: &Trace) -> HandlerInstance {
    HandlerInstance::builder(Shipping::new(trace.clone()))
        .command::<ShipOrder>()
        .build()
}

/// A tracing stage wrapping every fixture handler
pub fn tracing_stage(name: &str, trace: &Trace) -> HandlerInstance {
    HandlerInstance::builder(TracingStage {
        name: name.to_string(),
        trace: trace.clone(),
    })
    .request_pipeline::<PingHandler, Ping, Pong>()
    .command_pipeline::<Shipping, ShipOrder>()
    .event_pipeline::<EmailNotifier, OrderShipped>()
    .build()
}

/// Registry holding the ping handler behind the named tracing stages, outermost first
pub fn ping_registry(trace: &Trace, stages: &[&str]) -> ServiceRegistry {
    let registry = ServiceRegistry::new();
    registry.register(ping_handler(trace));
    for name in stages {
        registry.register(tracing_stage(name, trace));
    }
    registry
}
