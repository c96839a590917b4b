//! # Dispatcher
//!
//! The dispatch engine. Every operation follows the same path: derive the capability the
//! message needs, resolve the one handler implementing it, fetch the compiled call adapter,
//! look up the pipeline stages registered around that handler type, and run the composed
//! chain once.
//!
//! Shared state lives in the type-keyed caches owned by the resolver, the invoker compiler
//! and the matcher. Continuations are rebuilt on every call.

use crate::config::DispatcherConfig;
use crate::dispatch::capability::{Capability, CapabilityResolver};
use crate::dispatch::invoker::{HandlerAdapter, InvokerCompiler};
use crate::dispatch::matcher::{PolymorphicMatcher, TypeHierarchy};
use crate::dispatch::pipeline::{compose, HandlerCall, PipelineCounters};
use crate::dispatch::type_key::TypeKey;
use crate::error::{DispatchError, DispatchResult};
use crate::logging;
use crate::message::{BoxedResponse, MessageEnvelope, Payload};
use crate::registry::{CapabilityView, HandlerInstance, HandlerRegistry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Routes type-erased messages to their handlers.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use relay_core::error::HandlerResult;
/// use relay_core::handlers::RequestHandler;
/// use relay_core::registry::{HandlerInstance, ServiceRegistry};
/// use relay_core::{Dispatcher, MessageEnvelope, TypeKey};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// struct Ping;
/// struct Pong(&'static str);
/// struct PingHandler;
///
/// #[async_trait]
/// impl RequestHandler<Ping, Pong> for PingHandler {
///     async fn handle(&self, _request: &Ping, _token: CancellationToken) -> HandlerResult<Pong> {
///         Ok(Pong("pong"))
///     }
/// }
///
/// let registry = ServiceRegistry::new();
/// registry.register(HandlerInstance::builder(PingHandler).request::<Ping, Pong>().build());
/// let dispatcher = Dispatcher::new(Arc::new(registry));
///
/// let envelope = MessageEnvelope::new(Ping);
/// let response = tokio_test::block_on(dispatcher.dispatch_request(
///     Some(&envelope),
///     TypeKey::of::<Pong>(),
///     CancellationToken::new(),
/// ))
/// .unwrap();
/// assert_eq!(response.downcast::<Pong>().unwrap().0, "pong");
/// ```
pub struct Dispatcher {
    registry: Arc<dyn HandlerRegistry>,
    resolver: CapabilityResolver,
    invokers: InvokerCompiler,
    matcher: PolymorphicMatcher,
    hierarchy: TypeHierarchy,
    config: DispatcherConfig,
    counters: PipelineCounters,
    dispatches: AtomicU64,
}

impl Dispatcher {
    pub fn new(registry: Arc<dyn HandlerRegistry>) -> Self {
        Self::with_config(registry, DispatcherConfig::default())
    }

    pub fn with_config(registry: Arc<dyn HandlerRegistry>, config: DispatcherConfig) -> Self {
        info!(
            tie_break = ?config.tie_break,
            single_flight_compilation = config.single_flight_compilation,
            log_dispatches = config.log_dispatches,
            "🚦 Dispatcher created"
        );

        Self {
            registry,
            resolver: CapabilityResolver::new(),
            invokers: InvokerCompiler::new(config.single_flight_compilation),
            matcher: PolymorphicMatcher::new(),
            hierarchy: TypeHierarchy::new(),
            config,
            counters: PipelineCounters::default(),
            dispatches: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Parent relationships used by [`dispatch_request_any`](Self::dispatch_request_any)
    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    /// Send a command to its single handler
    pub async fn dispatch_command(
        &self,
        command: &MessageEnvelope,
        token: CancellationToken,
    ) -> DispatchResult<()> {
        const OPERATION: &str = "dispatch_command";
        self.record_dispatch();
        let started = Instant::now();

        let result = async {
            let (capability, handler) = self
                .resolver
                .resolve_command(self.registry.as_ref(), command.type_key())?;
            let adapter = self.invokers.compile_handler(&capability, &handler)?;
            self.execute(
                OPERATION,
                &capability,
                &handler,
                &adapter,
                command.payload(),
                token,
                started,
            )
            .await
        }
        .await;

        self.observe(OPERATION, command.type_key(), result).map(|_| ())
    }

    /// Send an event to the single handler registered for its type
    pub async fn dispatch_event(
        &self,
        event: &MessageEnvelope,
        token: CancellationToken,
    ) -> DispatchResult<()> {
        const OPERATION: &str = "dispatch_event";
        self.record_dispatch();
        let started = Instant::now();

        let result = async {
            let (capability, handler) = self
                .resolver
                .resolve_event(self.registry.as_ref(), event.type_key())?;
            let adapter = self.invokers.compile_handler(&capability, &handler)?;
            self.execute(
                OPERATION,
                &capability,
                &handler,
                &adapter,
                event.payload(),
                token,
                started,
            )
            .await
        }
        .await;

        self.observe(OPERATION, event.type_key(), result).map(|_| ())
    }

    /// Deliver an event to every registered handler, in registration order.
    ///
    /// Handlers run one after another, each through its own pipeline. The first failure stops
    /// delivery. Returns the number of handlers that ran; having none is not an error.
    pub async fn publish_event(
        &self,
        event: &MessageEnvelope,
        token: CancellationToken,
    ) -> DispatchResult<usize> {
        const OPERATION: &str = "publish_event";
        self.record_dispatch();
        let started = Instant::now();

        let result = async {
            let capability = self.resolver.event_capability(event.type_key());
            let handlers = self.registry.get_all(&capability);
            debug!(capability = %capability, handlers = handlers.len(), "Publishing event");

            for handler in &handlers {
                let adapter = self.invokers.compile_handler(&capability, handler)?;
                self.execute(
                    OPERATION,
                    &capability,
                    handler,
                    &adapter,
                    event.payload(),
                    token.clone(),
                    started,
                )
                .await?;
            }
            Ok::<_, DispatchError>(handlers.len())
        }
        .await;

        self.observe(OPERATION, event.type_key(), result)
    }

    /// Send a request to the handler producing `response_type`.
    ///
    /// An absent request fails with `PreconditionViolation` before the registry is consulted.
    pub async fn dispatch_request(
        &self,
        request: Option<&MessageEnvelope>,
        response_type: TypeKey,
        token: CancellationToken,
    ) -> DispatchResult<BoxedResponse> {
        const OPERATION: &str = "dispatch_request";
        let request = require_request(request)?;
        self.record_dispatch();
        let started = Instant::now();

        let result = async {
            let (capability, handler) = self.resolver.resolve_request(
                self.registry.as_ref(),
                request.type_key(),
                response_type,
            )?;
            let adapter = self.invokers.compile_handler(&capability, &handler)?;
            self.execute(
                OPERATION,
                &capability,
                &handler,
                &adapter,
                request.payload(),
                token,
                started,
            )
            .await
        }
        .await;

        self.observe(OPERATION, request.type_key(), result)
    }

    /// Send a request whose response type the caller does not know.
    ///
    /// The handler registered for the request's runtime type is matched against the request
    /// capabilities it declares; the one with the nearest declared request type is invoked.
    pub async fn dispatch_request_any(
        &self,
        request: Option<&MessageEnvelope>,
        token: CancellationToken,
    ) -> DispatchResult<BoxedResponse> {
        const OPERATION: &str = "dispatch_request_any";
        let request = require_request(request)?;
        self.record_dispatch();
        let started = Instant::now();

        let result = async {
            let marker = self.resolver.any_request_capability(request.type_key());
            let (_, handler) = self.resolver.resolve_message(self.registry.as_ref(), marker)?;
            let matched = self.matcher.match_request(
                request.type_key(),
                &handler,
                &self.resolver,
                &self.invokers,
                &self.hierarchy,
                self.config.tie_break,
            )?;
            let declared = matched
                .upcast(request.payload())
                .ok_or_else(|| DispatchError::TypeMismatch {
                    context: "request upcast",
                    expected: matched.declared_request().name(),
                })?;
            self.execute(
                OPERATION,
                matched.capability(),
                &handler,
                matched.invoker(),
                declared,
                token,
                started,
            )
            .await
        }
        .await;

        self.observe(OPERATION, request.type_key(), result)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            total_dispatches: self.dispatches.load(Ordering::Relaxed),
            handler_invocations: self.counters.handler_invocations(),
            stage_invocations: self.counters.stage_invocations(),
            cached_capabilities: self.resolver.cached_capabilities(),
            compiled_handler_adapters: self.invokers.compiled_handlers(),
            compiled_stage_adapters: self.invokers.compiled_stages(),
            cached_matches: self.matcher.cached_matches(),
        }
    }

    /// Compiled adapter for `capability`, compiling it on first use
    pub fn handler_adapter(
        &self,
        capability: &Capability,
        handler: &HandlerInstance,
    ) -> DispatchResult<Arc<HandlerAdapter>> {
        self.invokers.compile_handler(capability, handler)
    }

    pub fn resolver(&self) -> &CapabilityResolver {
        &self.resolver
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        operation: &'static str,
        capability: &Capability,
        handler: &HandlerInstance,
        adapter: &HandlerAdapter,
        message: &Payload,
        token: CancellationToken,
        started: Instant,
    ) -> DispatchResult<BoxedResponse> {
        let view = handler
            .view(capability.key())
            .map(CapabilityView::target)
            .ok_or_else(|| DispatchError::CompilationFailure {
                capability: capability.clone(),
                reason: format!("{} does not expose this capability", handler.type_key()),
            })?;

        let pipeline = self
            .resolver
            .pipeline_capability(handler.type_key(), capability);
        let stages = pipeline
            .as_ref()
            .map(|pipeline| self.registry.get_all(pipeline))
            .unwrap_or_default();

        let response = match (pipeline, stages.first()) {
            (Some(pipeline), Some(outermost)) => {
                let stage_adapter = self.invokers.compile_stage(&pipeline, outermost)?;
                let stage_views = stages
                    .iter()
                    .map(|stage| {
                        stage
                            .view(pipeline.key())
                            .map(CapabilityView::target)
                            .ok_or_else(|| DispatchError::CompilationFailure {
                                capability: pipeline.clone(),
                                reason: format!(
                                    "{} does not expose this capability",
                                    stage.type_key()
                                ),
                            })
                    })
                    .collect::<DispatchResult<Vec<&Payload>>>()?;

                let call = HandlerCall {
                    view,
                    concrete: handler.concrete(),
                    message,
                    invoke: adapter.invoke_fn(),
                };
                compose(&stage_views, stage_adapter.invoke_fn(), call, &self.counters)
                    .run(token)
                    .await?
            }
            _ => {
                self.counters.record_handler();
                adapter.invoke(view, message, token).await?
            }
        };

        if self.config.log_dispatches {
            logging::log_dispatch_operation(
                operation,
                handler.type_key().name(),
                Some(capability.label()),
                stages.len(),
                elapsed_micros(started),
            );
        }
        Ok(response)
    }

    fn record_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    fn observe<T>(
        &self,
        operation: &'static str,
        message_type: TypeKey,
        result: DispatchResult<T>,
    ) -> DispatchResult<T> {
        if let Err(error) = &result {
            debug!(
                operation,
                message_type = %message_type,
                error = %error,
                "Dispatch failed"
            );
            if self.config.log_dispatches {
                logging::log_dispatch_error(
                    operation,
                    message_type.name(),
                    &error.to_string(),
                    error.is_handler_error(),
                );
            }
        }
        result
    }
}

fn require_request(request: Option<&MessageEnvelope>) -> DispatchResult<&MessageEnvelope> {
    request.ok_or_else(|| DispatchError::PreconditionViolation {
        reason: "request must not be absent".to_string(),
    })
}

fn elapsed_micros(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Dispatcher statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    pub total_dispatches: u64,
    /// Handler calls made, directly or at the end of a pipeline
    pub handler_invocations: u64,
    /// Pipeline stage calls made
    pub stage_invocations: u64,
    pub cached_capabilities: usize,
    pub compiled_handler_adapters: usize,
    pub compiled_stage_adapters: usize,
    pub cached_matches: usize,
}
