//! # Broker
//!
//! Typed façade over the [`Dispatcher`]. Callers hand over plain messages; the broker wraps
//! them in envelopes and recovers typed responses.
//!
//! ```rust
//! use async_trait::async_trait;
//! use relay_core::error::HandlerResult;
//! use relay_core::handlers::{CommandHandler, RequestHandler};
//! use relay_core::registry::{HandlerInstance, ServiceRegistry};
//! use relay_core::{Broker, DispatcherConfig};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Increment;
//! struct Current;
//!
//! #[derive(Default)]
//! struct Counter(AtomicU32);
//!
//! #[async_trait]
//! impl CommandHandler<Increment> for Counter {
//!     async fn handle(
//!         &self,
//!         _command: &Increment,
//!         _token: CancellationToken,
//!     ) -> HandlerResult<()> {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl RequestHandler<Current, u32> for Counter {
//!     async fn handle(
//!         &self,
//!         _request: &Current,
//!         _token: CancellationToken,
//!     ) -> HandlerResult<u32> {
//!         Ok(self.0.load(Ordering::SeqCst))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let registry = ServiceRegistry::new();
//! registry.register(
//!     HandlerInstance::builder(Counter::default())
//!         .command::<Increment>()
//!         .request::<Current, u32>()
//!         .build(),
//! );
//! let broker = Broker::from_registry(Arc::new(registry), DispatcherConfig::default());
//!
//! broker.send(Increment, CancellationToken::new()).await.unwrap();
//! let current = broker
//!     .expecting::<u32>()
//!     .request(Current, CancellationToken::new())
//!     .await
//!     .unwrap();
//! assert_eq!(current, 1);
//! # });
//! ```

use crate::config::DispatcherConfig;
use crate::dispatch::dispatcher::Dispatcher;
use crate::dispatch::type_key::TypeKey;
use crate::error::{DispatchError, DispatchResult};
use crate::message::{BoxedResponse, Message, MessageEnvelope, Response};
use crate::registry::HandlerRegistry;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct Broker {
    dispatcher: Arc<Dispatcher>,
}

impl Broker {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn from_registry(registry: Arc<dyn HandlerRegistry>, config: DispatcherConfig) -> Self {
        Self::new(Arc::new(Dispatcher::with_config(registry, config)))
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Declare `B` as a parent of request type `D` for inferred requests
    pub fn derive<D: Message, B: Message>(&self, view: fn(&D) -> &B) -> bool {
        self.dispatcher.hierarchy().derive(view)
    }

    pub async fn send<C: Message>(
        &self,
        command: C,
        token: CancellationToken,
    ) -> DispatchResult<()> {
        self.send_any(&MessageEnvelope::new(command), token).await
    }

    pub async fn send_any(
        &self,
        command: &MessageEnvelope,
        token: CancellationToken,
    ) -> DispatchResult<()> {
        self.dispatcher.dispatch_command(command, token).await
    }

    /// Deliver `event` to every handler registered for it; returns how many ran
    pub async fn publish<E: Message>(
        &self,
        event: E,
        token: CancellationToken,
    ) -> DispatchResult<usize> {
        self.publish_any(&MessageEnvelope::new(event), token).await
    }

    pub async fn publish_any(
        &self,
        event: &MessageEnvelope,
        token: CancellationToken,
    ) -> DispatchResult<usize> {
        self.dispatcher.publish_event(event, token).await
    }

    pub async fn request<Q: Message, R: Response>(
        &self,
        request: Q,
        token: CancellationToken,
    ) -> DispatchResult<R> {
        let envelope = MessageEnvelope::new(request);
        let response = self
            .dispatcher
            .dispatch_request(Some(&envelope), TypeKey::of::<R>(), token)
            .await?;
        response
            .downcast::<R>()
            .map(|response| *response)
            .map_err(|_| DispatchError::type_mismatch::<R>("response"))
    }

    /// Request without naming the response type; the handler's nearest declaration decides it
    pub async fn request_inferred<Q: Message>(
        &self,
        request: Q,
        token: CancellationToken,
    ) -> DispatchResult<BoxedResponse> {
        self.request_any(Some(&MessageEnvelope::new(request)), token)
            .await
    }

    pub async fn request_any(
        &self,
        request: Option<&MessageEnvelope>,
        token: CancellationToken,
    ) -> DispatchResult<BoxedResponse> {
        self.dispatcher.dispatch_request_any(request, token).await
    }

    /// Fix the response type up front and let the request type be inferred
    pub fn expecting<R: Response>(&self) -> RequestBuilder<'_, R> {
        RequestBuilder {
            broker: self,
            _response: PhantomData,
        }
    }
}

/// Request with a response type chosen by [`Broker::expecting`]
pub struct RequestBuilder<'b, R> {
    broker: &'b Broker,
    _response: PhantomData<fn() -> R>,
}

impl<R: Response> RequestBuilder<'_, R> {
    pub async fn request<Q: Message>(
        self,
        request: Q,
        token: CancellationToken,
    ) -> DispatchResult<R> {
        self.broker.request::<Q, R>(request, token).await
    }
}
