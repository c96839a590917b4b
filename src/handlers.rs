//! # Handler Contracts
//!
//! Traits implemented by application code. A single type may implement any number of them;
//! the capabilities it serves are declared when it is registered (see
//! [`HandlerInstance::builder`](crate::registry::HandlerInstance::builder)).
//!
//! Pipeline stages wrap calls to one concrete handler type `H`. Each stage receives the
//! handler, the message and a [`Next`] continuation. Stages must forward the
//! [`CancellationToken`] they were given to `next.run`; nothing checks that they do.
//!
//! ```rust
//! use async_trait::async_trait;
//! use relay_core::error::HandlerResult;
//! use relay_core::handlers::{RequestHandler, RequestPipeline};
//! use relay_core::Next;
//! use tokio_util::sync::CancellationToken;
//!
//! struct GetBalance { account: u64 }
//! struct Ledger;
//! struct Audit;
//!
//! #[async_trait]
//! impl RequestHandler<GetBalance, i64> for Ledger {
//!     async fn handle(
//!         &self,
//!         request: &GetBalance,
//!         _token: CancellationToken,
//!     ) -> HandlerResult<i64> {
//!         Ok(request.account as i64 * 100)
//!     }
//! }
//!
//! #[async_trait]
//! impl RequestPipeline<Ledger, GetBalance, i64> for Audit {
//!     async fn handle(
//!         &self,
//!         _handler: &Ledger,
//!         _request: &GetBalance,
//!         next: Next<'_, i64>,
//!         token: CancellationToken,
//!     ) -> HandlerResult<i64> {
//!         let balance = next.run(token).await?;
//!         Ok(balance.max(0))
//!     }
//! }
//! ```

use crate::dispatch::pipeline::Next;
use crate::error::HandlerResult;
use crate::message::{Message, Response};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Handles a command of type `C`. Exactly one handler serves each command type.
#[async_trait]
pub trait CommandHandler<C: Message>: Send + Sync + 'static {
    async fn handle(&self, command: &C, token: CancellationToken) -> HandlerResult<()>;
}

/// Handles an event of type `E`. Several handlers may observe the same event type.
#[async_trait]
pub trait EventHandler<E: Message>: Send + Sync + 'static {
    async fn handle(&self, event: &E, token: CancellationToken) -> HandlerResult<()>;
}

/// Answers a request of type `Q` with a response of type `R`
#[async_trait]
pub trait RequestHandler<Q: Message, R: Response>: Send + Sync + 'static {
    async fn handle(&self, request: &Q, token: CancellationToken) -> HandlerResult<R>;
}

/// Middleware wrapping command handler `H` for command `C`
#[async_trait]
pub trait CommandPipeline<H, C>: Send + Sync + 'static
where
    H: CommandHandler<C>,
    C: Message,
{
    async fn handle(
        &self,
        handler: &H,
        command: &C,
        next: Next<'_, ()>,
        token: CancellationToken,
    ) -> HandlerResult<()>;
}

/// Middleware wrapping event handler `H` for event `E`
#[async_trait]
pub trait EventPipeline<H, E>: Send + Sync + 'static
where
    H: EventHandler<E>,
    E: Message,
{
    async fn handle(
        &self,
        handler: &H,
        event: &E,
        next: Next<'_, ()>,
        token: CancellationToken,
    ) -> HandlerResult<()>;
}

/// Middleware wrapping request handler `H` for request `Q` producing `R`.
///
/// A stage may replace the response, translate errors returned by `next`, or skip `next`
/// entirely and answer on its own.
#[async_trait]
pub trait RequestPipeline<H, Q, R>: Send + Sync + 'static
where
    H: RequestHandler<Q, R>,
    Q: Message,
    R: Response,
{
    async fn handle(
        &self,
        handler: &H,
        request: &Q,
        next: Next<'_, R>,
        token: CancellationToken,
    ) -> HandlerResult<R>;
}
