//! # Pipeline Composition
//!
//! Builds the continuation chain that runs registered middleware stages around a handler.
//!
//! The chain is built right-to-left: the continuation handed to the last stage calls the
//! handler, the continuation handed to stage `i` calls stage `i + 1`. Invoking the outermost
//! continuation runs stage 0 first, so registration order is call order.
//!
//! A stage decides how often to call its [`Next`]: never (short-circuit), once, or several
//! times. The composer does not enforce any of these. The cancellation token is an explicit
//! argument of [`Next::run`]; stages are expected to forward the token they were given.

use crate::dispatch::invoker::{HandlerFn, StageFn};
use crate::error::HandlerResult;
use crate::message::{BoxedResponse, Payload};
use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type Continuation<'a, T> =
    dyn Fn(CancellationToken) -> BoxFuture<'a, HandlerResult<T>> + Send + Sync + 'a;

/// The rest of a pipeline as seen from one stage.
///
/// Cloning is cheap and every clone runs the same remaining chain.
pub struct Next<'a, T> {
    call: Arc<Continuation<'a, T>>,
}

impl<'a, T: Send + 'a> Next<'a, T> {
    pub fn new<F>(call: F) -> Self
    where
        F: Fn(CancellationToken) -> BoxFuture<'a, HandlerResult<T>> + Send + Sync + 'a,
    {
        Self {
            call: Arc::new(call),
        }
    }

    /// Run the remaining stages and the handler
    pub async fn run(&self, token: CancellationToken) -> HandlerResult<T> {
        (self.call)(token).await
    }

    /// Continuation producing `U` from this continuation's output
    pub fn map<U: Send + 'a>(self, convert: fn(T) -> HandlerResult<U>) -> Next<'a, U> {
        let call = self.call;
        Next::new(move |token| {
            let pending = call(token);
            async move { pending.await.and_then(convert) }.boxed()
        })
    }
}

impl<T> Clone for Next<'_, T> {
    fn clone(&self) -> Self {
        Self {
            call: self.call.clone(),
        }
    }
}

/// Invocation counters shared by every pipeline a dispatcher builds
#[derive(Debug, Default)]
pub struct PipelineCounters {
    handler_invocations: AtomicU64,
    stage_invocations: AtomicU64,
}

impl PipelineCounters {
    pub fn record_handler(&self) {
        self.handler_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stage(&self) {
        self.stage_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_invocations(&self) -> u64 {
        self.handler_invocations.load(Ordering::Relaxed)
    }

    pub fn stage_invocations(&self) -> u64 {
        self.stage_invocations.load(Ordering::Relaxed)
    }
}

/// Borrowed inputs of one handler call
#[derive(Clone, Copy)]
pub struct HandlerCall<'a> {
    /// Handler seen through the capability being invoked
    pub view: &'a Payload,
    /// Handler as its concrete type, handed to stages
    pub concrete: &'a Payload,
    pub message: &'a Payload,
    pub invoke: HandlerFn,
}

/// Compose `stages` (outermost first) around the handler call.
///
/// Continuations are built fresh for each dispatch and borrow the call's inputs; nothing
/// built here outlives the dispatch.
pub fn compose<'a>(
    stages: &[&'a Payload],
    invoke_stage: StageFn,
    call: HandlerCall<'a>,
    counters: &'a PipelineCounters,
) -> Next<'a, BoxedResponse> {
    let mut next: Next<'a, BoxedResponse> = Next::new(move |token| {
        counters.record_handler();
        (call.invoke)(call.view, call.message, token)
    });

    for &stage in stages.iter().rev() {
        let rest = next;
        next = Next::new(move |token| {
            counters.record_stage();
            invoke_stage(stage, call.concrete, call.message, rest.clone(), token)
        });
    }

    next
}
