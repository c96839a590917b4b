#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Relay Core
//!
//! In-process mediator: routes commands, events and requests to typed handlers, optionally
//! through an ordered chain of middleware stages.
//!
//! ## Overview
//!
//! Callers send messages without knowing who handles them. For each message the dispatcher
//! derives the handler capability it needs, asks a [`registry::HandlerRegistry`] for the
//! instance implementing it, and invokes it through a call adapter compiled once per
//! capability. Pipeline stages registered around the handler run outermost first.
//!
//! ## Key Features
//!
//! - **Compile once, call many**: call adapters are built on first use and cached per capability
//! - **Middleware pipelines**: stages may run code around the handler, replace its result or
//!   skip it
//! - **Polymorphic requests**: requests dispatched without a response type are matched to the
//!   handler capability declared for their nearest ancestor type
//! - **Explicit cancellation**: a `CancellationToken` is threaded through every stage
//!
//! ## Module Organization
//!
//! - [`dispatch`] - Capability resolution, call adapters, pipelines and matching
//! - [`handlers`] - Handler and pipeline stage traits
//! - [`registry`] - Handler registry contract and the in-memory `ServiceRegistry`
//! - [`broker`] - Typed façade over the dispatcher
//! - [`config`] - Dispatcher configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod broker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod message;
pub mod registry;

pub use broker::{Broker, RequestBuilder};
pub use config::{DispatcherConfig, TieBreakPolicy};
pub use dispatch::{
    Capability, CapabilityKey, DispatchStats, Dispatcher, Next, TypeHierarchy, TypeKey,
};
pub use error::{DispatchError, DispatchResult, HandlerError, HandlerResult};
pub use handlers::{
    CommandHandler, CommandPipeline, EventHandler, EventPipeline, RequestHandler, RequestPipeline,
};
pub use message::{BoxedResponse, Message, MessageEnvelope, Response};
pub use registry::{HandlerInstance, HandlerRegistry, ServiceRegistry};
