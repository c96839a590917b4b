//! # Dispatch Engine
//!
//! Routing core of the mediator. Leaves first:
//!
//! ```text
//! Dispatch Engine
//! ├── type_key     (runtime type identity)
//! ├── cache        (type-keyed memoization)
//! ├── capability   (capability types and resolution against the registry)
//! ├── invoker      (compiled, type-erased call adapters)
//! ├── pipeline     (middleware continuation chains)
//! ├── matcher      (nearest-ancestor request matching)
//! └── dispatcher   (the operations exposed to the broker)
//! ```

pub mod cache;
pub mod capability;
pub mod dispatcher;
pub mod invoker;
pub mod matcher;
pub mod pipeline;
pub mod type_key;

pub use cache::TypeKeyedCache;
pub use capability::{Capability, CapabilityKey, CapabilityResolver};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use invoker::{EntryPoint, HandlerAdapter, InvokerCompiler, StageAdapter};
pub use matcher::{PolymorphicMatcher, RequestMatch, TypeHierarchy};
pub use pipeline::Next;
pub use type_key::TypeKey;
