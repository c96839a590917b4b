//! # Handler Registry
//!
//! The dispatcher does not construct handlers or manage their lifetimes. It asks a
//! [`HandlerRegistry`] for the instance implementing a capability and for the ordered list of
//! pipeline stages registered around it.
//!
//! ## Available Registries
//!
//! - **ServiceRegistry**: in-memory registry filing instances under every capability they declare
//!
//! ## Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use relay_core::error::HandlerResult;
//! use relay_core::handlers::CommandHandler;
//! use relay_core::registry::{HandlerInstance, ServiceRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! struct ShipOrder { order_id: u64 }
//! struct Shipping;
//!
//! #[async_trait]
//! impl CommandHandler<ShipOrder> for Shipping {
//!     async fn handle(
//!         &self,
//!         _command: &ShipOrder,
//!         _token: CancellationToken,
//!     ) -> HandlerResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! let registry = ServiceRegistry::new();
//! registry.register(HandlerInstance::builder(Shipping).command::<ShipOrder>().build());
//! assert_eq!(registry.stats().instances, 1);
//! ```

pub mod instance;
pub mod service_registry;

use crate::dispatch::capability::Capability;
use crate::error::DispatchResult;

pub use instance::{CapabilityView, HandlerInstance, InstanceBuilder};
pub use service_registry::{RegistryStats, ServiceRegistry};

/// Source of handler and pipeline stage instances
pub trait HandlerRegistry: Send + Sync {
    /// The single instance implementing `capability`.
    ///
    /// Fails with `MissingHandler` when nothing is registered and with
    /// `AmbiguousRegistration` when more than one instance is.
    fn get_required(&self, capability: &Capability) -> DispatchResult<HandlerInstance>;

    /// Every instance implementing `capability`, in registration order. May be empty.
    fn get_all(&self, capability: &Capability) -> Vec<HandlerInstance>;
}
