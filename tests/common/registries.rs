//! Registries used to observe how the dispatcher consults its collaborator.

use relay_core::registry::{HandlerInstance, HandlerRegistry};
use relay_core::{Capability, DispatchResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Fails the test if the dispatcher looks anything up
pub struct PanickingRegistry;

impl HandlerRegistry for PanickingRegistry {
    fn get_required(&self, capability: &Capability) -> DispatchResult<HandlerInstance> {
        panic!("registry queried for {capability} but should not have been");
    }

    fn get_all(&self, capability: &Capability) -> Vec<HandlerInstance> {
        panic!("registry queried for all {capability} but should not have been");
    }
}

/// Counts lookups while delegating to another registry
pub struct CountingRegistry<R> {
    pub inner: R,
    pub required_lookups: Arc<AtomicUsize>,
    pub all_lookups: Arc<AtomicUsize>,
}

impl<R: HandlerRegistry> CountingRegistry<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            required_lookups: Arc::default(),
            all_lookups: Arc::default(),
        }
    }
}

impl<R: HandlerRegistry> HandlerRegistry for CountingRegistry<R> {
    fn get_required(&self, capability: &Capability) -> DispatchResult<HandlerInstance> {
        self.required_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_required(capability)
    }

    fn get_all(&self, capability: &Capability) -> Vec<HandlerInstance> {
        self.all_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_all(capability)
    }
}
