//! # In-Memory Service Registry
//!
//! Thread-safe [`HandlerRegistry`] keeping every registered instance under each capability it
//! declares. Registration order is preserved per capability, which makes it the pipeline
//! stage order.

use super::{HandlerInstance, HandlerRegistry};
use crate::dispatch::capability::{Capability, CapabilityKey};
use crate::error::{DispatchError, DispatchResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Default)]
pub struct ServiceRegistry {
    registrations: RwLock<HashMap<CapabilityKey, Vec<HandlerInstance>>>,
    instances: RwLock<Vec<HandlerInstance>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// File `instance` under every capability it declares.
    ///
    /// Returns the number of capabilities the instance was filed under.
    pub fn register(&self, instance: HandlerInstance) -> usize {
        let declared = instance.declared().len();
        {
            let mut registrations = self.registrations.write();
            for key in instance.declared() {
                registrations
                    .entry(*key)
                    .or_default()
                    .push(instance.clone());
            }
        }

        info!(
            handler = %instance.type_key(),
            capabilities = declared,
            "✅ Registered handler instance"
        );
        self.instances.write().push(instance);
        declared
    }

    /// Whether anything is registered for `capability`
    pub fn is_registered(&self, capability: &Capability) -> bool {
        self.registrations
            .read()
            .get(capability.key())
            .is_some_and(|instances| !instances.is_empty())
    }

    pub fn stats(&self) -> RegistryStats {
        let registrations = self.registrations.read();
        let pipeline_capabilities = registrations.keys().filter(|key| key.is_pipeline()).count();
        RegistryStats {
            instances: self.instances.read().len(),
            capabilities: registrations.len(),
            pipeline_capabilities,
            registrations: registrations.values().map(Vec::len).sum(),
        }
    }
}

impl HandlerRegistry for ServiceRegistry {
    fn get_required(&self, capability: &Capability) -> DispatchResult<HandlerInstance> {
        let registrations = self.registrations.read();
        match registrations.get(capability.key()).map(Vec::as_slice) {
            None | Some([]) => Err(DispatchError::MissingHandler {
                capability: capability.clone(),
            }),
            Some([instance]) => Ok(instance.clone()),
            Some(instances) => Err(DispatchError::AmbiguousRegistration {
                capability: capability.clone(),
                count: instances.len(),
            }),
        }
    }

    fn get_all(&self, capability: &Capability) -> Vec<HandlerInstance> {
        let instances = self
            .registrations
            .read()
            .get(capability.key())
            .cloned()
            .unwrap_or_default();
        debug!(
            capability = %capability,
            count = instances.len(),
            "Looked up registered instances"
        );
        instances
    }
}

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub instances: usize,
    pub capabilities: usize,
    pub pipeline_capabilities: usize,
    pub registrations: usize,
}
