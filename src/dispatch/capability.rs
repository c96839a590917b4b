//! # Capability Types and Resolution
//!
//! A capability names the handler contract a message needs: "a command handler for `C`",
//! "a request handler for `Q` producing `R`", or "a pipeline stage wrapping handler `H` for
//! message `M`". The resolver derives capabilities from message types and asks the
//! [`HandlerRegistry`] for the single instance implementing one.

use crate::dispatch::cache::TypeKeyedCache;
use crate::dispatch::type_key::TypeKey;
use crate::error::DispatchResult;
use crate::registry::{HandlerInstance, HandlerRegistry};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

/// Structural identity of a capability. Two keys built from the same types are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKey {
    CommandHandler {
        command: TypeKey,
    },
    EventHandler {
        event: TypeKey,
    },
    RequestHandler {
        request: TypeKey,
        response: TypeKey,
    },
    /// Request handler whose response type is not known by the caller
    AnyRequestHandler {
        request: TypeKey,
    },
    CommandPipeline {
        handler: TypeKey,
        command: TypeKey,
    },
    EventPipeline {
        handler: TypeKey,
        event: TypeKey,
    },
    RequestPipeline {
        handler: TypeKey,
        request: TypeKey,
        response: TypeKey,
    },
}

impl CapabilityKey {
    /// Whether this key names a pipeline stage rather than a handler
    pub fn is_pipeline(&self) -> bool {
        matches!(
            self,
            CapabilityKey::CommandPipeline { .. }
                | CapabilityKey::EventPipeline { .. }
                | CapabilityKey::RequestPipeline { .. }
        )
    }

    fn label(&self) -> String {
        match self {
            CapabilityKey::CommandHandler { command } => format!("CommandHandler<{command}>"),
            CapabilityKey::EventHandler { event } => format!("EventHandler<{event}>"),
            CapabilityKey::RequestHandler { request, response } => {
                format!("RequestHandler<{request}, {response}>")
            }
            CapabilityKey::AnyRequestHandler { request } => format!("RequestHandler<{request}, _>"),
            CapabilityKey::CommandPipeline { handler, command } => {
                format!("CommandPipeline<{handler}, {command}>")
            }
            CapabilityKey::EventPipeline { handler, event } => {
                format!("EventPipeline<{handler}, {event}>")
            }
            CapabilityKey::RequestPipeline {
                handler,
                request,
                response,
            } => format!("RequestPipeline<{handler}, {request}, {response}>"),
        }
    }
}

/// A resolved capability descriptor: the structural key plus its display label.
#[derive(Clone)]
pub struct Capability {
    key: CapabilityKey,
    label: Arc<str>,
}

impl Capability {
    pub fn new(key: CapabilityKey) -> Self {
        Self {
            key,
            label: Arc::from(key.label()),
        }
    }

    pub fn key(&self) -> &CapabilityKey {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({})", self.label)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl From<CapabilityKey> for Capability {
    fn from(key: CapabilityKey) -> Self {
        Capability::new(key)
    }
}

/// Derives capability descriptors and resolves them against a registry.
pub struct CapabilityResolver {
    capabilities: TypeKeyedCache<CapabilityKey, Capability>,
}

impl CapabilityResolver {
    pub fn new() -> Self {
        Self {
            capabilities: TypeKeyedCache::new(),
        }
    }

    /// Cached descriptor for `key`
    pub fn capability(&self, key: CapabilityKey) -> Capability {
        self.capabilities.get_or_create(key, |key| Capability::new(*key))
    }

    pub fn command_capability(&self, command: TypeKey) -> Capability {
        self.capability(CapabilityKey::CommandHandler { command })
    }

    pub fn event_capability(&self, event: TypeKey) -> Capability {
        self.capability(CapabilityKey::EventHandler { event })
    }

    pub fn request_capability(&self, request: TypeKey, response: TypeKey) -> Capability {
        self.capability(CapabilityKey::RequestHandler { request, response })
    }

    pub fn any_request_capability(&self, request: TypeKey) -> Capability {
        self.capability(CapabilityKey::AnyRequestHandler { request })
    }

    /// Pipeline capability wrapping calls to `handler` for the given handler capability
    pub fn pipeline_capability(
        &self,
        handler: TypeKey,
        capability: &Capability,
    ) -> Option<Capability> {
        let key = match *capability.key() {
            CapabilityKey::CommandHandler { command } => {
                CapabilityKey::CommandPipeline { handler, command }
            }
            CapabilityKey::EventHandler { event } => {
                CapabilityKey::EventPipeline { handler, event }
            }
            CapabilityKey::RequestHandler { request, response } => CapabilityKey::RequestPipeline {
                handler,
                request,
                response,
            },
            _ => return None,
        };
        Some(self.capability(key))
    }

    /// Resolve the handler for a command or event type
    pub fn resolve_message(
        &self,
        registry: &dyn HandlerRegistry,
        capability: Capability,
    ) -> DispatchResult<(Capability, HandlerInstance)> {
        let handler = registry.get_required(&capability)?;
        debug!(
            capability = %capability,
            handler = %handler.type_key(),
            "Resolved handler"
        );
        Ok((capability, handler))
    }

    /// Resolve the handler for a command type
    pub fn resolve_command(
        &self,
        registry: &dyn HandlerRegistry,
        command: TypeKey,
    ) -> DispatchResult<(Capability, HandlerInstance)> {
        self.resolve_message(registry, self.command_capability(command))
    }

    /// Resolve the handler for an event type
    pub fn resolve_event(
        &self,
        registry: &dyn HandlerRegistry,
        event: TypeKey,
    ) -> DispatchResult<(Capability, HandlerInstance)> {
        self.resolve_message(registry, self.event_capability(event))
    }

    /// Resolve the handler for a request with a known response type
    pub fn resolve_request(
        &self,
        registry: &dyn HandlerRegistry,
        request: TypeKey,
        response: TypeKey,
    ) -> DispatchResult<(Capability, HandlerInstance)> {
        self.resolve_message(registry, self.request_capability(request, response))
    }

    /// Number of capability descriptors derived so far
    pub fn cached_capabilities(&self) -> usize {
        self.capabilities.len()
    }
}

impl Default for CapabilityResolver {
    fn default() -> Self {
        Self::new()
    }
}
