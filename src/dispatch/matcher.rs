//! # Polymorphic Request Matching
//!
//! Used when a request is dispatched without a response type. The handler resolved for the
//! request's runtime type may declare request capabilities only for ancestors of that type;
//! the matcher picks the declared capability whose request type is nearest.
//!
//! Ancestry is explicit. [`TypeHierarchy::derive`] records that `D` can be viewed as its
//! parent `B` through an accessor (`fn(&D) -> &B`), which is how a request type embeds its
//! base. A type may have several parents. The distance between a type and an ancestor is
//! the length of the shortest chain of declared steps; a type is at distance 0 from itself.
//!
//! Declare the hierarchy before the first dispatch of the types involved: matches are cached
//! per (request type, handler type) and never revisited.

use crate::config::TieBreakPolicy;
use crate::dispatch::cache::TypeKeyedCache;
use crate::dispatch::capability::{Capability, CapabilityKey, CapabilityResolver};
use crate::dispatch::invoker::{HandlerAdapter, InvokerCompiler};
use crate::dispatch::type_key::TypeKey;
use crate::error::{DispatchError, DispatchResult};
use crate::message::{Message, Payload};
use crate::registry::HandlerInstance;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One declared step from a type to a direct parent
pub trait Upcast: Send + Sync {
    fn parent(&self) -> TypeKey;

    /// View `value` as the parent type; `None` if `value` is not of the child type
    fn apply<'a>(&self, value: &'a Payload) -> Option<&'a Payload>;
}

struct TypedUpcast<D, B> {
    view: fn(&D) -> &B,
}

impl<D: Message, B: Message> Upcast for TypedUpcast<D, B> {
    fn parent(&self) -> TypeKey {
        TypeKey::of::<B>()
    }

    fn apply<'a>(&self, value: &'a Payload) -> Option<&'a Payload> {
        value
            .downcast_ref::<D>()
            .map(|derived| (self.view)(derived) as &Payload)
    }
}

/// A reachable ancestor and the steps leading to it
#[derive(Clone)]
pub struct Ancestor {
    pub type_key: TypeKey,
    pub distance: usize,
    pub path: Vec<Arc<dyn Upcast>>,
}

impl fmt::Debug for Ancestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ancestor")
            .field("type", &self.type_key.friendly_name())
            .field("distance", &self.distance)
            .finish()
    }
}

/// Explicit parent relationships between request types
#[derive(Default)]
pub struct TypeHierarchy {
    parents: RwLock<HashMap<TypeKey, Vec<Arc<dyn Upcast>>>>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `B` as a direct parent of `D`, reachable through `view`.
    ///
    /// Returns false if the relationship was already declared.
    pub fn derive<D: Message, B: Message>(&self, view: fn(&D) -> &B) -> bool {
        let mut parents = self.parents.write();
        let entry = parents.entry(TypeKey::of::<D>()).or_default();
        if entry.iter().any(|step| step.parent() == TypeKey::of::<B>()) {
            return false;
        }
        entry.push(Arc::new(TypedUpcast { view }));
        debug!(
            derived = %TypeKey::of::<D>(),
            parent = %TypeKey::of::<B>(),
            "Declared request type parent"
        );
        true
    }

    pub fn parents(&self, type_key: TypeKey) -> Vec<TypeKey> {
        self.parents
            .read()
            .get(&type_key)
            .map(|steps| steps.iter().map(|step| step.parent()).collect())
            .unwrap_or_default()
    }

    /// `type_key` itself and every ancestor, nearest first
    pub fn ancestors(&self, type_key: TypeKey) -> Vec<Ancestor> {
        let parents = self.parents.read();
        let mut visited = HashSet::from([type_key]);
        let mut queue = VecDeque::from([Ancestor {
            type_key,
            distance: 0,
            path: Vec::new(),
        }]);
        let mut ancestors = Vec::new();

        while let Some(current) = queue.pop_front() {
            for step in parents.get(&current.type_key).into_iter().flatten() {
                if visited.insert(step.parent()) {
                    let mut path = current.path.clone();
                    path.push(step.clone());
                    queue.push_back(Ancestor {
                        type_key: step.parent(),
                        distance: current.distance + 1,
                        path,
                    });
                }
            }
            ancestors.push(current);
        }
        ancestors
    }

    /// Shortest distance from `type_key` to `ancestor`
    pub fn distance(&self, type_key: TypeKey, ancestor: TypeKey) -> Option<usize> {
        self.ancestors(type_key)
            .into_iter()
            .find(|candidate| candidate.type_key == ancestor)
            .map(|candidate| candidate.distance)
    }
}

/// The capability selected for a (request type, handler type) pairing
pub struct RequestMatch {
    capability: Capability,
    declared_request: TypeKey,
    response: TypeKey,
    distance: usize,
    invoker: Arc<HandlerAdapter>,
    path: Vec<Arc<dyn Upcast>>,
}

impl RequestMatch {
    /// `RequestHandler<declared request, response>`
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn declared_request(&self) -> TypeKey {
        self.declared_request
    }

    pub fn response(&self) -> TypeKey {
        self.response
    }

    pub fn distance(&self) -> usize {
        self.distance
    }

    pub fn invoker(&self) -> &Arc<HandlerAdapter> {
        &self.invoker
    }

    /// View a request of the matched runtime type as the declared request type
    pub fn upcast<'a>(&self, request: &'a Payload) -> Option<&'a Payload> {
        self.path
            .iter()
            .try_fold(request, |value, step| step.apply(value))
    }
}

impl fmt::Debug for RequestMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestMatch")
            .field("capability", &self.capability)
            .field("distance", &self.distance)
            .finish_non_exhaustive()
    }
}

/// Caches request matches per (request type, handler type)
pub struct PolymorphicMatcher {
    matches: TypeKeyedCache<(TypeKey, TypeKey), Arc<RequestMatch>>,
}

impl PolymorphicMatcher {
    pub fn new() -> Self {
        Self {
            matches: TypeKeyedCache::new(),
        }
    }

    pub fn match_request(
        &self,
        request_type: TypeKey,
        handler: &HandlerInstance,
        resolver: &CapabilityResolver,
        invokers: &InvokerCompiler,
        hierarchy: &TypeHierarchy,
        tie_break: TieBreakPolicy,
    ) -> DispatchResult<Arc<RequestMatch>> {
        self.matches
            .get_or_try_create((request_type, handler.type_key()), |_| {
                let ancestors: HashMap<TypeKey, Ancestor> = hierarchy
                    .ancestors(request_type)
                    .into_iter()
                    .map(|ancestor| (ancestor.type_key, ancestor))
                    .collect();

                let candidates: Vec<(TypeKey, TypeKey, &Ancestor)> = handler
                    .declared()
                    .iter()
                    .filter_map(|key| match *key {
                        CapabilityKey::RequestHandler { request, response } => ancestors
                            .get(&request)
                            .map(|ancestor| (request, response, ancestor)),
                        _ => None,
                    })
                    .collect();

                let Some(distance) = candidates.iter().map(|(_, _, a)| a.distance).min() else {
                    return Err(DispatchError::NoMatchingHandler {
                        request_type,
                        handler_type: handler.type_key(),
                    });
                };

                let nearest: Vec<&(TypeKey, TypeKey, &Ancestor)> = candidates
                    .iter()
                    .filter(|(_, _, ancestor)| ancestor.distance == distance)
                    .collect();

                if nearest.len() > 1 && tie_break == TieBreakPolicy::Reject {
                    return Err(DispatchError::AmbiguousMatch {
                        request_type,
                        handler_type: handler.type_key(),
                        distance,
                        candidates: nearest
                            .iter()
                            .map(|(request, response, _)| {
                                resolver.request_capability(*request, *response).to_string()
                            })
                            .collect(),
                    });
                }

                let (declared_request, response, ancestor) = nearest[0];
                let capability = resolver.request_capability(*declared_request, *response);
                let invoker = invokers.compile_handler(&capability, handler)?;

                debug!(
                    request = %request_type,
                    handler = %handler.type_key(),
                    capability = %capability,
                    distance,
                    "Matched request to declared handler capability"
                );

                Ok(Arc::new(RequestMatch {
                    capability,
                    declared_request: *declared_request,
                    response: *response,
                    distance,
                    invoker,
                    path: ancestor.path.clone(),
                }))
            })
    }

    pub fn cached_matches(&self) -> usize {
        self.matches.len()
    }
}

impl Default for PolymorphicMatcher {
    fn default() -> Self {
        Self::new()
    }
}
