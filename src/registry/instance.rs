//! # Handler Instances
//!
//! A [`HandlerInstance`] is the registry's handle over one handler or pipeline-stage object.
//! Besides the object itself it carries one [`CapabilityView`] per declared capability: the
//! object seen through that capability's trait, plus the call entry point monomorphized for
//! it. The views are the explicit registration table the invoker compiler reads; they are
//! produced by the generic [`InstanceBuilder`] methods, the one place where the handler,
//! message and response types are all statically known.

use crate::dispatch::capability::{Capability, CapabilityKey};
use crate::dispatch::invoker::{self, EntryPoint};
use crate::dispatch::type_key::TypeKey;
use crate::handlers::{
    CommandHandler, CommandPipeline, EventHandler, EventPipeline, RequestHandler, RequestPipeline,
};
use crate::message::{Message, Payload, Response};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The handler object as seen through one capability
pub struct CapabilityView {
    shape: CapabilityKey,
    target: Box<Payload>,
    entry: Option<EntryPoint>,
}

impl CapabilityView {
    /// Capability this view was built for
    pub fn shape(&self) -> &CapabilityKey {
        &self.shape
    }

    /// The object behind the capability's trait, e.g. an `Arc<dyn CommandHandler<C>>`
    pub fn target(&self) -> &Payload {
        self.target.as_ref()
    }

    /// Call entry point; `None` for marker capabilities that cannot be invoked directly
    pub fn entry_point(&self) -> Option<EntryPoint> {
        self.entry
    }
}

struct InstanceInner {
    type_key: TypeKey,
    concrete: Arc<Payload>,
    views: HashMap<CapabilityKey, CapabilityView>,
    declared: Vec<CapabilityKey>,
}

/// Shared handle over a registered handler or pipeline stage
#[derive(Clone)]
pub struct HandlerInstance {
    inner: Arc<InstanceInner>,
}

impl HandlerInstance {
    /// Start declaring the capabilities served by `handler`
    pub fn builder<H: Send + Sync + 'static>(handler: H) -> InstanceBuilder<H> {
        InstanceBuilder::from_arc(Arc::new(handler))
    }

    /// Concrete type of the wrapped object
    pub fn type_key(&self) -> TypeKey {
        self.inner.type_key
    }

    /// The wrapped object as its concrete type
    pub fn concrete(&self) -> &Payload {
        self.inner.concrete.as_ref()
    }

    pub fn downcast_ref<H: 'static>(&self) -> Option<&H> {
        self.inner.concrete.downcast_ref::<H>()
    }

    pub fn view(&self, key: &CapabilityKey) -> Option<&CapabilityView> {
        self.inner.views.get(key)
    }

    pub fn implements(&self, key: &CapabilityKey) -> bool {
        self.inner.views.contains_key(key)
    }

    /// Declared capabilities in declaration order
    pub fn declared(&self) -> &[CapabilityKey] {
        &self.inner.declared
    }

    /// Whether both handles refer to the same object
    pub fn same_instance(&self, other: &HandlerInstance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for HandlerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let declared: Vec<String> = self
            .inner
            .declared
            .iter()
            .map(|key| Capability::new(*key).to_string())
            .collect();
        f.debug_struct("HandlerInstance")
            .field("type", &self.inner.type_key.friendly_name())
            .field("declared", &declared)
            .finish()
    }
}

/// Collects the capability views of one handler object.
///
/// Declaring the same capability twice keeps the first declaration.
pub struct InstanceBuilder<H> {
    handler: Arc<H>,
    views: HashMap<CapabilityKey, CapabilityView>,
    declared: Vec<CapabilityKey>,
}

impl<H: Send + Sync + 'static> InstanceBuilder<H> {
    /// Builder over an already shared object
    pub fn from_arc(handler: Arc<H>) -> Self {
        Self {
            handler,
            views: HashMap::new(),
            declared: Vec::new(),
        }
    }

    fn declare(
        mut self,
        shape: CapabilityKey,
        target: Box<Payload>,
        entry: Option<EntryPoint>,
    ) -> Self {
        if !self.views.contains_key(&shape) {
            self.declared.push(shape);
            self.views.insert(
                shape,
                CapabilityView {
                    shape,
                    target,
                    entry,
                },
            );
        }
        self
    }

    pub fn command<C: Message>(self) -> Self
    where
        H: CommandHandler<C>,
    {
        let view: Arc<dyn CommandHandler<C>> = self.handler.clone();
        self.declare(
            CapabilityKey::CommandHandler {
                command: TypeKey::of::<C>(),
            },
            Box::new(view),
            Some(EntryPoint::Handler(invoker::invoke_command::<C>)),
        )
    }

    pub fn event<E: Message>(self) -> Self
    where
        H: EventHandler<E>,
    {
        let view: Arc<dyn EventHandler<E>> = self.handler.clone();
        self.declare(
            CapabilityKey::EventHandler {
                event: TypeKey::of::<E>(),
            },
            Box::new(view),
            Some(EntryPoint::Handler(invoker::invoke_event::<E>)),
        )
    }

    /// Declares `RequestHandler<Q, R>` and the response-agnostic marker for `Q`
    pub fn request<Q: Message, R: Response>(self) -> Self
    where
        H: RequestHandler<Q, R>,
    {
        let view: Arc<dyn RequestHandler<Q, R>> = self.handler.clone();
        self.declare(
            CapabilityKey::RequestHandler {
                request: TypeKey::of::<Q>(),
                response: TypeKey::of::<R>(),
            },
            Box::new(view),
            Some(EntryPoint::Handler(invoker::invoke_request::<Q, R>)),
        )
        .accepts::<Q>()
    }

    /// Declares that requests of type `D` are routed to this handler.
    ///
    /// Use it for request types the handler only serves through one of their ancestors.
    pub fn accepts<D: Message>(self) -> Self {
        let target = Box::new(self.handler.clone());
        self.declare(
            CapabilityKey::AnyRequestHandler {
                request: TypeKey::of::<D>(),
            },
            target,
            None,
        )
    }

    /// Declares this object as a pipeline stage around command handler `T`
    pub fn command_pipeline<T, C>(self) -> Self
    where
        H: CommandPipeline<T, C>,
        T: CommandHandler<C>,
        C: Message,
    {
        let view: Arc<dyn CommandPipeline<T, C>> = self.handler.clone();
        self.declare(
            CapabilityKey::CommandPipeline {
                handler: TypeKey::of::<T>(),
                command: TypeKey::of::<C>(),
            },
            Box::new(view),
            Some(EntryPoint::Stage(invoker::invoke_command_stage::<T, C>)),
        )
    }

    /// Declares this object as a pipeline stage around event handler `T`
    pub fn event_pipeline<T, E>(self) -> Self
    where
        H: EventPipeline<T, E>,
        T: EventHandler<E>,
        E: Message,
    {
        let view: Arc<dyn EventPipeline<T, E>> = self.handler.clone();
        self.declare(
            CapabilityKey::EventPipeline {
                handler: TypeKey::of::<T>(),
                event: TypeKey::of::<E>(),
            },
            Box::new(view),
            Some(EntryPoint::Stage(invoker::invoke_event_stage::<T, E>)),
        )
    }

    /// Declares this object as a pipeline stage around request handler `T`
    pub fn request_pipeline<T, Q, R>(self) -> Self
    where
        H: RequestPipeline<T, Q, R>,
        T: RequestHandler<Q, R>,
        Q: Message,
        R: Response,
    {
        let view: Arc<dyn RequestPipeline<T, Q, R>> = self.handler.clone();
        self.declare(
            CapabilityKey::RequestPipeline {
                handler: TypeKey::of::<T>(),
                request: TypeKey::of::<Q>(),
                response: TypeKey::of::<R>(),
            },
            Box::new(view),
            Some(EntryPoint::Stage(invoker::invoke_request_stage::<T, Q, R>)),
        )
    }

    pub fn build(self) -> HandlerInstance {
        let concrete: Arc<Payload> = self.handler;
        HandlerInstance {
            inner: Arc::new(InstanceInner {
                type_key: TypeKey::of::<H>(),
                concrete,
                views: self.views,
                declared: self.declared,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerResult;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct Lookup(u32);
    struct Archive;
    struct Directory;

    #[async_trait]
    impl RequestHandler<Lookup, String> for Directory {
        async fn handle(
            &self,
            request: &Lookup,
            _token: CancellationToken,
        ) -> HandlerResult<String> {
            Ok(format!("entry-{}", request.0))
        }
    }

    #[async_trait]
    impl CommandHandler<Archive> for Directory {
        async fn handle(&self, _command: &Archive, _token: CancellationToken) -> HandlerResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_builder_records_declaration_order() {
        let instance = HandlerInstance::builder(Directory)
            .request::<Lookup, String>()
            .command::<Archive>()
            .build();

        let declared = instance.declared();
        assert_eq!(declared.len(), 3);
        assert_eq!(
            declared[0],
            CapabilityKey::RequestHandler {
                request: TypeKey::of::<Lookup>(),
                response: TypeKey::of::<String>(),
            }
        );
        assert_eq!(
            declared[1],
            CapabilityKey::AnyRequestHandler {
                request: TypeKey::of::<Lookup>(),
            }
        );
        assert_eq!(
            declared[2],
            CapabilityKey::CommandHandler {
                command: TypeKey::of::<Archive>(),
            }
        );
        assert_eq!(instance.type_key(), TypeKey::of::<Directory>());
        assert!(instance.downcast_ref::<Directory>().is_some());
    }

    #[test]
    fn test_views_expose_capability_traits() {
        let instance = HandlerInstance::builder(Directory)
            .command::<Archive>()
            .build();
        let key = CapabilityKey::CommandHandler {
            command: TypeKey::of::<Archive>(),
        };

        let view = instance.view(&key).unwrap();
        assert_eq!(view.shape(), &key);
        assert!(view
            .target()
            .downcast_ref::<Arc<dyn CommandHandler<Archive>>>()
            .is_some());
        assert!(matches!(view.entry_point(), Some(EntryPoint::Handler(_))));
    }

    #[test]
    fn test_marker_view_has_no_entry_point() {
        let instance = HandlerInstance::builder(Directory).accepts::<Lookup>().build();
        let key = CapabilityKey::AnyRequestHandler {
            request: TypeKey::of::<Lookup>(),
        };

        assert!(instance.implements(&key));
        assert!(instance.view(&key).unwrap().entry_point().is_none());
    }

    #[test]
    fn test_duplicate_declaration_is_ignored() {
        let instance = HandlerInstance::builder(Directory)
            .command::<Archive>()
            .command::<Archive>()
            .build();

        assert_eq!(instance.declared().len(), 1);
        let clone = instance.clone();
        assert!(clone.same_instance(&instance));
    }
}
