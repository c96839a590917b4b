//! # Messages
//!
//! Marker traits for routable messages and responses, and the type-erased envelope the
//! dispatcher carries them in.

use crate::dispatch::type_key::TypeKey;
use std::any::Any;
use std::fmt;

/// Any value the dispatcher can route: commands, events and requests.
pub trait Message: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Message for T {}

/// Any value a request handler can produce
pub trait Response: Send + 'static {}

impl<T: Send + 'static> Response for T {}

/// Type-erased borrowed value as seen by call adapters
pub type Payload = dyn Any + Send + Sync;

/// Type-erased response returned by request dispatch
pub type BoxedResponse = Box<dyn Any + Send>;

/// A message whose static type has been erased.
///
/// The envelope remembers the runtime type so the dispatcher can route without knowing it.
pub struct MessageEnvelope {
    type_key: TypeKey,
    payload: Box<Payload>,
}

impl MessageEnvelope {
    pub fn new<M: Message>(message: M) -> Self {
        Self {
            type_key: TypeKey::of::<M>(),
            payload: Box::new(message),
        }
    }

    /// Runtime type of the wrapped message
    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    pub fn payload(&self) -> &Payload {
        self.payload.as_ref()
    }

    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.payload.downcast_ref::<M>()
    }

    /// Take the message back out, returning the envelope unchanged on a type mismatch
    pub fn into_inner<M: Message>(self) -> Result<M, Self> {
        if self.type_key != TypeKey::of::<M>() {
            return Err(self);
        }
        let type_key = self.type_key;
        self.payload
            .downcast::<M>()
            .map(|message| *message)
            .map_err(|payload| Self { type_key, payload })
    }
}

impl fmt::Debug for MessageEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEnvelope")
            .field("type", &self.type_key.friendly_name())
            .finish_non_exhaustive()
    }
}
