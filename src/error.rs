//! # Dispatch Error Types
//!
//! Error taxonomy for the dispatch core. Every variant except [`DispatchError::Handler`]
//! describes a programmer or configuration defect; none of them are retried by this layer.

use crate::dispatch::capability::Capability;
use crate::dispatch::type_key::TypeKey;
use thiserror::Error;

/// Error type produced by handlers and pipeline stages.
///
/// Handlers return whatever error they like; the dispatcher forwards it untouched.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by handlers, pipeline stages and continuations
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// Result returned by dispatcher operations
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No handler registered for {capability}")]
    MissingHandler { capability: Capability },

    #[error("{count} handlers registered for {capability}, expected exactly one")]
    AmbiguousRegistration { capability: Capability, count: usize },

    #[error("No matching handler could be found for {request_type} in {handler_type}")]
    NoMatchingHandler {
        request_type: TypeKey,
        handler_type: TypeKey,
    },

    #[error(
        "Ambiguous handler match for {request_type} in {handler_type}: {candidates:?} are all at distance {distance}"
    )]
    AmbiguousMatch {
        request_type: TypeKey,
        handler_type: TypeKey,
        distance: usize,
        candidates: Vec<String>,
    },

    #[error("Precondition violated: {reason}")]
    PreconditionViolation { reason: String },

    #[error("Unable to compile call adapter for {capability}: {reason}")]
    CompilationFailure {
        capability: Capability,
        reason: String,
    },

    #[error("Type mismatch in {context}: expected {expected}")]
    TypeMismatch {
        context: &'static str,
        expected: &'static str,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Handler(HandlerError),
}

impl DispatchError {
    pub(crate) fn type_mismatch<T: ?Sized>(context: &'static str) -> Self {
        DispatchError::TypeMismatch {
            context,
            expected: std::any::type_name::<T>(),
        }
    }

    /// Whether the error came out of a handler or stage rather than out of the dispatcher
    pub fn is_handler_error(&self) -> bool {
        matches!(self, DispatchError::Handler(_))
    }
}

/// Errors raised inside type-erased adapters travel as [`HandlerError`]. Recover the
/// original dispatch error when there is one, otherwise the handler's error is kept as is.
impl From<HandlerError> for DispatchError {
    fn from(error: HandlerError) -> Self {
        match error.downcast::<DispatchError>() {
            Ok(dispatch_error) => *dispatch_error,
            Err(other) => DispatchError::Handler(other),
        }
    }
}

impl From<config::ConfigError> for DispatchError {
    fn from(error: config::ConfigError) -> Self {
        DispatchError::Configuration(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("payment declined")]
    struct PaymentDeclined;

    #[test]
    fn test_handler_error_is_kept_unchanged() {
        let error: HandlerError = Box::new(PaymentDeclined);
        let dispatch_error = DispatchError::from(error);

        assert!(dispatch_error.is_handler_error());
        assert_eq!(dispatch_error.to_string(), "payment declined");
        match dispatch_error {
            DispatchError::Handler(inner) => {
                assert!(inner.downcast_ref::<PaymentDeclined>().is_some())
            }
            other => panic!("Expected Handler error, got {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_error_round_trips_through_handler_error() {
        let error: HandlerError = Box::new(DispatchError::type_mismatch::<u32>("request payload"));
        match DispatchError::from(error) {
            DispatchError::TypeMismatch { context, expected } => {
                assert_eq!(context, "request payload");
                assert_eq!(expected, "u32");
            }
            other => panic!("Expected TypeMismatch, got {other:?}"),
        }
    }
}
