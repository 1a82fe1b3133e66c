//! Actor Error Types
//!
//! Error taxonomy shared by every dispatch path: proxies, shells, signals,
//! tasks, timers and pools.

use crate::registry::{ActorId, InstanceId};
use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Shared error source; `Arc` keeps the error cloneable for exit notices
pub type ErrorSource = Arc<dyn StdError + Send + Sync>;

/// Main actor runtime error type
#[derive(Error, Debug, Clone)]
pub enum ActorError {
    /// The actor was destroyed before or during the call
    #[error("Dead actor: {actor} (instance: {instance:?})")]
    Dead {
        actor: ActorId,
        instance: Option<InstanceId>,
    },

    /// Wrapped failure that bypasses supervision; callers see the inner error
    #[error("Aborted: {0}")]
    Abort(Box<ActorError>),

    /// Diagnostic watchdog expiry
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Failure raised by actor code
    #[error("Actor failure: {message}")]
    Failed {
        message: String,
        #[source]
        source: Option<ErrorSource>,
    },

    /// Panic caught at a dispatch boundary
    #[error("Actor panicked: {message}")]
    Panicked { message: String },

    /// A signal, task or timer was torn down while in use
    #[error("Closed: {resource}")]
    Closed { resource: String },

    /// The factory could not produce an instance
    #[error("Build error: {type_name}: {message}")]
    Build { type_name: String, message: String },

    /// Runtime configuration could not be loaded
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },
}

/// Result type alias for actor operations
pub type Result<T> = std::result::Result<T, ActorError>;

impl ActorError {
    /// Create an actor failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an actor failure with source
    pub fn failed_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Failed {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Wrap an error so it reaches the caller without triggering supervision
    pub fn abort(inner: ActorError) -> Self {
        Self::Abort(Box::new(inner))
    }

    /// Create a watchdog timeout
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a closed-resource error
    pub fn closed(resource: impl Into<String>) -> Self {
        Self::Closed {
            resource: resource.into(),
        }
    }

    /// Create a build error
    pub fn build(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Build {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            field,
        }
    }

    /// Convert a caught panic payload into an error
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Panicked { message }
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, Self::Dead { .. })
    }

    /// Whether this is the `Dead` error of the given actor
    pub fn is_dead_for(&self, id: &ActorId) -> bool {
        matches!(self, Self::Dead { actor, .. } if actor == id)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Errors that travel back to the caller without feeding supervision
    pub(crate) fn bypasses_supervision(&self) -> bool {
        matches!(self, Self::Dead { .. } | Self::Timeout { .. } | Self::Abort(_))
    }

    /// Strip every layer of `Abort`
    pub(crate) fn unwrap_abort(self) -> Self {
        match self {
            Self::Abort(inner) => inner.unwrap_abort(),
            other => other,
        }
    }
}

impl From<anyhow::Error> for ActorError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{err:#}");
        let source: Box<dyn StdError + Send + Sync> = err.into();
        Self::Failed {
            message,
            source: Some(Arc::from(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_unwraps_every_layer() {
        let err = ActorError::abort(ActorError::abort(ActorError::failed("boom")));
        match err.unwrap_abort() {
            ActorError::Failed { message, .. } => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_panic_payload_messages() {
        let err = ActorError::from_panic(Box::new("static message"));
        assert!(matches!(err, ActorError::Panicked { ref message } if message == "static message"));

        let err = ActorError::from_panic(Box::new(String::from("owned")));
        assert!(matches!(err, ActorError::Panicked { ref message } if message == "owned"));

        let err = ActorError::from_panic(Box::new(7_u8));
        assert!(matches!(err, ActorError::Panicked { ref message } if message == "unknown panic"));
    }

    #[test]
    fn test_dead_identity() {
        let mine = ActorId::new();
        let other = ActorId::new();
        let err = ActorError::Dead {
            actor: mine.clone(),
            instance: None,
        };
        assert!(err.is_dead_for(&mine));
        assert!(!err.is_dead_for(&other));
        assert!(err.bypasses_supervision());
    }

    #[test]
    fn test_anyhow_conversion_keeps_source() {
        let err: ActorError = anyhow::anyhow!("disk full").context("flush failed").into();
        match &err {
            ActorError::Failed { message, source } => {
                assert!(message.contains("flush failed"));
                assert!(message.contains("disk full"));
                assert!(source.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.source().is_some());
    }
}
