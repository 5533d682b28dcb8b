//! Error types for the component runtime.
//!
//! This module provides [`Error`], the single error type returned by every
//! runtime operation, and [`EngineError`], the error a [`RenderEngine`] reports
//! across the engine boundary.
//!
//! Every variant names the offending component id or service name, so a
//! failure can be diagnosed without inspecting runtime internals.
//!
//! `Error` is `Clone`: when several callers are waiting on the same in-flight
//! build, each of them receives the same failure.
//!
//! [`RenderEngine`]: crate::engine::RenderEngine

use std::fmt;
use std::sync::Arc;

/// Boxed error returned by component loaders and service factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared form of [`BoxError`], cheap to clone across waiters.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What kind of name a [`Error::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    /// A component id in the registry.
    Component,
    /// A service name in the service locator.
    Service,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKind::Component => f.write_str("component"),
            LookupKind::Service => f.write_str("service"),
        }
    }
}

/// Error type for runtime operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Malformed registration input (empty id, empty service name, non-object
    /// context or props).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown component id or service name.
    #[error("{kind} not found: \"{name}\"")]
    NotFound {
        /// Whether a component or a service was requested.
        kind: LookupKind,
        /// The id or name that was requested.
        name: String,
    },

    /// The loader ran but did not produce a usable component handle.
    #[error("failed to resolve component \"{id}\": {reason}")]
    Resolution {
        /// The component id being resolved.
        id: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The rendering engine failed.
    #[error("render error{}: {source}", component_suffix(.component))]
    Render {
        /// Registry id of the component, when rendering by id.
        component: Option<String>,
        /// The engine's error, passed through verbatim.
        #[source]
        source: EngineError,
    },

    /// A service factory failed. Nothing is cached; the next `get` retries.
    #[error("failed to build service \"{name}\": {source}")]
    ServiceBuild {
        /// The service name.
        name: String,
        /// The factory's error.
        #[source]
        source: SharedError,
    },

    /// A service instance exists but is not of the requested type.
    #[error("service \"{name}\" is not a {expected}")]
    ServiceType {
        /// The service name.
        name: String,
        /// The requested type name.
        expected: &'static str,
    },

    /// Configuration text could not be parsed.
    #[error("config error: {0}")]
    Config(String),
}

fn component_suffix(component: &Option<String>) -> String {
    match component {
        Some(id) => format!(" in \"{}\"", id),
        None => String::new(),
    }
}

impl Error {
    /// Creates an [`Error::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn component_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: LookupKind::Component,
            name: id.into(),
        }
    }

    pub(crate) fn service_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: LookupKind::Service,
            name: name.into(),
        }
    }

    /// Returns true for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Protocol status an adapter should answer with.
    ///
    /// Unknown ids and services map to 404; every other failure maps to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Error reported by a [`RenderEngine`](crate::engine::RenderEngine).
///
/// Engines may be backed by anything, so this type carries a message plus an
/// optional underlying cause.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
    #[source]
    source: Option<SharedError>,
}

impl EngineError {
    /// Creates an engine error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying cause, using its display text as the message.
    pub fn from_source(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<minijinja::Error> for EngineError {
    fn from(err: minijinja::Error) -> Self {
        EngineError::from_source(err)
    }
}
