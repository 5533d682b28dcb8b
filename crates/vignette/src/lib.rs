//! # Vignette - Component Rendering Outside the Page Pipeline
//!
//! `vignette` renders registered view components to markup on demand: email
//! bodies, PDF pages, Open Graph images, embeddable widgets, server fragments.
//! It owns the orchestration around rendering and delegates the markup itself
//! to a pluggable [`RenderEngine`].
//!
//! ## Core Concepts
//!
//! - [`Runtime`]: Shared handle over a registry, a resolution cache, a base
//!   context and a service locator
//! - [`RegistryEntry`]: Component id, lazy [`Loader`] and [`ComponentMeta`]
//! - [`RenderContext`]: Locale, channel and free-form keys merged into every render
//! - [`ServiceDefinition`]: Lazily built, memoized auxiliary capability
//! - [`RenderResponse`]: Protocol-neutral status, headers and body
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use vignette::{Loader, MiniJinjaEngine, RegistryEntry, RenderRequest, Runtime, Template};
//!
//! # futures::executor::block_on(async {
//! let runtime = Runtime::new(MiniJinjaEngine::new());
//! runtime
//!     .register(RegistryEntry::new(
//!         "badge",
//!         Loader::ready(Template::new("badge", "<b>{{ label }}</b>")),
//!     ))
//!     .unwrap();
//!
//! let html = runtime
//!     .render_to_string(RenderRequest::new("badge").props(json!({"label": "<new>"})))
//!     .await
//!     .unwrap();
//! assert_eq!(html, "<b>&lt;new&gt;</b>");
//! # });
//! ```
//!
//! ## Isolation
//!
//! Two runtimes never share registries, cached handles or services, even
//! when they register the same component ids.
//!
//! ## Custom Engines
//!
//! Implement [`RenderEngine`] to plug in any other templating system. The
//! engine decides what a component handle is (`type Component`) and receives
//! the props, slots and merged context through [`EngineInput`].

pub mod context;
pub mod engine;
mod error;
mod flight;
pub mod prelude;
pub mod registry;
pub mod resolve;
pub mod response;
pub mod runtime;
pub mod service;

// Error types
pub use error::{BoxError, EngineError, Error, LookupKind, Result, SharedError};

// Context exports
pub use context::{merge, Channel, RenderContext, CHANNEL_KEY, LOCALE_KEY};

// Engine exports
pub use engine::{
    EngineInput, MiniJinjaEngine, Props, RenderEngine, Slots, Template, CONTEXT_PROP, SLOTS_PROP,
};

// Registry exports
pub use registry::{ComponentMeta, ListFilter, Loader, Registry, RegistryEntry};

// Runtime exports
pub use resolve::ResolutionCache;
pub use response::{RenderResponse, ResponseOptions, DEFAULT_CONTENT_TYPE};
pub use runtime::{RenderRequest, Runtime, RuntimeConfig};
pub use service::{ServiceDefinition, ServiceInstance, ServiceLocator};
