//! The runtime: registry, resolution, context and services behind one handle.
//!
//! [`Runtime`] is the public surface of the crate. It answers "render this
//! component (or this registered id) with these props, in this context",
//! delegating the markup itself to a [`RenderEngine`].
//!
//! ```text
//! render_to_string(id)
//!   → registry lookup        (NotFound if absent)
//!   → resolution cache       (loader runs once per id)
//!   → merge(base, override)  (later keys win)
//!   → engine.render          (RenderError on failure)
//!   → <style> prefix         (if the entry carries inline styles)
//! ```
//!
//! A `Runtime` is a cheap handle; clones share the same registry, caches,
//! base context and services. Independently constructed runtimes share
//! nothing.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use vignette::engine::{MiniJinjaEngine, Template};
//! use vignette::registry::{ComponentMeta, Loader, RegistryEntry};
//! use vignette::{Channel, RenderContext, RenderRequest, Runtime, RuntimeConfig};
//!
//! # futures::executor::block_on(async {
//! let config = RuntimeConfig::new()
//!     .with_base_context(RenderContext::new().with_channel(Channel::Email).with_locale("en"))
//!     .with_component(
//!         RegistryEntry::new(
//!             "greeting",
//!             Loader::new(|| async {
//!                 Ok(Template::new("greeting", "<h1>Hi {{ name }}</h1>{{ __context.locale }}"))
//!             }),
//!         )
//!         .with_meta(ComponentMeta::new().category("email").styles("h1{margin:0}")),
//!     );
//! let runtime = Runtime::with_config(MiniJinjaEngine::new(), config).unwrap();
//!
//! let html = runtime
//!     .render_to_string(
//!         RenderRequest::new("greeting")
//!             .props(json!({"name": "Ada"}))
//!             .context(RenderContext::new().with_locale("de")),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(html, "<style>h1{margin:0}</style><h1>Hi Ada</h1>de");
//! # });
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::context::{self, json_kind, RenderContext};
use crate::engine::{EngineInput, Props, RenderEngine, Slots};
use crate::error::{Error, Result};
use crate::registry::{ListFilter, Registry, RegistryEntry};
use crate::resolve::ResolutionCache;
use crate::response::{RenderResponse, ResponseOptions};
use crate::service::{ServiceDefinition, ServiceInstance, ServiceLocator};

/// Construction-time configuration. Every field is optional.
///
/// Omitting the base context yields [`RenderContext::default_base`]
/// (`channel = web`, no locale).
pub struct RuntimeConfig<E: RenderEngine> {
    pub base_context: Option<RenderContext>,
    pub components: Vec<RegistryEntry<E::Component>>,
    pub services: Vec<ServiceDefinition<E>>,
}

impl<E: RenderEngine> Default for RuntimeConfig<E> {
    fn default() -> Self {
        Self {
            base_context: None,
            components: Vec::new(),
            services: Vec::new(),
        }
    }
}

impl<E: RenderEngine> RuntimeConfig<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_context(mut self, context: RenderContext) -> Self {
        self.base_context = Some(context);
        self
    }

    pub fn with_component(mut self, entry: RegistryEntry<E::Component>) -> Self {
        self.components.push(entry);
        self
    }

    pub fn with_components<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = RegistryEntry<E::Component>>,
    {
        self.components.extend(entries);
        self
    }

    pub fn with_service(mut self, definition: ServiceDefinition<E>) -> Self {
        self.services.push(definition);
        self
    }
}

impl<E: RenderEngine> fmt::Debug for RuntimeConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("base_context", &self.base_context)
            .field("components", &self.components)
            .field("services", &self.services)
            .finish()
    }
}

/// A request to render a registered component by id.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub component_id: String,
    /// Must be a JSON object or null.
    pub props: Value,
    /// Per-call override, merged over the base context.
    pub context: Option<RenderContext>,
    pub slots: Slots,
}

impl RenderRequest {
    pub fn new(component_id: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            props: Value::Null,
            context: None,
            slots: Slots::new(),
        }
    }

    pub fn props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }

    /// Sets a single prop, turning null props into an object.
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if self.props.is_null() {
            self.props = Value::Object(Props::new());
        }
        if let Value::Object(map) = &mut self.props {
            map.insert(key.into(), value.into());
        }
        self
    }

    pub fn context(mut self, context: RenderContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn slot(mut self, name: impl Into<String>, markup: impl Into<String>) -> Self {
        self.slots.insert(name.into(), markup.into());
        self
    }
}

struct Inner<E: RenderEngine> {
    engine: E,
    registry: RwLock<Registry<E::Component>>,
    resolutions: ResolutionCache<E::Component>,
    services: ServiceLocator<E>,
    base_context: RwLock<RenderContext>,
}

/// Shared handle to a component runtime.
pub struct Runtime<E: RenderEngine> {
    inner: Arc<Inner<E>>,
}

impl<E: RenderEngine> Clone for Runtime<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: RenderEngine> Runtime<E> {
    /// Creates a runtime with no components, no services and the default
    /// base context.
    pub fn new(engine: E) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                registry: RwLock::new(Registry::new()),
                resolutions: ResolutionCache::new(),
                services: ServiceLocator::new(),
                base_context: RwLock::new(RenderContext::default_base()),
            }),
        }
    }

    /// Creates a runtime from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if any component or service is
    /// malformed; nothing is registered in that case.
    pub fn with_config(engine: E, config: RuntimeConfig<E>) -> Result<Self> {
        let RuntimeConfig {
            base_context,
            components,
            services,
        } = config;

        for (index, definition) in services.iter().enumerate() {
            definition
                .validate()
                .map_err(|err| Error::invalid(format!("service {}: {}", index, err)))?;
        }

        let runtime = Self::new(engine);
        runtime.register_many(components)?;
        for definition in services {
            runtime.register_service(definition)?;
        }
        if let Some(base) = base_context {
            runtime.set_base_context(base);
        }
        Ok(runtime)
    }

    /// The rendering engine.
    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Registers a component, replacing any entry with the same id.
    ///
    /// A replaced id loses its resolved handle; the next render loads it
    /// from the new loader.
    pub fn register(&self, entry: RegistryEntry<E::Component>) -> Result<()> {
        let id = entry.id().to_string();
        let replaced = self.inner.registry.write().register(entry)?.is_some();
        if replaced {
            self.inner.resolutions.invalidate(Some(&id));
        }
        debug!(component = %id, replaced, "registered component");
        Ok(())
    }

    /// Registers a batch of components. One malformed entry rejects the
    /// whole batch.
    pub fn register_many<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = RegistryEntry<E::Component>>,
    {
        let replaced = self.inner.registry.write().register_many(entries)?;
        for id in &replaced {
            self.inner.resolutions.invalidate(Some(id));
        }
        debug!(replaced = replaced.len(), "registered component batch");
        Ok(())
    }

    /// Removes a component and its resolved handle. Returns false if the id
    /// was not registered.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.inner.registry.write().unregister(id);
        if removed {
            self.inner.resolutions.invalidate(Some(id));
            debug!(component = %id, "unregistered component");
        }
        removed
    }

    pub fn has(&self, id: &str) -> bool {
        self.inner.registry.read().has(id)
    }

    pub fn get(&self, id: &str) -> Option<RegistryEntry<E::Component>> {
        self.inner.registry.read().get(id).cloned()
    }

    /// Lists registered components passing `filter`, in registration order.
    ///
    /// The filter runs on a snapshot taken after the registry lock is
    /// released, so a predicate may call back into the runtime.
    pub fn list(&self, filter: &ListFilter<E::Component>) -> Vec<RegistryEntry<E::Component>> {
        let snapshot: Vec<_> = self.inner.registry.read().iter().cloned().collect();
        snapshot
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .collect()
    }

    /// Every registered component, in registration order.
    pub fn components(&self) -> Vec<RegistryEntry<E::Component>> {
        self.list(&ListFilter::new())
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolves a registered id to its component handle.
    pub async fn resolve(&self, id: &str) -> Result<Arc<E::Component>> {
        let entry = self.get(id).ok_or_else(|| Error::component_not_found(id))?;
        self.inner.resolutions.resolve(&entry).await
    }

    /// Evicts one resolved handle (for example after a hot reload), or every
    /// handle when `id` is `None`.
    pub fn invalidate(&self, id: Option<&str>) {
        self.inner.resolutions.invalidate(id);
    }

    pub fn clear_cache(&self) {
        self.invalidate(None);
    }

    pub fn is_resolved(&self, id: &str) -> bool {
        self.inner.resolutions.is_resolved(id)
    }

    // ========================================================================
    // Context
    // ========================================================================

    /// A copy of the base context.
    pub fn base_context(&self) -> RenderContext {
        self.inner.base_context.read().clone()
    }

    /// Replaces the base context wholesale.
    pub fn set_base_context(&self, context: RenderContext) {
        *self.inner.base_context.write() = context;
    }

    /// Replaces the base context from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `value` is not an object; the
    /// base context is left unchanged.
    pub fn set_base_context_value(&self, value: Value) -> Result<()> {
        let context = RenderContext::from_value(value)?;
        self.set_base_context(context);
        Ok(())
    }

    /// Merges the base context with a per-call override.
    pub fn merge_context(&self, overrides: Option<&RenderContext>) -> RenderContext {
        let base = self.inner.base_context.read();
        context::merge([Some(&*base), overrides])
    }

    // ========================================================================
    // Services
    // ========================================================================

    /// Registers a service. Re-registering a name discards its memoized
    /// instance.
    pub fn register_service(&self, definition: ServiceDefinition<E>) -> Result<()> {
        self.inner.services.register(definition)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.inner.services.has(name)
    }

    pub fn service_names(&self) -> Vec<String> {
        self.inner.services.names()
    }

    /// Returns the service instance for `name`, building it on first use.
    pub async fn get_service<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        self.inner.services.get_typed::<T>(name, self).await
    }

    /// Returns the type-erased service instance for `name`.
    pub async fn get_service_any(&self, name: &str) -> Result<ServiceInstance> {
        self.inner.services.get(name, self).await
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Renders a component handle directly.
    ///
    /// `props` must serialize to a JSON object (or null for no props).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `props` is not an object
    /// - [`Error::Render`] if the engine fails
    pub async fn render_component<P>(
        &self,
        component: &E::Component,
        props: &P,
        context: Option<&RenderContext>,
    ) -> Result<String>
    where
        P: Serialize + ?Sized,
    {
        let props = props_from_serialize(props)?;
        self.render_with(component, None, &props, &Slots::new(), context)
            .await
    }

    /// Renders a registered component by id.
    ///
    /// If the entry's metadata carries inline styles, the markup is prefixed
    /// with a `<style>` block.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the id is not registered (the engine is not called)
    /// - [`Error::Resolution`] if the loader fails
    /// - [`Error::InvalidArgument`] if the props are not an object
    /// - [`Error::Render`] if the engine fails
    pub async fn render_to_string(&self, request: RenderRequest) -> Result<String> {
        let RenderRequest {
            component_id,
            props,
            context,
            slots,
        } = request;

        let entry = self
            .get(&component_id)
            .ok_or_else(|| Error::component_not_found(&component_id))?;
        let props = props_from_value(props)?;
        let component = self.inner.resolutions.resolve(&entry).await?;

        let markup = self
            .render_with(
                &component,
                Some(&component_id),
                &props,
                &slots,
                context.as_ref(),
            )
            .await?;

        Ok(match entry.meta().styles.as_deref() {
            Some(css) if !css.trim().is_empty() => format!("<style>{}</style>{}", css, markup),
            _ => markup,
        })
    }

    /// Renders a component handle and wraps the markup as a response.
    ///
    /// See [`RenderResponse::new`] for the status, content-type and header
    /// defaults.
    pub async fn render_to_response<P>(
        &self,
        component: &E::Component,
        props: &P,
        options: ResponseOptions,
    ) -> Result<RenderResponse>
    where
        P: Serialize + ?Sized,
    {
        let body = self.render_component(component, props, None).await?;
        Ok(RenderResponse::new(body, options))
    }

    async fn render_with(
        &self,
        component: &E::Component,
        component_id: Option<&str>,
        props: &Props,
        slots: &Slots,
        overrides: Option<&RenderContext>,
    ) -> Result<String> {
        let context = self.merge_context(overrides);
        debug!(
            component = component_id.unwrap_or("<inline>"),
            channel = context.channel().map(|c| c.as_str()).unwrap_or(""),
            locale = context.locale().unwrap_or(""),
            "rendering component"
        );

        let input = EngineInput {
            props,
            slots,
            context: &context,
        };
        self.inner
            .engine
            .render(component, input)
            .await
            .map_err(|source| Error::Render {
                component: component_id.map(str::to_string),
                source,
            })
    }
}

impl<E: RenderEngine> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("registry", &*self.inner.registry.read())
            .field("resolved", &self.inner.resolutions.len())
            .field("services", &self.inner.services)
            .field("base_context", &*self.inner.base_context.read())
            .finish()
    }
}

fn props_from_serialize<P: Serialize + ?Sized>(props: &P) -> Result<Props> {
    let value = serde_json::to_value(props)
        .map_err(|err| Error::invalid(format!("props could not be serialized: {}", err)))?;
    props_from_value(value)
}

fn props_from_value(value: Value) -> Result<Props> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Props::new()),
        other => Err(Error::invalid(format!(
            "props must be an object, got {}",
            json_kind(&other)
        ))),
    }
}
