//! Rendering engine boundary.
//!
//! This module defines the [`RenderEngine`] trait, the only way the runtime
//! produces markup. The runtime never inspects a component handle; it hands the
//! handle, the props, the slots and the merged context to the engine and returns
//! whatever string comes back.
//!
//! The default implementation is [`MiniJinjaEngine`], whose component handle is
//! a [`Template`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use minijinja::{AutoEscape, Environment, Value};
use serde_json::Map;

use crate::context::RenderContext;
use crate::error::EngineError;

/// Reserved prop under which the merged context is injected.
pub const CONTEXT_PROP: &str = "__context";

/// Reserved prop under which named slots are injected.
pub const SLOTS_PROP: &str = "__slots";

/// Named markup fragments passed into a component.
pub type Slots = BTreeMap<String, String>;

/// Props passed to a component.
pub type Props = Map<String, serde_json::Value>;

/// Everything an engine receives besides the component handle.
#[derive(Debug, Clone, Copy)]
pub struct EngineInput<'a> {
    pub props: &'a Props,
    pub slots: &'a Slots,
    /// Base context merged with the per-call override.
    pub context: &'a RenderContext,
}

impl EngineInput<'_> {
    /// Props with the context and slots injected under the reserved keys.
    ///
    /// Reserved keys replace same-named props.
    pub fn to_template_data(&self) -> serde_json::Value {
        let mut data = self.props.clone();
        data.insert(CONTEXT_PROP.to_string(), self.context.to_value());
        data.insert(
            SLOTS_PROP.to_string(),
            serde_json::to_value(self.slots).unwrap_or_default(),
        );
        serde_json::Value::Object(data)
    }
}

/// An external template-rendering engine.
///
/// Implementations turn a component handle plus [`EngineInput`] into markup.
/// Failures are reported as [`EngineError`] and propagated to the caller
/// unchanged.
#[async_trait]
pub trait RenderEngine: Send + Sync + 'static {
    /// Opaque handle produced by component loaders.
    type Component: Send + Sync + 'static;

    /// Renders a component to markup.
    async fn render(
        &self,
        component: &Self::Component,
        input: EngineInput<'_>,
    ) -> Result<String, EngineError>;
}

/// A named Jinja template, the component handle of [`MiniJinjaEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    source: String,
}

impl Template {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// MiniJinja-based engine.
///
/// Output is HTML auto-escaped; mark trusted fragments with `|safe`. Props
/// are top-level variables, the merged context is `__context` and slots are
/// `__slots`.
///
/// # Example
///
/// ```rust
/// use vignette::engine::{MiniJinjaEngine, Template};
/// use vignette::Runtime;
///
/// # futures::executor::block_on(async {
/// let runtime = Runtime::new(MiniJinjaEngine::new());
/// let hello = Template::new("hello", "<p>Hello, {{ name }} ({{ __context.channel }})</p>");
///
/// let html = runtime
///     .render_component(&hello, &serde_json::json!({"name": "Ada"}), None)
///     .await
///     .unwrap();
/// assert_eq!(html, "<p>Hello, Ada (web)</p>");
/// # });
/// ```
pub struct MiniJinjaEngine {
    env: Environment<'static>,
}

impl MiniJinjaEngine {
    /// Creates an engine with HTML auto-escaping for every template.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        Self { env }
    }

    /// Returns the underlying MiniJinja environment.
    pub fn environment(&self) -> &Environment<'static> {
        &self.env
    }

    /// Returns the underlying MiniJinja environment for registering filters,
    /// functions or shared templates.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }
}

impl Default for MiniJinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenderEngine for MiniJinjaEngine {
    type Component = Template;

    async fn render(
        &self,
        component: &Template,
        input: EngineInput<'_>,
    ) -> Result<String, EngineError> {
        let data = Value::from_serialize(input.to_template_data());
        Ok(self
            .env
            .render_named_str(&component.name, &component.source, data)?)
    }
}
