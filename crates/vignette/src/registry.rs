//! Component registry.
//!
//! This module provides [`Registry`], the map from component id to a lazy
//! [`Loader`] plus [`ComponentMeta`]. The registry never runs loaders itself;
//! resolution and memoization belong to the runtime's resolution cache.
//!
//! # Ordering
//!
//! Entries are listed in registration order. Re-registering an existing id
//! replaces the entry in place; unregistering and registering again moves the
//! id to the end.
//!
//! # Filtering
//!
//! [`ListFilter`] criteria combine conjunctively: an entry is listed only if
//! every criterion that is set passes.
//!
//! ```rust
//! use vignette::registry::{ComponentMeta, ListFilter, Loader, Registry, RegistryEntry};
//!
//! let mut registry: Registry<&'static str> = Registry::new();
//! registry
//!     .register(
//!         RegistryEntry::new("signup", Loader::ready("signup-form")).with_meta(
//!             ComponentMeta::new().category("form").tags(["interactive", "auth"]),
//!         ),
//!     )
//!     .unwrap();
//! registry
//!     .register(
//!         RegistryEntry::new("contact", Loader::ready("contact-form"))
//!             .with_meta(ComponentMeta::new().category("form")),
//!     )
//!     .unwrap();
//!
//! let filter = ListFilter::new().category("form").all_tags(["interactive"]);
//! let ids: Vec<_> = registry.list(&filter).iter().map(|e| e.id().to_string()).collect();
//! assert_eq!(ids, ["signup"]);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BoxError, Error, Result};

type LoadFn<C> =
    dyn Fn() -> BoxFuture<'static, std::result::Result<Option<C>, BoxError>> + Send + Sync;

/// Zero-argument async function producing a component handle.
///
/// A loader that completes with `None` produced no usable handle, which the
/// runtime reports as [`Error::Resolution`].
pub struct Loader<C> {
    load: Arc<LoadFn<C>>,
}

impl<C: Send + 'static> Loader<C> {
    /// Creates a loader from an async closure.
    ///
    /// ```rust
    /// use vignette::registry::Loader;
    ///
    /// let loader: Loader<String> = Loader::new(|| async { Ok("<p>card</p>".to_string()) });
    /// ```
    pub fn new<F, Fut>(load: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<C, BoxError>> + Send + 'static,
    {
        Self::optional(move || load().map(|res| res.map(Some)))
    }

    /// Creates a loader whose result may be missing a handle.
    pub fn optional<F, Fut>(load: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Option<C>, BoxError>> + Send + 'static,
    {
        Self {
            load: Arc::new(move || load().boxed()),
        }
    }

    /// Creates a loader that hands out clones of an existing handle.
    pub fn ready(component: C) -> Self
    where
        C: Clone + Sync,
    {
        Self::new(move || {
            let component = component.clone();
            async move { Ok(component) }
        })
    }

    /// Invokes the loader.
    pub fn load(&self) -> BoxFuture<'static, std::result::Result<Option<C>, BoxError>> {
        (self.load)()
    }
}

impl<C> Clone for Loader<C> {
    fn clone(&self) -> Self {
        Self {
            load: Arc::clone(&self.load),
        }
    }
}

impl<C> fmt::Debug for Loader<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Loader(..)")
    }
}

/// Metadata attached to a registry entry.
///
/// Well-known fields are typed; anything else goes in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Inline stylesheet emitted as a `<style>` block ahead of the markup
    /// when the component is rendered by id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<String>,

    /// Caller-defined fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ComponentMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn styles(mut self, css: impl Into<String>) -> Self {
        self.styles = Some(css.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Returns true if `tag` is one of the entry's tags.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Parses metadata from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// A registered component: id, loader and metadata.
pub struct RegistryEntry<C> {
    id: String,
    loader: Loader<C>,
    meta: ComponentMeta,
}

impl<C> RegistryEntry<C> {
    pub fn new(id: impl Into<String>, loader: Loader<C>) -> Self {
        Self {
            id: id.into(),
            loader,
            meta: ComponentMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: ComponentMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn loader(&self) -> &Loader<C> {
        &self.loader
    }

    pub fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::invalid("component id must be a non-empty string"));
        }
        Ok(())
    }
}

impl<C> Clone for RegistryEntry<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            loader: self.loader.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<C> fmt::Debug for RegistryEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("id", &self.id)
            .field("meta", &self.meta)
            .finish()
    }
}

type Predicate<C> = dyn Fn(&RegistryEntry<C>) -> bool + Send + Sync;

/// Criteria for [`Registry::list`].
///
/// An empty filter matches every entry. Each criterion that is set must pass:
///
/// - `category`: exact match on [`ComponentMeta::category`]
/// - `tag`: the entry carries this tag
/// - `all_tags`: the entry carries every one of these tags
/// - `predicate`: custom test over the whole entry
pub struct ListFilter<C> {
    category: Option<String>,
    tag: Option<String>,
    all_tags: Vec<String>,
    predicate: Option<Arc<Predicate<C>>>,
}

impl<C> Default for ListFilter<C> {
    fn default() -> Self {
        Self {
            category: None,
            tag: None,
            all_tags: Vec::new(),
            predicate: None,
        }
    }
}

impl<C> Clone for ListFilter<C> {
    fn clone(&self) -> Self {
        Self {
            category: self.category.clone(),
            tag: self.tag.clone(),
            all_tags: self.all_tags.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<C> ListFilter<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn all_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.all_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RegistryEntry<C>) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Returns true if `entry` passes every criterion that is set.
    pub fn matches(&self, entry: &RegistryEntry<C>) -> bool {
        let meta = &entry.meta;
        if let Some(category) = &self.category {
            if meta.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !meta.has_tag(tag) {
                return false;
            }
        }
        if !self.all_tags.iter().all(|tag| meta.has_tag(tag)) {
            return false;
        }
        match &self.predicate {
            Some(predicate) => predicate(entry),
            None => true,
        }
    }
}

impl<C> fmt::Debug for ListFilter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListFilter")
            .field("category", &self.category)
            .field("tag", &self.tag)
            .field("all_tags", &self.all_tags)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Ordered map from component id to [`RegistryEntry`].
pub struct Registry<C> {
    entries: IndexMap<String, RegistryEntry<C>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry, replacing any entry with the same id.
    ///
    /// Returns the replaced entry, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the id is empty.
    pub fn register(&mut self, entry: RegistryEntry<C>) -> Result<Option<RegistryEntry<C>>> {
        entry.validate()?;
        Ok(self.entries.insert(entry.id.clone(), entry))
    }

    /// Registers a batch of entries.
    ///
    /// Every entry is validated before any is applied; one malformed entry
    /// rejects the whole batch and leaves the registry untouched.
    ///
    /// Returns the ids that replaced an existing entry.
    pub fn register_many<I>(&mut self, entries: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = RegistryEntry<C>>,
    {
        let entries: Vec<_> = entries.into_iter().collect();
        for (index, entry) in entries.iter().enumerate() {
            entry
                .validate()
                .map_err(|err| Error::invalid(format!("entry {}: {}", index, err)))?;
        }

        let mut replaced = Vec::new();
        for entry in entries {
            let id = entry.id.clone();
            if self.entries.insert(id.clone(), entry).is_some() {
                replaced.push(id);
            }
        }
        Ok(replaced)
    }

    /// Removes an entry. Returns false if the id was not registered.
    pub fn unregister(&mut self, id: &str) -> bool {
        self.entries.shift_remove(id).is_some()
    }

    pub fn has(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&RegistryEntry<C>> {
        self.entries.get(id)
    }

    /// Lists entries passing `filter`, in registration order.
    pub fn list(&self, filter: &ListFilter<C>) -> Vec<RegistryEntry<C>> {
        self.entries
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    /// All entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry<C>> {
        self.entries.values()
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    /// Distinct categories, in order of first appearance.
    pub fn categories(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for category in self.entries.values().filter_map(|e| e.meta.category.as_ref()) {
            if !seen.contains(category) {
                seen.push(category.clone());
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("ids", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
