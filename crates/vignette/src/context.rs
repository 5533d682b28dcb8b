//! Render context and context merging.
//!
//! A [`RenderContext`] is an open key-value map with two reserved, optional
//! fields: `locale` and `channel`. Contexts are combined with [`merge`], a
//! shallow, left-to-right override: keys present in a later fragment replace
//! keys in an earlier one, absent keys are inherited.
//!
//! Every render merges the runtime's base context first (lowest priority),
//! then the per-call override:
//!
//! ```text
//! base:     { channel: "web", brand: "acme" }
//! override: { locale: "de", brand: "globex" }
//! result:   { channel: "web", locale: "de", brand: "globex" }
//! ```
//!
//! # Example
//!
//! ```rust
//! use vignette::context::{merge, Channel, RenderContext};
//!
//! let base = RenderContext::new().with_channel(Channel::Web);
//! let call = RenderContext::new().with_locale("de");
//!
//! let merged = merge([Some(&base), Some(&call)]);
//! assert_eq!(merged.channel(), Some(&Channel::Web));
//! assert_eq!(merged.locale(), Some("de"));
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Reserved key holding the locale.
pub const LOCALE_KEY: &str = "locale";

/// Reserved key holding the output channel.
pub const CHANNEL_KEY: &str = "channel";

/// Logical output target for a render.
///
/// Channels influence context defaults; they are not separate code paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Web,
    Email,
    Pdf,
    /// Social preview card (Open Graph image or markup).
    Og,
    Widget,
    /// Any caller-defined channel.
    Other(String),
}

impl Channel {
    /// The channel's wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Channel::Web => "web",
            Channel::Email => "email",
            Channel::Pdf => "pdf",
            Channel::Og => "og",
            Channel::Widget => "widget",
            Channel::Other(name) => name,
        }
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        match name {
            "web" => Channel::Web,
            "email" => Channel::Email,
            "pdf" => Channel::Pdf,
            "og" => Channel::Og,
            "widget" => Channel::Widget,
            other => Channel::Other(other.to_string()),
        }
    }
}

impl From<String> for Channel {
    fn from(name: String) -> Self {
        Channel::from(name.as_str())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Channel::from)
    }
}

/// Context passed alongside props to every render.
///
/// `locale` and `channel` are typed; everything else lives in an open map of
/// JSON values. Setting a reserved key through [`insert`](Self::insert) routes
/// it to the typed field, so a context never holds two copies of the same key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<Channel>,
    #[serde(flatten)]
    values: Map<String, Value>,
}

impl RenderContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// The context a runtime starts with when none is configured:
    /// `channel = web`, no locale.
    pub fn default_base() -> Self {
        Self::new().with_channel(Channel::Web)
    }

    /// Parses a context from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `value` is not an object, or if a
    /// reserved key holds something other than a string.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let mut ctx = Self::new();
                for (key, value) in map {
                    ctx.try_insert(key, value)?;
                }
                Ok(ctx)
            }
            other => Err(Error::invalid(format!(
                "context must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parses a context from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parses a context from YAML text.
    ///
    /// ```rust
    /// use vignette::context::{Channel, RenderContext};
    ///
    /// let ctx = RenderContext::from_yaml("channel: email\nlocale: fr\nbrand: acme\n").unwrap();
    /// assert_eq!(ctx.channel(), Some(&Channel::Email));
    /// assert_eq!(ctx.get("brand"), Some(&serde_json::json!("acme")));
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<Channel>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Sets a key, builder style. See [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Sets a key. `locale` and `channel` are routed to the typed fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a reserved key is given a
    /// non-string value; the context is left unchanged.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.try_insert(key.into(), value.into())
    }

    fn try_insert(&mut self, key: String, value: Value) -> Result<()> {
        match key.as_str() {
            LOCALE_KEY => self.locale = Some(reserved_string(&key, value)?),
            CHANNEL_KEY => self.channel = Some(Channel::from(reserved_string(&key, value)?)),
            _ => {
                self.values.insert(key, value);
            }
        }
        Ok(())
    }

    /// Looks up a caller-defined value. Reserved keys are read through
    /// [`locale`](Self::locale) and [`channel`](Self::channel).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns true if `key` is present, reserved keys included.
    pub fn contains_key(&self, key: &str) -> bool {
        match key {
            LOCALE_KEY => self.locale.is_some(),
            CHANNEL_KEY => self.channel.is_some(),
            _ => self.values.contains_key(key),
        }
    }

    /// Number of keys present, reserved keys included.
    pub fn len(&self) -> usize {
        self.values.len() + usize::from(self.locale.is_some()) + usize::from(self.channel.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shallow override: every key present in `other` replaces the one in `self`.
    pub fn extend_from(&mut self, other: &RenderContext) {
        if let Some(locale) = &other.locale {
            self.locale = Some(locale.clone());
        }
        if let Some(channel) = &other.channel {
            self.channel = Some(channel.clone());
        }
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// The context as a flat JSON object, reserved keys included.
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.len());
        if let Some(locale) = &self.locale {
            map.insert(LOCALE_KEY.to_string(), Value::from(locale.as_str()));
        }
        if let Some(channel) = &self.channel {
            map.insert(CHANNEL_KEY.to_string(), Value::from(channel.as_str()));
        }
        for (key, value) in &self.values {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

impl TryFrom<Value> for RenderContext {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl<'de> Deserialize<'de> for RenderContext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RenderContext::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn reserved_string(key: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(Error::invalid(format!(
            "context key \"{}\" must be a string, got {}",
            key,
            json_kind(&other)
        ))),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Merges context fragments left to right; later keys win.
///
/// `None` fragments are skipped. The result holds only keys present in at
/// least one fragment.
pub fn merge<'a, I>(fragments: I) -> RenderContext
where
    I: IntoIterator<Item = Option<&'a RenderContext>>,
{
    let mut merged = RenderContext::new();
    for fragment in fragments.into_iter().flatten() {
        merged.extend_from(fragment);
    }
    merged
}
