//! Convenient imports for setting up and using a runtime.
//!
//! ```rust
//! use vignette::prelude::*;
//!
//! let runtime = Runtime::new(MiniJinjaEngine::new());
//! assert_eq!(runtime.base_context().channel(), Some(&Channel::Web));
//! ```

pub use crate::context::{Channel, RenderContext};
pub use crate::engine::{MiniJinjaEngine, RenderEngine, Template};
pub use crate::error::{Error, Result};
pub use crate::registry::{ComponentMeta, ListFilter, Loader, RegistryEntry};
pub use crate::response::{RenderResponse, ResponseOptions};
pub use crate::runtime::{RenderRequest, Runtime, RuntimeConfig};
pub use crate::service::ServiceDefinition;
