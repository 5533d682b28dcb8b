//! Lazily constructed, memoized services.
//!
//! A service is any auxiliary capability built on first use by a factory
//! and kept for the life of the runtime: a mailer, an asset manifest, a
//! document composer that renders several components into one page.
//!
//! Factories receive a [`Runtime`] handle so they can call back into
//! rendering and the registry. At most one factory call is in flight per
//! name, and a failed build leaves nothing behind: the next `get` tries again.
//!
//! # Example
//!
//! ```rust
//! use vignette::engine::MiniJinjaEngine;
//! use vignette::service::ServiceDefinition;
//! use vignette::Runtime;
//!
//! struct Clock { now: &'static str }
//!
//! # futures::executor::block_on(async {
//! let runtime = Runtime::new(MiniJinjaEngine::new());
//! runtime
//!     .register_service(ServiceDefinition::new("clock", |_rt| async {
//!         Ok(Clock { now: "2024-01-01" })
//!     }))
//!     .unwrap();
//!
//! let clock = runtime.get_service::<Clock>("clock").await.unwrap();
//! assert_eq!(clock.now, "2024-01-01");
//! # });
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::engine::RenderEngine;
use crate::error::{BoxError, Error, Result, SharedError};
use crate::flight::FlightCache;
use crate::runtime::Runtime;

/// A type-erased service instance.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

type FactoryFn<E> =
    dyn Fn(Runtime<E>) -> BoxFuture<'static, std::result::Result<ServiceInstance, BoxError>>
        + Send
        + Sync;

/// A named service factory.
pub struct ServiceDefinition<E: RenderEngine> {
    name: String,
    factory: Arc<FactoryFn<E>>,
}

impl<E: RenderEngine> ServiceDefinition<E> {
    /// Creates a definition from an async factory returning a concrete type.
    pub fn new<T, F, Fut>(name: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Runtime<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, BoxError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(move |runtime| {
                factory(runtime)
                    .map(|res| res.map(|instance| Arc::new(instance) as ServiceInstance))
                    .boxed()
            }),
        }
    }

    /// Creates a definition that always hands out `instance`.
    pub fn value<T: Send + Sync + 'static>(name: impl Into<String>, instance: T) -> Self {
        let instance: ServiceInstance = Arc::new(instance);
        Self {
            name: name.into(),
            factory: Arc::new(move |_runtime| {
                let instance = Arc::clone(&instance);
                async move { Ok(instance) }.boxed()
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid("service name must be a non-empty string"));
        }
        Ok(())
    }
}

impl<E: RenderEngine> Clone for ServiceDefinition<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<E: RenderEngine> fmt::Debug for ServiceDefinition<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Flat map from service name to factory, plus the memoized instances.
pub struct ServiceLocator<E: RenderEngine> {
    definitions: RwLock<HashMap<String, ServiceDefinition<E>>>,
    instances: FlightCache<ServiceInstance, Error>,
}

impl<E: RenderEngine> ServiceLocator<E> {
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            instances: FlightCache::new(),
        }
    }

    /// Registers a definition.
    ///
    /// Re-registering a name discards its memoized instance; the next `get`
    /// builds from the new factory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the name is empty.
    pub fn register(&self, definition: ServiceDefinition<E>) -> Result<()> {
        definition.validate()?;
        let name = definition.name.clone();
        let replaced = self
            .definitions
            .write()
            .insert(name.clone(), definition)
            .is_some();
        self.instances.invalidate(&name);
        debug!(service = %name, replaced, "registered service");
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }

    /// Registered service names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns true if `name` has a memoized instance.
    pub fn is_built(&self, name: &str) -> bool {
        self.instances.is_ready(name)
    }

    /// Returns the instance for `name`, building it on first use.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if no definition is registered under `name`
    /// - [`Error::ServiceBuild`] if the factory fails
    pub async fn get(&self, name: &str, runtime: &Runtime<E>) -> Result<ServiceInstance> {
        if !self.has(name) {
            return Err(Error::service_not_found(name));
        }

        self.instances
            .get_or_build(name, || async move {
                // Read the factory only once this caller owns the pending
                // slot: a re-registration after this point evicts the slot and
                // the instance built here is handed out but not kept.
                let factory = self.factory(name)?;
                debug!(service = %name, "building service");
                factory(runtime.clone()).await.map_err(|err| {
                    warn!(service = %name, error = %err, "service factory failed");
                    Error::ServiceBuild {
                        name: name.to_string(),
                        source: SharedError::from(err),
                    }
                })
            })
            .await
    }

    fn factory(&self, name: &str) -> Result<Arc<FactoryFn<E>>> {
        self.definitions
            .read()
            .get(name)
            .map(|definition| Arc::clone(&definition.factory))
            .ok_or_else(|| Error::service_not_found(name))
    }

    /// Returns the instance for `name` downcast to `T`.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get), plus [`Error::ServiceType`] if the instance is
    /// not a `T`.
    pub async fn get_typed<T: Send + Sync + 'static>(
        &self,
        name: &str,
        runtime: &Runtime<E>,
    ) -> Result<Arc<T>> {
        let instance = self.get(name, runtime).await?;
        instance.downcast::<T>().map_err(|_| Error::ServiceType {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }
}

impl<E: RenderEngine> Default for ServiceLocator<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: RenderEngine> fmt::Debug for ServiceLocator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceLocator")
            .field("services", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MiniJinjaEngine;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    type Locator = ServiceLocator<MiniJinjaEngine>;

    /// A definition whose first build waits for `gate`; later builds finish
    /// immediately.
    fn gated<T, O>(
        name: &str,
        builds: Arc<AtomicUsize>,
        gate: Arc<Notify>,
        outcome: O,
    ) -> ServiceDefinition<MiniJinjaEngine>
    where
        T: Send + Sync + 'static,
        O: Fn() -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        ServiceDefinition::new(name, move |_rt| {
            let attempt = builds.fetch_add(1, Ordering::SeqCst);
            let gate = gate.clone();
            let result = outcome();
            async move {
                if attempt == 0 {
                    gate.notified().await;
                }
                result
            }
        })
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let locator = Locator::new();
        let err = locator
            .register(ServiceDefinition::value("", 1u8))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(locator.names().is_empty());
    }

    #[test]
    fn test_names_are_sorted() {
        let locator = Locator::new();
        locator.register(ServiceDefinition::value("mailer", 1u8)).unwrap();
        locator.register(ServiceDefinition::value("assets", 2u8)).unwrap();
        assert_eq!(locator.names(), ["assets", "mailer"]);
        assert!(locator.has("assets"));
        assert!(!locator.is_built("assets"));
    }

    #[tokio::test]
    async fn test_concurrent_failure_shared_by_every_caller() {
        let runtime = Runtime::new(MiniJinjaEngine::new());
        let locator = Locator::new();
        let builds = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        locator
            .register(gated::<u32, _>("db", builds.clone(), gate.clone(), || {
                Err("connection refused".into())
            }))
            .unwrap();

        // every caller enters before the gate opens
        let callers = join_all((0..8).map(|_| locator.get("db", &runtime)));
        let release = async {
            gate.notify_one();
        };
        let (results, ()) = futures::join!(callers, release);

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 8);
        for result in results {
            match result {
                Err(Error::ServiceBuild { name, source }) => {
                    assert_eq!(name, "db");
                    assert_eq!(source.to_string(), "connection refused");
                }
                other => panic!("expected service build error, got {:?}", other.map(|_| ())),
            }
        }
        assert!(!locator.is_built("db"));

        // the failure is not cached
        assert!(locator.get("db", &runtime).await.is_err());
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reregister_during_build_is_not_stored() {
        let runtime = Runtime::new(MiniJinjaEngine::new());
        let locator = Locator::new();
        let builds = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        locator
            .register(gated("theme", builds.clone(), gate.clone(), || {
                Ok("v1".to_string())
            }))
            .unwrap();

        let callers = join_all((0..3).map(|_| locator.get_typed::<String>("theme", &runtime)));
        let swap = async {
            locator
                .register(ServiceDefinition::value("theme", "v2".to_string()))
                .unwrap();
            gate.notify_one();
        };
        let (results, ()) = futures::join!(callers, swap);

        // callers already waiting get the build they joined
        for result in results {
            assert_eq!(*result.unwrap(), "v1");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(!locator.is_built("theme"));

        let fresh = locator.get_typed::<String>("theme", &runtime).await.unwrap();
        assert_eq!(*fresh, "v2");
        assert!(locator.is_built("theme"));
    }
}
