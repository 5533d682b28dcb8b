//! Resolution cache for component handles.
//!
//! [`ResolutionCache`] runs a registry entry's loader once per id and keeps
//! the handle until the id is invalidated. Concurrent resolutions of the same
//! id share a single loader call (see [`crate::flight`]).
//!
//! The cache belongs to one runtime; two runtimes that register different
//! loaders under the same id never see each other's handles.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::flight::FlightCache;
use crate::registry::RegistryEntry;

/// Memoized component handles, keyed by component id.
pub struct ResolutionCache<C> {
    handles: FlightCache<Arc<C>, Error>,
}

impl<C: Send + Sync + 'static> ResolutionCache<C> {
    pub fn new() -> Self {
        Self {
            handles: FlightCache::new(),
        }
    }

    /// Resolves `entry` to its component handle.
    ///
    /// The first call for an id invokes the loader; later calls return the
    /// same `Arc` until [`invalidate`](Self::invalidate) is called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolution`] if the loader fails or yields no handle.
    /// Failures are not cached.
    pub async fn resolve(&self, entry: &RegistryEntry<C>) -> Result<Arc<C>> {
        let id = entry.id();
        if let Some(handle) = self.handles.get(id) {
            debug!(component = %id, "resolution cache hit");
            return Ok(handle);
        }

        let loader = entry.loader().clone();
        self.handles
            .get_or_build(id, || async move {
                debug!(component = %id, "invoking component loader");
                match loader.load().await {
                    Ok(Some(component)) => Ok(Arc::new(component)),
                    Ok(None) => {
                        warn!(component = %id, "loader produced no component");
                        Err(Error::Resolution {
                            id: id.to_string(),
                            reason: "loader produced no usable component handle".to_string(),
                        })
                    }
                    Err(err) => {
                        warn!(component = %id, error = %err, "component loader failed");
                        Err(Error::Resolution {
                            id: id.to_string(),
                            reason: err.to_string(),
                        })
                    }
                }
            })
            .await
    }

    /// Returns the cached handle for `id` without loading.
    pub fn cached(&self, id: &str) -> Option<Arc<C>> {
        self.handles.get(id)
    }

    pub fn is_resolved(&self, id: &str) -> bool {
        self.handles.is_ready(id)
    }

    /// Evicts one id, or everything when `id` is `None`.
    pub fn invalidate(&self, id: Option<&str>) {
        match id {
            Some(id) => {
                if self.handles.invalidate(id) {
                    debug!(component = %id, "evicted resolved component");
                }
            }
            None => {
                self.handles.clear();
                debug!("cleared resolution cache");
            }
        }
    }

    /// Number of resolved handles held.
    pub fn len(&self) -> usize {
        self.handles.ready_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C: Send + Sync + 'static> Default for ResolutionCache<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for ResolutionCache<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Loader;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_entry(id: &str, calls: Arc<AtomicUsize>) -> RegistryEntry<String> {
        let name = id.to_string();
        RegistryEntry::new(
            id,
            Loader::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                let name = name.clone();
                async move { Ok(format!("<{}/>", name)) }
            }),
        )
    }

    #[tokio::test]
    async fn test_resolve_returns_identical_handle() {
        let cache = ResolutionCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let entry = counting_entry("hero", calls.clone());

        let first = cache.resolve(&entry).await.unwrap();
        let second = cache.resolve(&entry).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, "<hero/>");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_resolved("hero"));
    }

    #[tokio::test]
    async fn test_missing_handle_is_resolution_error() {
        let cache = ResolutionCache::new();
        let entry: RegistryEntry<String> =
            RegistryEntry::new("ghost", Loader::optional(|| async { Ok(None) }));

        let err = cache.resolve(&entry).await.unwrap_err();
        match err {
            Error::Resolution { id, .. } => assert_eq!(id, "ghost"),
            other => panic!("expected resolution error, got {:?}", other),
        }
        assert!(!cache.is_resolved("ghost"));
    }

    #[tokio::test]
    async fn test_loader_error_names_id_and_cause() {
        let cache = ResolutionCache::new();
        let entry: RegistryEntry<String> =
            RegistryEntry::new("broken", Loader::new(|| async { Err("module missing".into()) }));

        let err = cache.resolve(&entry).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("broken"));
        assert!(msg.contains("module missing"));
    }

    #[tokio::test]
    async fn test_invalidate_one_id_reloads_only_that_id() {
        let cache = ResolutionCache::new();
        let a_calls = Arc::new(AtomicUsize::new(0));
        let b_calls = Arc::new(AtomicUsize::new(0));
        let a = counting_entry("a", a_calls.clone());
        let b = counting_entry("b", b_calls.clone());

        cache.resolve(&a).await.unwrap();
        cache.resolve(&b).await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.invalidate(Some("a"));
        cache.resolve(&a).await.unwrap();
        cache.resolve(&b).await.unwrap();

        assert_eq!(a_calls.load(Ordering::SeqCst), 2);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_all_clears() {
        let cache = ResolutionCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let entry = counting_entry("a", calls.clone());

        cache.resolve(&entry).await.unwrap();
        cache.invalidate(None);
        assert!(cache.is_empty());
        assert!(cache.cached("a").is_none());

        cache.resolve(&entry).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
