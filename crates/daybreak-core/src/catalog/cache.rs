//! Slow-refresh snapshot cache for the read-only catalogs.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::error::CatalogError;

type Loader<T> = Box<dyn Fn() -> Result<T, CatalogError> + Send + Sync>;

struct Snapshot<T> {
    value: Arc<T>,
    loaded_at: Instant,
}

/// Holds the last good catalog snapshot and reloads it once it is older than
/// the refresh interval. A failed reload keeps serving the previous snapshot.
pub struct CachedCatalog<T> {
    loader: Loader<T>,
    refresh: Duration,
    snapshot: RwLock<Snapshot<T>>,
}

impl<T> CachedCatalog<T> {
    /// Load the first snapshot eagerly.
    ///
    /// # Errors
    /// Returns the loader's error if the initial load fails.
    pub fn new<F>(refresh: Duration, loader: F) -> Result<Self, CatalogError>
    where
        F: Fn() -> Result<T, CatalogError> + Send + Sync + 'static,
    {
        let value = loader()?;
        Ok(Self {
            loader: Box::new(loader),
            refresh,
            snapshot: RwLock::new(Snapshot {
                value: Arc::new(value),
                loaded_at: Instant::now(),
            }),
        })
    }

    /// A snapshot that never reloads.
    pub fn fixed(value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let stored = value.clone();
        Self {
            loader: Box::new(move || Ok(stored.clone())),
            refresh: Duration::MAX,
            snapshot: RwLock::new(Snapshot {
                value: Arc::new(value),
                loaded_at: Instant::now(),
            }),
        }
    }

    /// Current snapshot, reloading first if it has gone stale.
    pub fn get(&self) -> Arc<T> {
        if let Ok(snapshot) = self.snapshot.read() {
            if snapshot.loaded_at.elapsed() < self.refresh {
                return Arc::clone(&snapshot.value);
            }
        }
        self.reload()
    }

    /// Force a reload, falling back to the previous snapshot on failure.
    pub fn reload(&self) -> Arc<T> {
        let mut guard = match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match (self.loader)() {
            Ok(value) => {
                guard.value = Arc::new(value);
            }
            Err(e) => {
                tracing::warn!(error = %e, "catalog reload failed, keeping previous snapshot");
            }
        }
        guard.loaded_at = Instant::now();
        Arc::clone(&guard.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn fresh_snapshot_is_not_reloaded() {
        let loads = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&loads);
        let cache = CachedCatalog::new(Duration::from_secs(3600), move || {
            Ok(counter.fetch_add(1, Ordering::SeqCst))
        })
        .unwrap();
        assert_eq!(*cache.get(), 0);
        assert_eq!(*cache.get(), 0);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_snapshot_is_reloaded() {
        let loads = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&loads);
        let cache = CachedCatalog::new(Duration::ZERO, move || {
            Ok(counter.fetch_add(1, Ordering::SeqCst))
        })
        .unwrap();
        assert_eq!(*cache.get(), 1);
        assert_eq!(*cache.get(), 2);
    }

    #[test]
    fn failed_reload_keeps_previous_value() {
        let loads = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&loads);
        let cache = CachedCatalog::new(Duration::ZERO, move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok("first".to_string())
            } else {
                Err(CatalogError::DuplicateId("x".into()))
            }
        })
        .unwrap();
        assert_eq!(cache.get().as_str(), "first");
    }
}
