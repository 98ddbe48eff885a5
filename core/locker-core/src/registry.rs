//! Locked-app registry: a read-through cache over the durable store.
//!
//! The store is the source of truth. The registry keeps the last loaded set in
//! memory and updates it in place after every successful write, so foreground
//! checks do not hit storage on each event. The cache lock is held across each
//! store write so concurrent writers apply to both in the same order.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::types::{normalize_package, LockSet};

/// Durable set of locked package identifiers.
///
/// Implementations must make `insert_if_absent` and `delete` idempotent.
/// The `bool` they return reports whether anything changed.
pub trait LockedAppStore: Send + Sync {
    fn insert_if_absent(&self, package_name: &str) -> Result<bool>;
    fn delete(&self, package_name: &str) -> Result<bool>;
    fn list_all(&self) -> Result<Vec<String>>;
}

/// Volatile store for tests and embedders without persistence.
#[derive(Default)]
pub struct MemoryStore {
    packages: Mutex<BTreeSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_packages<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MemoryStore {
            packages: Mutex::new(packages.into_iter().map(Into::into).collect()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.packages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LockedAppStore for MemoryStore {
    fn insert_if_absent(&self, package_name: &str) -> Result<bool> {
        Ok(self.lock().insert(package_name.to_string()))
    }

    fn delete(&self, package_name: &str) -> Result<bool> {
        Ok(self.lock().remove(package_name))
    }

    fn list_all(&self) -> Result<Vec<String>> {
        Ok(self.lock().iter().cloned().collect())
    }
}

pub struct LockRegistry {
    store: Box<dyn LockedAppStore>,
    cache: Mutex<Option<LockSet>>,
}

impl LockRegistry {
    pub fn new(store: impl LockedAppStore + 'static) -> Self {
        Self::from_boxed(Box::new(store))
    }

    pub fn from_boxed(store: Box<dyn LockedAppStore>) -> Self {
        LockRegistry {
            store,
            cache: Mutex::new(None),
        }
    }

    pub fn is_locked(&self, package_name: &str) -> Result<bool> {
        let package = normalize_package(package_name)?;
        let mut cache = self.lock_cache();
        let set = Self::loaded(&mut cache, self.store.as_ref())?;
        Ok(set.contains(&package))
    }

    pub fn add(&self, package_name: &str) -> Result<()> {
        let package = normalize_package(package_name)?;
        let mut cache = self.lock_cache();
        let inserted = self.store.insert_if_absent(&package)?;
        if let Some(set) = cache.as_mut() {
            set.insert(package.clone());
        }
        drop(cache);
        tracing::info!(package = %package, inserted, "Locked app");
        Ok(())
    }

    pub fn remove(&self, package_name: &str) -> Result<()> {
        let package = normalize_package(package_name)?;
        let mut cache = self.lock_cache();
        let deleted = self.store.delete(&package)?;
        if let Some(set) = cache.as_mut() {
            set.remove(&package);
        }
        drop(cache);
        tracing::info!(package = %package, deleted, "Unlocked app");
        Ok(())
    }

    pub fn list_locked(&self) -> Result<LockSet> {
        let mut cache = self.lock_cache();
        Ok(Self::loaded(&mut cache, self.store.as_ref())?.clone())
    }

    /// Forces the next read to go back to the store.
    pub fn invalidate(&self) {
        *self.lock_cache() = None;
    }

    fn loaded<'a>(cache: &'a mut Option<LockSet>, store: &dyn LockedAppStore) -> Result<&'a LockSet> {
        if cache.is_none() {
            let packages = store.list_all()?;
            tracing::debug!(count = packages.len(), "Loaded locked apps from store");
            *cache = Some(packages.into_iter().collect());
        }
        Ok(cache.get_or_insert_with(LockSet::new))
    }

    fn lock_cache(&self) -> MutexGuard<'_, Option<LockSet>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}
