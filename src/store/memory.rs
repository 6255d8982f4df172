use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{now_timestamp, Redirect, RedirectStore, Resolver, StoreError, PAGE_LIMIT};

/// Process-local redirect table keyed by id.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    by_id: BTreeMap<u64, Redirect>,
}

impl Inner {
    fn find_path(&self, path: &str) -> Option<&Redirect> {
        self.by_id.values().find(|r| r.path == path)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Resolver for MemoryStore {
    async fn resolve(&self, path: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .inner
            .read()
            .find_path(path)
            .filter(|r| !r.inactive)
            .map(|r| r.url.clone()))
    }
}

#[async_trait]
impl RedirectStore for MemoryStore {
    async fn create(&self, path: &str, url: &str) -> Result<Redirect, StoreError> {
        let mut inner = self.inner.write();
        if inner.find_path(path).is_some() {
            return Err(StoreError::Duplicate(path.to_string()));
        }
        inner.next_id += 1;
        let redirect = Redirect {
            id: inner.next_id,
            path: path.to_string(),
            url: url.to_string(),
            last_updated: now_timestamp(),
            inactive: false,
        };
        inner.by_id.insert(redirect.id, redirect.clone());
        Ok(redirect)
    }

    async fn get_by_id(&self, id: u64) -> Result<Option<Redirect>, StoreError> {
        Ok(self.inner.read().by_id.get(&id).cloned())
    }

    async fn fix(&self, path: &str, url: &str) -> Result<Redirect, StoreError> {
        let mut inner = self.inner.write();
        let redirect = inner
            .by_id
            .values_mut()
            .find(|r| r.path == path && !r.inactive)
            .ok_or(StoreError::NotFound)?;
        redirect.url = url.to_string();
        redirect.last_updated = now_timestamp();
        Ok(redirect.clone())
    }

    async fn update(&self, id: u64, path: &str, url: &str) -> Result<Redirect, StoreError> {
        let mut inner = self.inner.write();
        if !inner.by_id.get(&id).is_some_and(|r| !r.inactive) {
            return Err(StoreError::NotFound);
        }
        if inner.by_id.values().any(|r| r.path == path && r.id != id) {
            return Err(StoreError::Duplicate(path.to_string()));
        }
        let redirect = inner.by_id.get_mut(&id).ok_or(StoreError::NotFound)?;
        redirect.path = path.to_string();
        redirect.url = url.to_string();
        redirect.last_updated = now_timestamp();
        Ok(redirect.clone())
    }

    async fn disable(&self, id: u64) -> Result<Redirect, StoreError> {
        let mut inner = self.inner.write();
        let redirect = inner
            .by_id
            .get_mut(&id)
            .filter(|r| !r.inactive)
            .ok_or(StoreError::NotFound)?;
        redirect.inactive = true;
        redirect.last_updated = now_timestamp();
        Ok(redirect.clone())
    }

    async fn list(&self, after: u64) -> Result<Vec<Redirect>, StoreError> {
        let upper = after.saturating_add(PAGE_LIMIT as u64);
        Ok(self
            .inner
            .read()
            .by_id
            .range(after.saturating_add(1)..=upper)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn search_path(&self, needle: &str, offset: usize) -> Result<Vec<Redirect>, StoreError> {
        let needle = needle.to_lowercase();
        Ok(self
            .inner
            .read()
            .by_id
            .values()
            .filter(|r| !r.inactive && r.path.to_lowercase().contains(&needle))
            .skip(offset)
            .take(PAGE_LIMIT)
            .cloned()
            .collect())
    }

    async fn destination_exists(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.inner.read().by_id.values().any(|r| r.url == url))
    }
}
