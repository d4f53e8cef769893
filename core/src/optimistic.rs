//! Optimistic updates: patch a cached query before the mutation resolves.
//!
//! An [`OptimisticUpdate`] is created in the `Pending` state by applying its
//! patch synchronously. Settling it with the mutation outcome either keeps
//! the patch (`Committed`) or removes exactly that patch (`Reverted`). Each
//! update owns its own [`PatchHandle`], so concurrent updates to the same
//! entry never share undo state.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::cache::{CacheKey, PatchHandle, QueryCache};
use crate::error::ApiError;

/// Fields to overwrite on one cached query.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticPatch {
    pub target: CacheKey,
    pub fields: Map<String, Value>,
}

impl OptimisticPatch {
    pub fn new(target: CacheKey) -> Self {
        Self {
            target,
            fields: Map::new(),
        }
    }

    pub fn set<T: Serialize>(mut self, field: &str, value: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(value).map_err(|e| ApiError::Serialization(e.to_string()))?;
        self.fields.insert(field.to_string(), value);
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    Pending,
    Committed,
    Reverted,
}

/// One in-flight optimistic update.
///
/// Dropping a still-pending update reverts it, since the outcome of the
/// mutation will never be observed.
#[derive(Debug)]
pub struct OptimisticUpdate<'a> {
    cache: &'a QueryCache,
    handle: Option<PatchHandle>,
    state: PatchState,
}

impl<'a> OptimisticUpdate<'a> {
    /// Apply `patch` immediately. With no cached value to patch, the update
    /// carries no handle and settling it has no effect on the cache.
    pub fn begin(cache: &'a QueryCache, patch: OptimisticPatch) -> Self {
        let handle = cache.apply_patch(&patch.target, patch.fields);
        match &handle {
            Some(h) => tracing::debug!(endpoint = h.key.endpoint, patch = h.id, "applied optimistic patch"),
            None => tracing::debug!(endpoint = patch.target.endpoint, "no cached value to patch"),
        }
        Self {
            cache,
            handle,
            state: PatchState::Pending,
        }
    }

    pub fn state(&self) -> PatchState {
        self.state
    }

    pub fn handle(&self) -> Option<&PatchHandle> {
        self.handle.as_ref()
    }

    /// Commit on success, revert on any failure.
    pub fn settle(mut self, succeeded: bool) -> PatchState {
        if succeeded {
            if let Some(handle) = &self.handle {
                self.cache.commit_patch(handle);
            }
            self.state = PatchState::Committed;
        } else {
            self.revert();
        }
        self.state
    }

    fn revert(&mut self) {
        if let Some(handle) = &self.handle {
            if self.cache.revert_patch(handle) {
                tracing::debug!(endpoint = handle.key.endpoint, patch = handle.id, "reverted optimistic patch");
            }
        }
        self.state = PatchState::Reverted;
    }
}

impl Drop for OptimisticUpdate<'_> {
    fn drop(&mut self) {
        if self.state == PatchState::Pending {
            self.revert();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, HttpRequest};
    use serde_json::json;

    fn seeded() -> (QueryCache, CacheKey) {
        let cache = QueryCache::new();
        let key = CacheKey::new("getUserCourseProgress", "u1/c1").unwrap();
        cache.store(
            key.clone(),
            HttpRequest::new(HttpMethod::Get, "progress"),
            vec![],
            json!({ "sections": ["s0"], "overallProgress": 0 }),
        );
        (cache, key)
    }

    fn patch(key: &CacheKey, value: &str) -> OptimisticPatch {
        OptimisticPatch::new(key.clone()).set("sections", &[value]).unwrap()
    }

    #[test]
    fn pending_patch_is_visible_immediately() {
        let (cache, key) = seeded();
        let update = OptimisticUpdate::begin(&cache, patch(&key, "s1"));
        assert_eq!(update.state(), PatchState::Pending);
        assert_eq!(cache.value(&key).unwrap()["sections"], json!(["s1"]));
        assert_eq!(update.settle(true), PatchState::Committed);
        assert_eq!(cache.value(&key).unwrap()["sections"], json!(["s1"]));
    }

    #[test]
    fn failure_restores_prior_value() {
        let (cache, key) = seeded();
        let before = cache.value(&key).unwrap();
        let update = OptimisticUpdate::begin(&cache, patch(&key, "s1"));
        assert_eq!(update.handle().unwrap().snapshot, before);
        assert_eq!(update.settle(false), PatchState::Reverted);
        assert_eq!(cache.value(&key), Some(before));
    }

    #[test]
    fn dropping_pending_update_reverts() {
        let (cache, key) = seeded();
        {
            let _update = OptimisticUpdate::begin(&cache, patch(&key, "s1"));
        }
        assert_eq!(cache.value(&key).unwrap()["sections"], json!(["s0"]));
    }

    #[test]
    fn missing_entry_yields_no_handle() {
        let cache = QueryCache::new();
        let key = CacheKey::new("getUserCourseProgress", "nobody").unwrap();
        let update = OptimisticUpdate::begin(&cache, patch(&key, "s1"));
        assert!(update.handle().is_none());
        assert_eq!(update.settle(false), PatchState::Reverted);
        assert!(cache.value(&key).is_none());
    }
}
