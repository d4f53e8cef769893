//! In-process query cache with tag invalidation and optimistic patch layers.
//!
//! # Design
//! Entries are keyed by endpoint name plus the JSON serialization of the call
//! arguments. Each entry keeps the last confirmed server value and a stack of
//! pending patch layers applied on top of it in call order. The visible value
//! is the confirmed value with every pending layer's fields written over it.
//!
//! Layers leave the stack individually. Reverting drops only that layer, so
//! other in-flight patches on the same entry stay visible. Committing writes
//! the layer's fields into the confirmed value at that moment, so among
//! overlapping commits the last one to resolve wins. A refetch replaces the
//! confirmed value and keeps the pending layers on top.
//!
//! All operations take the lock briefly and never across an `.await`.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::http::HttpRequest;
use crate::tags::Tag;

/// Identity of a cached query: endpoint plus serialized arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub endpoint: &'static str,
    pub args: String,
}

impl CacheKey {
    pub fn new<A: Serialize + ?Sized>(endpoint: &'static str, args: &A) -> Result<Self, ApiError> {
        let args = serde_json::to_string(args).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(Self { endpoint, args })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Subscribed but never fetched.
    Uninitialized,
    /// Holds the latest confirmed value.
    Fresh,
    /// A provided tag was invalidated; the next read refetches.
    Stale,
}

/// Undo handle for one patch layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchHandle {
    pub key: CacheKey,
    pub id: u64,
    /// Value visible just before the patch was applied. For inspection only:
    /// reverting removes the layer instead of restoring this value, so other
    /// layers on the same entry survive.
    pub snapshot: Value,
}

#[derive(Debug)]
struct PatchLayer {
    id: u64,
    fields: Map<String, Value>,
}

#[derive(Debug)]
struct CacheEntry {
    confirmed: Option<Value>,
    layers: Vec<PatchLayer>,
    status: FetchStatus,
    tags: Vec<Tag>,
    request: HttpRequest,
    subscribers: usize,
}

impl CacheEntry {
    fn new(request: HttpRequest, tags: Vec<Tag>) -> Self {
        Self {
            confirmed: None,
            layers: Vec::new(),
            status: FetchStatus::Uninitialized,
            tags,
            request,
            subscribers: 0,
        }
    }

    fn visible(&self) -> Option<Value> {
        let mut value = self.confirmed.clone()?;
        if let Value::Object(map) = &mut value {
            for layer in &self.layers {
                for (field, v) in &layer.fields {
                    map.insert(field.clone(), v.clone());
                }
            }
        }
        Some(value)
    }

    fn confirm(&mut self, value: Value) {
        self.confirmed = Some(value);
        self.status = FetchStatus::Fresh;
    }

    fn take_layer(&mut self, id: u64) -> Option<PatchLayer> {
        let index = self.layers.iter().position(|l| l.id == id)?;
        Some(self.layers.remove(index))
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: BTreeMap<CacheKey, CacheEntry>,
    next_patch: u64,
}

/// Shared cache of query results.
#[derive(Debug, Default)]
pub struct QueryCache {
    state: Mutex<CacheState>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible value, but only when the entry is fresh.
    pub fn fresh_value(&self, key: &CacheKey) -> Option<Value> {
        let state = self.state.lock();
        state
            .entries
            .get(key)
            .filter(|e| e.status == FetchStatus::Fresh)
            .and_then(CacheEntry::visible)
    }

    /// Visible value regardless of freshness.
    pub fn value(&self, key: &CacheKey) -> Option<Value> {
        self.state.lock().entries.get(key).and_then(CacheEntry::visible)
    }

    pub fn status(&self, key: &CacheKey) -> Option<FetchStatus> {
        self.state.lock().entries.get(key).map(|e| e.status)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn subscribers(&self, key: &CacheKey) -> usize {
        self.state.lock().entries.get(key).map_or(0, |e| e.subscribers)
    }

    /// Store a fetched value and return what is now visible.
    pub fn store(&self, key: CacheKey, request: HttpRequest, tags: Vec<Tag>, value: Value) -> Value {
        let mut state = self.state.lock();
        let entry = state
            .entries
            .entry(key)
            .or_insert_with(|| CacheEntry::new(request.clone(), tags.clone()));
        entry.request = request;
        entry.tags = tags;
        entry.confirm(value.clone());
        entry.visible().unwrap_or(value)
    }

    /// Replace the confirmed value of an existing entry after a refetch.
    ///
    /// Returns `false` when the entry was evicted while the refetch was in flight.
    pub fn confirm(&self, key: &CacheKey, value: Value) -> bool {
        let mut state = self.state.lock();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.confirm(value);
                true
            }
            None => false,
        }
    }

    /// Request descriptor used to (re)fetch an entry.
    pub fn request_for(&self, key: &CacheKey) -> Option<HttpRequest> {
        self.state.lock().entries.get(key).map(|e| e.request.clone())
    }

    pub fn subscribe(&self, key: CacheKey, request: HttpRequest, tags: Vec<Tag>) {
        let mut state = self.state.lock();
        let entry = state
            .entries
            .entry(key)
            .or_insert_with(|| CacheEntry::new(request, tags));
        entry.subscribers += 1;
    }

    /// Release one subscription. Entries that never received a value are dropped
    /// once nobody is subscribed.
    pub fn unsubscribe(&self, key: &CacheKey) {
        let mut state = self.state.lock();
        let remove = match state.entries.get_mut(key) {
            Some(entry) => {
                entry.subscribers = entry.subscribers.saturating_sub(1);
                entry.subscribers == 0 && entry.confirmed.is_none()
            }
            None => false,
        };
        if remove {
            state.entries.remove(key);
        }
    }

    /// Mark every entry providing a matching tag as stale.
    ///
    /// Returns the refetch set: matching entries that have at least one
    /// subscriber, in key order. Invalidating again yields the same set.
    pub fn invalidate(&self, tags: &[Tag]) -> Vec<CacheKey> {
        let mut state = self.state.lock();
        let mut refetch = Vec::new();
        for (key, entry) in state.entries.iter_mut() {
            let hit = tags
                .iter()
                .any(|tag| entry.tags.iter().any(|provided| tag.matches(provided)));
            if !hit {
                continue;
            }
            if entry.status == FetchStatus::Fresh {
                entry.status = FetchStatus::Stale;
            }
            if entry.subscribers > 0 {
                refetch.push(key.clone());
            }
        }
        refetch
    }

    /// Write `fields` over the entry's visible value as a new layer.
    ///
    /// Returns `None` when there is no cached value to patch.
    pub fn apply_patch(&self, key: &CacheKey, fields: Map<String, Value>) -> Option<PatchHandle> {
        let mut state = self.state.lock();
        let id = state.next_patch;
        let entry = state.entries.get_mut(key)?;
        let snapshot = entry.visible()?;
        entry.layers.push(PatchLayer { id, fields });
        state.next_patch += 1;
        Some(PatchHandle {
            key: key.clone(),
            id,
            snapshot,
        })
    }

    /// Write a layer into the confirmed value. Returns `false` if the layer is gone.
    pub fn commit_patch(&self, handle: &PatchHandle) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(&handle.key) else {
            return false;
        };
        let Some(layer) = entry.take_layer(handle.id) else {
            return false;
        };
        if let Some(Value::Object(map)) = &mut entry.confirmed {
            map.extend(layer.fields);
        }
        true
    }

    /// Remove exactly this layer. Returns `false` if the layer is gone.
    pub fn revert_patch(&self, handle: &PatchHandle) -> bool {
        let mut state = self.state.lock();
        state
            .entries
            .get_mut(&handle.key)
            .and_then(|entry| entry.take_layer(handle.id))
            .is_some()
    }
}
