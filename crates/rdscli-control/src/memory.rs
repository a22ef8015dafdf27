//! In-memory backends for the activity store and capacity control
//!
//! Values are kept as the same formatted strings the tag API stores, so
//! the parsing rules (malformed means absent) apply identically.

use crate::capacity::CapacityControl;
use crate::store::{ActivityRecord, ActivityStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rdscli_common::ActivityKey;
use rdscli_common::tags::{format_timestamp, parse_timestamp};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Activity store backed by a map of raw tag values
#[derive(Debug, Default)]
pub struct MemoryStore {
    tags: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from a record
    pub fn with_record(record: ActivityRecord) -> Self {
        let store = Self::new();
        for key in ActivityKey::ALL {
            if let Some(value) = record.get(key) {
                store.insert_raw(key.as_str(), &format_timestamp(value));
            }
        }
        store
    }

    /// Write a raw tag value, bypassing formatting
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.tags().insert(key.to_string(), value.to_string());
    }

    /// Raw tag value as stored
    pub fn raw(&self, key: &str) -> Option<String> {
        self.tags().get(key).cloned()
    }

    /// Parsed snapshot of the current record
    pub fn snapshot(&self) -> ActivityRecord {
        let tags = self.tags();
        ActivityRecord::from_tags(tags.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    fn tags(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.tags.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActivityStore for MemoryStore {
    async fn get(&self, key: ActivityKey) -> Result<Option<DateTime<Utc>>> {
        Ok(self.tags().get(key.as_str()).and_then(|v| parse_timestamp(v)))
    }

    async fn set(&self, key: ActivityKey, value: DateTime<Utc>) -> Result<()> {
        self.insert_raw(key.as_str(), &format_timestamp(value));
        Ok(())
    }

    async fn clear(&self, key: ActivityKey) -> Result<()> {
        self.tags().remove(key.as_str());
        Ok(())
    }
}

/// Capacity control that records every set call
#[derive(Debug, Default)]
pub struct MemoryCapacity {
    state: Mutex<CapacityState>,
}

#[derive(Debug, Default)]
struct CapacityState {
    desired: i32,
    history: Vec<i32>,
}

impl MemoryCapacity {
    pub fn new(desired: i32) -> Self {
        Self {
            state: Mutex::new(CapacityState {
                desired,
                history: Vec::new(),
            }),
        }
    }

    /// Current desired capacity
    pub fn desired(&self) -> i32 {
        self.state().desired
    }

    /// Every value passed to `set_desired_capacity`, in order
    pub fn history(&self) -> Vec<i32> {
        self.state().history.clone()
    }

    fn state(&self) -> MutexGuard<'_, CapacityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CapacityControl for MemoryCapacity {
    async fn desired_capacity(&self) -> Result<i32> {
        Ok(self.desired())
    }

    async fn set_desired_capacity(&self, capacity: i32) -> Result<()> {
        let mut state = self.state();
        state.desired = capacity;
        state.history.push(capacity);
        Ok(())
    }
}
