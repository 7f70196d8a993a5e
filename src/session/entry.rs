//! A single stored session.

use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime};

use serde_json::Value;

/// Keyed session state with idle expiry.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    created_at: SystemTime,
    last_activity: SystemTime,
    touched: Instant,
    duration: Duration,
    data: BTreeMap<String, Value>,
}

impl Session {
    pub fn new(id: impl Into<String>, duration: Duration) -> Self {
        let now = SystemTime::now();
        Self {
            id: id.into(),
            created_at: now,
            last_activity: now,
            touched: Instant::now(),
            duration,
            data: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn last_activity(&self) -> SystemTime {
        self.last_activity
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// True once the session has been idle for longer than its duration.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.touched) > self.duration
    }

    pub(crate) fn touch(&mut self) {
        self.touched = Instant::now();
        self.last_activity = SystemTime::now();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Store a value; `Value::Null` removes the key. Returns the previous value.
    pub fn insert(&mut self, key: &str, value: Value) -> Option<Value> {
        if value.is_null() {
            self.data.remove(key)
        } else {
            self.data.insert(key.to_string(), value)
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Copy of the data in key order.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
