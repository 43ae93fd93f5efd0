//! Process-wide key/value state.
//!
//! Values are JSON documents. Writing `None` removes the key.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use super::Database;

/// Key/value state that outlives a single activation.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;

    fn update(&self, key: &str, value: Option<Value>) -> anyhow::Result<()>;
}

impl StateStore for Database {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        match self.get_setting(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn update(&self, key: &str, value: Option<Value>) -> anyhow::Result<()> {
        match value {
            Some(value) => self.set_setting(key, &serde_json::to_string(&value)?),
            None => self.delete_setting(key),
        }
    }
}

/// In-memory state for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryState {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryState {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("State lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn update(&self, key: &str, value: Option<Value>) -> anyhow::Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("State lock poisoned"))?;
        match value {
            Some(value) => values.insert(key.to_string(), value),
            None => values.remove(key),
        };
        Ok(())
    }
}
