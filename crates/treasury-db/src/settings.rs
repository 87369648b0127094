use crate::models::SystemConfig;
use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use std::{collections::HashMap, sync::Arc};

/// Snapshot of every `SystemConfig` row keyed by `config_key`. Readers never
/// block; a reload swaps the whole map.
#[derive(Debug)]
pub struct Settings(ArcSwap<HashMap<String, serde_json::Value>>);

impl Settings {
    pub(crate) fn new() -> Self {
        Self(ArcSwap::new(Arc::new(HashMap::new())))
    }

    pub(crate) fn populate(&self, rows: Vec<SystemConfig>) {
        let entries = rows
            .into_iter()
            .map(|row| (row.config_key, row.config_value))
            .collect();
        self.0.swap(Arc::new(entries));
    }

    pub(crate) fn insert(&self, key: &str, value: serde_json::Value) {
        self.0.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(key.to_owned(), value.clone());
            next
        });
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.0.load().get(key).cloned()
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.get(key).map(serde_json::from_value).transpose()
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, serde_json::Value>> {
        self.0.load_full()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
