//! In-memory fallback tier
//!
//! Holds records written while the durable tier is unreachable. Contents
//! are process-local and are not migrated back after recovery.

use super::{Collection, QueryFilter};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct MemoryRecord {
    subject: Option<String>,
    occurred_at: DateTime<Utc>,
    record: Value,
}

#[derive(Default)]
pub struct MemoryTier {
    collections: RwLock<HashMap<Collection, HashMap<String, MemoryRecord>>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(
        &self,
        collection: Collection,
        key: &str,
        subject: Option<&str>,
        occurred_at: DateTime<Utc>,
        record: Value,
    ) {
        let mut collections = self.collections.write().await;
        collections.entry(collection).or_default().insert(
            key.to_string(),
            MemoryRecord {
                subject: subject.map(str::to_string),
                occurred_at,
                record,
            },
        );
    }

    pub async fn get(&self, collection: Collection, key: &str) -> Option<Value> {
        let collections = self.collections.read().await;
        collections
            .get(&collection)
            .and_then(|records| records.get(key))
            .map(|entry| entry.record.clone())
    }

    pub async fn query(&self, collection: Collection, filter: &QueryFilter) -> Vec<Value> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(&collection) else {
            return Vec::new();
        };

        let mut matched: Vec<&MemoryRecord> = records
            .values()
            .filter(|entry| filter.matches(entry.subject.as_deref(), entry.occurred_at))
            .collect();
        matched.sort_by_key(|entry| entry.occurred_at);
        matched.into_iter().map(|entry| entry.record.clone()).collect()
    }

    pub async fn len(&self, collection: Collection) -> usize {
        let collections = self.collections.read().await;
        collections.get(&collection).map_or(0, HashMap::len)
    }
}
