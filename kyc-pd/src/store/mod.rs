//! Tiered key-value persistence for pipeline state
//!
//! Two tiers in priority order: a durable relational tier reached through a
//! connection string, and an in-memory fallback. Operations try the durable
//! tier first; on connectivity trouble they fall back transparently and the
//! store reports itself degraded. See [`tiered::TieredStore`] for the
//! failover and re-probe rules.

mod memory;
mod sqlite;
mod tiered;

pub use memory::MemoryTier;
pub use sqlite::SqliteTier;
pub use tiered::TieredStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kyc_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// The four record collections of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Documents,
    KycValidations,
    ComplianceSummaries,
    AuditLogs,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Documents,
        Collection::KycValidations,
        Collection::ComplianceSummaries,
        Collection::AuditLogs,
    ];

    /// Backing table name in the durable tier
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Documents => "documents",
            Collection::KycValidations => "kyc_validations",
            Collection::ComplianceSummaries => "compliance_summaries",
            Collection::AuditLogs => "audit_logs",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table())
    }
}

/// Indexable metadata stored alongside every record
#[derive(Debug, Clone)]
pub struct RecordMeta {
    pub subject: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl RecordMeta {
    pub fn new(subject: Option<&str>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            subject: subject.map(str::to_string),
            occurred_at,
        }
    }
}

/// Filter for `query`: subject match and/or time range
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub subject: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl QueryFilter {
    pub fn by_subject(subject: &str) -> Self {
        Self {
            subject: Some(subject.to_string()),
            ..Self::default()
        }
    }

    pub fn between(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            subject: None,
            since: Some(since),
            until: Some(until),
        }
    }

    pub fn with_subject(mut self, subject: Option<&str>) -> Self {
        self.subject = subject.map(str::to_string);
        self
    }

    /// Whether a record's metadata satisfies this filter
    pub fn matches(&self, subject: Option<&str>, occurred_at: DateTime<Utc>) -> bool {
        if let Some(want) = &self.subject {
            if subject != Some(want.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if occurred_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if occurred_at > until {
                return false;
            }
        }
        true
    }
}

/// Which tier served a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Durable,
    Memory,
}

/// Observable store health
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Healthy,
    /// The durable tier is unreachable; calls are served from memory
    Degraded,
}

/// Storage contract the coordinator is written against
///
/// Records travel as JSON values so the trait stays object-safe; the typed
/// helpers below wrap (de)serialization for callers.
#[async_trait]
pub trait Store: Send + Sync {
    /// Write a record, returning the tier that accepted it
    async fn put(
        &self,
        collection: Collection,
        key: &str,
        meta: RecordMeta,
        record: Value,
    ) -> Result<Tier>;

    /// Fetch one record by key
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>>;

    /// Fetch all records matching a filter from the currently active tier,
    /// ordered by occurrence time. Empty, never an error, when nothing
    /// matches.
    async fn query(&self, collection: Collection, filter: QueryFilter) -> Result<Vec<Value>>;

    fn status(&self) -> StoreStatus;
}

/// Durable-tier contract behind [`TieredStore`]
#[async_trait]
pub trait DurableTier: Send + Sync {
    async fn put(
        &self,
        collection: Collection,
        key: &str,
        meta: &RecordMeta,
        record: &Value,
    ) -> Result<()>;

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>>;

    async fn query(&self, collection: Collection, filter: &QueryFilter) -> Result<Vec<Value>>;
}

/// Serialize and store a typed record
pub async fn put_record<T: Serialize>(
    store: &dyn Store,
    collection: Collection,
    key: &str,
    meta: RecordMeta,
    record: &T,
) -> Result<Tier> {
    let value = serde_json::to_value(record)
        .map_err(|e| Error::Internal(format!("serialize {collection} record: {e}")))?;
    store.put(collection, key, meta, value).await
}

/// Fetch and deserialize a typed record
pub async fn get_record<T: DeserializeOwned>(
    store: &dyn Store,
    collection: Collection,
    key: &str,
) -> Result<Option<T>> {
    match store.get(collection, key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| Error::Internal(format!("deserialize {collection} record {key}: {e}"))),
        None => Ok(None),
    }
}

/// Query and deserialize typed records
pub async fn query_records<T: DeserializeOwned>(
    store: &dyn Store,
    collection: Collection,
    filter: QueryFilter,
) -> Result<Vec<T>> {
    store
        .query(collection, filter)
        .await?
        .into_iter()
        .map(|value| {
            serde_json::from_value(value)
                .map_err(|e| Error::Internal(format!("deserialize {collection} record: {e}")))
        })
        .collect()
}
