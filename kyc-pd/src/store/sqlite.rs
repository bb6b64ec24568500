//! Durable tier backed by sqlx
//!
//! Records land in the per-collection tables created by
//! `kyc_common::db::init_database`. Timestamps are stored as fixed-width
//! RFC 3339 strings so lexicographic comparison in SQL matches
//! chronological order.

use super::{Collection, DurableTier, QueryFilter, RecordMeta};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use kyc_common::{Error, Result};
use serde_json::Value;
use sqlx::SqlitePool;

pub struct SqliteTier {
    pool: SqlitePool,
}

impl SqliteTier {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl DurableTier for SqliteTier {
    async fn put(
        &self,
        collection: Collection,
        key: &str,
        meta: &RecordMeta,
        record: &Value,
    ) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (key, subject, occurred_at, record) VALUES (?, ?, ?, ?)",
            collection.table()
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(meta.subject.as_deref())
            .bind(format_ts(meta.occurred_at))
            .bind(record.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
        let sql = format!("SELECT record FROM {} WHERE key = ?", collection.table());
        let row: Option<String> = sqlx::query_scalar(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| Error::Internal(format!("corrupt {collection} record {key}: {e}"))),
            None => Ok(None),
        }
    }

    async fn query(&self, collection: Collection, filter: &QueryFilter) -> Result<Vec<Value>> {
        let mut sql = format!("SELECT record FROM {} WHERE 1 = 1", collection.table());
        if filter.subject.is_some() {
            sql.push_str(" AND subject = ?");
        }
        if filter.since.is_some() {
            sql.push_str(" AND occurred_at >= ?");
        }
        if filter.until.is_some() {
            sql.push_str(" AND occurred_at <= ?");
        }
        sql.push_str(" ORDER BY occurred_at ASC");

        let mut query = sqlx::query_scalar::<_, String>(&sql);
        if let Some(subject) = &filter.subject {
            query = query.bind(subject.clone());
        }
        if let Some(since) = filter.since {
            query = query.bind(format_ts(since));
        }
        if let Some(until) = filter.until {
            query = query.bind(format_ts(until));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|text| {
                serde_json::from_str(&text)
                    .map_err(|e| Error::Internal(format!("corrupt {collection} record: {e}")))
            })
            .collect()
    }
}
