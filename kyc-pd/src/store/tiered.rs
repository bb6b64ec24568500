//! Two-tier store with transparent failover
//!
//! The durable tier is tried first, bounded by a per-operation timeout. A
//! connectivity failure marks the store degraded and the call is served
//! from the in-memory tier instead. While degraded, at most one caller per
//! re-probe interval retries the durable tier (claimed with an atomic
//! compare-and-swap, so nobody else waits on the attempt); a success clears
//! degraded mode. Writes accepted by the memory tier are not migrated back
//! after recovery.

use super::{Collection, DurableTier, MemoryTier, QueryFilter, RecordMeta, Store, StoreStatus, Tier};
use async_trait::async_trait;
use kyc_common::{Error, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct TieredStore {
    durable: Arc<dyn DurableTier>,
    memory: MemoryTier,
    degraded: AtomicBool,
    /// Milliseconds since `started` when the durable tier was last tried
    /// while degraded
    last_probe_ms: AtomicU64,
    started: Instant,
    op_timeout: Duration,
    reprobe_interval: Duration,
}

impl TieredStore {
    pub fn new(durable: Arc<dyn DurableTier>, op_timeout: Duration, reprobe_interval: Duration) -> Self {
        Self {
            durable,
            memory: MemoryTier::new(),
            degraded: AtomicBool::new(false),
            last_probe_ms: AtomicU64::new(0),
            started: Instant::now(),
            op_timeout,
            reprobe_interval,
        }
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Whether this call should try the durable tier. Healthy: always.
    /// Degraded: only if this caller wins the claim for the next probe.
    fn durable_allowed(&self) -> bool {
        if !self.degraded.load(Ordering::Acquire) {
            return true;
        }
        let now = self.now_ms();
        let last = self.last_probe_ms.load(Ordering::Acquire);
        if now.saturating_sub(last) < self.reprobe_interval.as_millis() as u64 {
            return false;
        }
        self.last_probe_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn mark_degraded(&self, op: &str, collection: Collection, err: &Error) {
        self.last_probe_ms.store(self.now_ms(), Ordering::Release);
        if !self.degraded.swap(true, Ordering::AcqRel) {
            warn!(
                %collection,
                op,
                error = %err,
                "Durable tier unavailable, serving from memory tier"
            );
        } else {
            debug!(%collection, op, error = %err, "Durable tier still unavailable");
        }
    }

    fn mark_recovered(&self) {
        if self.degraded.swap(false, Ordering::AcqRel) {
            info!("Durable tier recovered, leaving degraded mode");
        }
    }

    /// Connectivity-class errors trigger failover; anything else (corrupt
    /// record, bad input) propagates to the caller.
    fn is_connectivity(err: &Error) -> bool {
        matches!(err, Error::Database(_) | Error::Io(_) | Error::Unavailable(_))
    }

    async fn timed<T>(
        &self,
        op: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(Error::Unavailable(format!(
                "durable tier operation timed out after {} ms",
                self.op_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl Store for TieredStore {
    async fn put(
        &self,
        collection: Collection,
        key: &str,
        meta: RecordMeta,
        record: Value,
    ) -> Result<Tier> {
        if self.durable_allowed() {
            match self.timed(self.durable.put(collection, key, &meta, &record)).await {
                Ok(()) => {
                    self.mark_recovered();
                    return Ok(Tier::Durable);
                }
                Err(e) if Self::is_connectivity(&e) => self.mark_degraded("put", collection, &e),
                Err(e) => return Err(e),
            }
        }
        self.memory
            .put(collection, key, meta.subject.as_deref(), meta.occurred_at, record)
            .await;
        Ok(Tier::Memory)
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
        if self.durable_allowed() {
            match self.timed(self.durable.get(collection, key)).await {
                Ok(Some(value)) => {
                    self.mark_recovered();
                    return Ok(Some(value));
                }
                Ok(None) => {
                    // The memory tier may still hold writes from a past
                    // degraded period
                    self.mark_recovered();
                    return Ok(self.memory.get(collection, key).await);
                }
                Err(e) if Self::is_connectivity(&e) => self.mark_degraded("get", collection, &e),
                Err(e) => return Err(e),
            }
        }
        Ok(self.memory.get(collection, key).await)
    }

    async fn query(&self, collection: Collection, filter: QueryFilter) -> Result<Vec<Value>> {
        if self.durable_allowed() {
            match self.timed(self.durable.query(collection, &filter)).await {
                Ok(rows) => {
                    self.mark_recovered();
                    return Ok(rows);
                }
                Err(e) if Self::is_connectivity(&e) => self.mark_degraded("query", collection, &e),
                Err(e) => return Err(e),
            }
        }
        Ok(self.memory.query(collection, &filter).await)
    }

    fn status(&self) -> StoreStatus {
        if self.degraded.load(Ordering::Acquire) {
            StoreStatus::Degraded
        } else {
            StoreStatus::Healthy
        }
    }
}
