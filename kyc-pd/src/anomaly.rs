//! Anomaly detection over the audit stream
//!
//! Sliding counters with independent expirations, stored in the ephemeral
//! cache so concurrent audit writes share atomic increments. Detection is
//! best-effort: with the cache unavailable the detector simply never
//! fires, and the audit write it rides on is unaffected.

use crate::cache::{keys, Cache};
use chrono::Utc;
use kyc_common::config::AnomalyConfig;
use kyc_common::models::{Anomaly, AnomalyKind, AuditEvent, AuditStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct AnomalyDetector {
    cache: Arc<dyn Cache>,
    failure_threshold: i64,
    failure_window: Duration,
    rate_threshold: i64,
    rate_window: Duration,
    alert_ttl: Duration,
}

impl AnomalyDetector {
    pub fn new(cache: Arc<dyn Cache>, config: &AnomalyConfig, alert_ttl: Duration) -> Self {
        Self {
            cache,
            failure_threshold: config.failure_threshold,
            failure_window: Duration::from_secs(config.failure_window_secs),
            rate_threshold: config.rate_threshold,
            rate_window: Duration::from_secs(config.rate_window_secs),
            alert_ttl,
        }
    }

    /// Update the counters for one audit event and report any anomalies
    /// that fired on this update.
    pub async fn observe(&self, event: &AuditEvent) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        if event.status == AuditStatus::Failure {
            let subject = event.subject_id.as_deref().unwrap_or("unknown");
            if let Some(count) = self
                .cache
                .incr(&keys::failures(subject), self.failure_window)
                .await
            {
                if count > self.failure_threshold {
                    anomalies.push(Anomaly {
                        kind: AnomalyKind::RepeatedFailure {
                            subject_id: subject.to_string(),
                            count,
                        },
                        detected_at: Utc::now(),
                    });
                }
            }
        }

        if let Some(count) = self
            .cache
            .incr(&keys::rate(&event.event_type), self.rate_window)
            .await
        {
            if count > self.rate_threshold {
                anomalies.push(Anomaly {
                    kind: AnomalyKind::EventRateSpike {
                        event_type: event.event_type.clone(),
                        count,
                    },
                    detected_at: Utc::now(),
                });
            }
        }

        for anomaly in &anomalies {
            warn!(description = %anomaly.describe(), "Anomaly detected");
        }
        anomalies
    }

    /// Write a fired anomaly to the short-TTL alert store for external
    /// polling
    pub async fn record_alert(&self, anomaly: &Anomaly) {
        let body = serde_json::to_string(anomaly).unwrap_or_else(|_| anomaly.describe());
        self.cache
            .set(&keys::alert(anomaly.detected_at), &body, self.alert_ttl)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use async_trait::async_trait;
    use uuid::Uuid;

    /// Cache stub that is permanently unreachable
    struct DownCache;

    #[async_trait]
    impl Cache for DownCache {
        async fn get(&self, _key: &str) -> Option<String> {
            None
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) {}
        async fn incr(&self, _key: &str, _ttl: Duration) -> Option<i64> {
            None
        }
    }

    fn audit_event(subject: &str, status: AuditStatus, event_type: &str) -> AuditEvent {
        AuditEvent {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            component: "kyc".to_string(),
            subject_id: Some(subject.to_string()),
            action: "validate".to_string(),
            details: serde_json::json!({}),
            status,
            anomaly: false,
            occurred_at: Utc::now(),
        }
    }

    fn detector(cache: Arc<dyn Cache>) -> AnomalyDetector {
        AnomalyDetector::new(cache, &AnomalyConfig::default(), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_sixth_failure_fires_exactly_once() {
        let detector = detector(Arc::new(MemoryCache::new()));

        for i in 1..=5 {
            let fired = detector
                .observe(&audit_event("SUBJ_001", AuditStatus::Failure, "kyc-validation-completed"))
                .await;
            assert!(fired.is_empty(), "no anomaly on failure #{i}");
        }

        let fired = detector
            .observe(&audit_event("SUBJ_001", AuditStatus::Failure, "kyc-validation-completed"))
            .await;
        assert_eq!(fired.len(), 1, "exactly one anomaly on the 6th failure");
        match &fired[0].kind {
            AnomalyKind::RepeatedFailure { subject_id, count } => {
                assert_eq!(subject_id, "SUBJ_001");
                assert_eq!(*count, 6);
            }
            other => panic!("unexpected anomaly kind: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_counters_are_per_subject() {
        let detector = detector(Arc::new(MemoryCache::new()));

        for _ in 0..5 {
            detector
                .observe(&audit_event("SUBJ_001", AuditStatus::Failure, "audit-log"))
                .await;
        }
        // A different subject's first failure fires nothing
        let fired = detector
            .observe(&audit_event("SUBJ_002", AuditStatus::Failure, "audit-log"))
            .await;
        assert!(fired.is_empty());
    }

    #[tokio::test]
    async fn test_success_events_do_not_count_as_failures() {
        let detector = detector(Arc::new(MemoryCache::new()));
        for _ in 0..10 {
            let fired = detector
                .observe(&audit_event("SUBJ_001", AuditStatus::Success, "document-processed"))
                .await;
            assert!(fired.is_empty());
        }
    }

    #[tokio::test]
    async fn test_event_rate_spike_fires_past_threshold() {
        let detector = detector(Arc::new(MemoryCache::new()));

        for i in 1..=100 {
            let fired = detector
                .observe(&audit_event("SUBJ_001", AuditStatus::Success, "chat-interaction"))
                .await;
            assert!(fired.is_empty(), "no spike at event #{i}");
        }

        let fired = detector
            .observe(&audit_event("SUBJ_001", AuditStatus::Success, "chat-interaction"))
            .await;
        assert_eq!(fired.len(), 1);
        assert!(matches!(
            &fired[0].kind,
            AnomalyKind::EventRateSpike { count: 101, .. }
        ));
    }

    #[tokio::test]
    async fn test_unavailable_cache_disables_detection() {
        let detector = detector(Arc::new(DownCache));

        for _ in 0..20 {
            let fired = detector
                .observe(&audit_event("SUBJ_001", AuditStatus::Failure, "audit-log"))
                .await;
            assert!(fired.is_empty(), "detection silently degrades to never-fires");
        }
    }

    #[tokio::test]
    async fn test_alert_written_with_ttl() {
        let cache = Arc::new(MemoryCache::new());
        let detector = detector(cache.clone());
        let anomaly = Anomaly {
            kind: AnomalyKind::RepeatedFailure {
                subject_id: "SUBJ_001".to_string(),
                count: 6,
            },
            detected_at: Utc::now(),
        };

        detector.record_alert(&anomaly).await;

        let stored = cache.get(&keys::alert(anomaly.detected_at)).await;
        let stored = stored.expect("alert should be cached");
        assert!(stored.contains("repeated_failure"));
        assert!(stored.contains("SUBJ_001"));
    }
}
