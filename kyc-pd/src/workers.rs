//! Stage propagation workers
//!
//! Wires the coordinator's stages to the event bus: validation requests
//! drive `validate`, summary requests drive `summarize`, and the remaining
//! lifecycle topics feed the audit trail. The `audit-log` topic is an
//! output of the audit stage and is deliberately not subscribed here.

use crate::coordinator::{AuditInput, PipelineCoordinator};
use kyc_common::events::{handler, EventBus, EventEnvelope, EventPayload, Topic};
use kyc_common::models::AuditStatus;
use kyc_common::Result;
use std::sync::Arc;
use tracing::warn;

/// Topics the audit stage consumes
const AUDITED_TOPICS: [Topic; 4] = [
    Topic::DocumentProcessed,
    Topic::KycValidationCompleted,
    Topic::ComplianceSummaryGenerated,
    Topic::ChatInteraction,
];

/// Subscribe the pipeline stages to their upstream topics
pub async fn spawn_stage_workers(
    coordinator: Arc<PipelineCoordinator>,
    bus: Arc<dyn EventBus>,
) -> Result<()> {
    let validator = coordinator.clone();
    bus.subscribe(
        Topic::KycValidationRequested,
        handler(move |envelope| {
            let coordinator = validator.clone();
            async move {
                if let EventPayload::KycValidationRequested {
                    document_id,
                    subject_id,
                    ..
                } = envelope.payload
                {
                    if let Err(e) = coordinator.validate(&document_id, &subject_id).await {
                        warn!(document_id, subject_id, error = %e, "Validation stage failed");
                    }
                }
            }
        }),
    )
    .await?;

    let summarizer = coordinator.clone();
    bus.subscribe(
        Topic::ComplianceSummaryRequested,
        handler(move |envelope| {
            let coordinator = summarizer.clone();
            async move {
                if let EventPayload::ComplianceSummaryRequested { subject_id, .. } = envelope.payload
                {
                    if let Err(e) = coordinator.summarize(&subject_id).await {
                        warn!(subject_id, error = %e, "Summary stage failed");
                    }
                }
            }
        }),
    )
    .await?;

    for topic in AUDITED_TOPICS {
        let auditor = coordinator.clone();
        bus.subscribe(
            topic,
            handler(move |envelope| {
                let coordinator = auditor.clone();
                async move {
                    coordinator.audit(audit_input(&envelope)).await;
                }
            }),
        )
        .await?;
    }

    Ok(())
}

/// Map a lifecycle envelope to its audit trail entry.
///
/// A failed rule check is a normal result, not an operational failure, so
/// every lifecycle event audits as `success`; operational failures are
/// audited directly by the component that hit them.
fn audit_input(envelope: &EventEnvelope) -> AuditInput {
    let (component, action, subject_id) = match &envelope.payload {
        EventPayload::DocumentProcessed { subject_id, .. } => {
            ("ingestion", "process_document", Some(subject_id.clone()))
        }
        EventPayload::KycValidationRequested { subject_id, .. } => {
            ("ingestion", "request_validation", Some(subject_id.clone()))
        }
        EventPayload::KycValidationCompleted { subject_id, .. } => {
            ("kyc", "validate_kyc", Some(subject_id.clone()))
        }
        EventPayload::ComplianceSummaryRequested { subject_id, .. } => {
            ("kyc", "request_summary", Some(subject_id.clone()))
        }
        EventPayload::ComplianceSummaryGenerated { subject_id, .. } => {
            ("summary", "generate_summary", Some(subject_id.clone()))
        }
        EventPayload::ChatInteraction { subject_id, .. } => {
            ("chat", "record_interaction", subject_id.clone())
        }
        EventPayload::AuditLogged { subject_id, .. } => {
            ("audit", "log_event", subject_id.clone())
        }
        EventPayload::AuditAnomaly { anomaly } => {
            let subject = match &anomaly.kind {
                kyc_common::models::AnomalyKind::RepeatedFailure { subject_id, .. } => {
                    Some(subject_id.clone())
                }
                kyc_common::models::AnomalyKind::EventRateSpike { .. } => None,
            };
            ("audit", "raise_anomaly", subject)
        }
    };

    AuditInput {
        event_type: envelope.topic.as_str().to_string(),
        component: component.to_string(),
        subject_id,
        action: action.to_string(),
        details: serde_json::to_value(&envelope.payload).unwrap_or_default(),
        status: AuditStatus::Success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyDetector;
    use crate::cache::MemoryCache;
    use crate::classify::KeywordClassifier;
    use crate::rules::StandardRules;
    use crate::store::{SqliteTier, TieredStore};
    use kyc_common::config::{AnomalyConfig, CacheConfig};
    use kyc_common::events::MockEventBus;
    use std::time::Duration;

    async fn coordinator(dir: &tempfile::TempDir, bus: Arc<dyn EventBus>) -> Arc<PipelineCoordinator> {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("workers.db").display());
        let pool = kyc_common::db::init_database(&url).await.unwrap();
        let store = Arc::new(TieredStore::new(
            Arc::new(SqliteTier::new(pool)),
            Duration::from_secs(2),
            Duration::from_secs(30),
        ));
        let cache = Arc::new(MemoryCache::new());
        let anomaly = AnomalyDetector::new(
            cache.clone(),
            &AnomalyConfig::default(),
            Duration::from_secs(3600),
        );
        Arc::new(PipelineCoordinator::new(
            store,
            cache,
            bus,
            anomaly,
            Arc::new(StandardRules::new()),
            Arc::new(KeywordClassifier::new()),
            &CacheConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_workers_subscribe_expected_topics() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(MockEventBus::new());
        let coordinator = coordinator(&dir, bus.clone()).await;

        spawn_stage_workers(coordinator, bus.clone()).await.unwrap();

        assert_eq!(bus.handler_count(Topic::KycValidationRequested), 1);
        assert_eq!(bus.handler_count(Topic::ComplianceSummaryRequested), 1);
        for topic in AUDITED_TOPICS {
            assert_eq!(bus.handler_count(topic), 1, "audit stage consumes {topic}");
        }
        // The audit stage must never consume its own output
        assert_eq!(bus.handler_count(Topic::AuditLog), 0);
        assert_eq!(bus.handler_count(Topic::AuditAnomaly), 0);
    }

    #[test]
    fn test_audit_input_maps_components() {
        let envelope = EventEnvelope {
            topic: Topic::DocumentProcessed,
            key: "doc_1".to_string(),
            payload: EventPayload::DocumentProcessed {
                document_id: "doc_1".to_string(),
                subject_id: "SUBJ_001".to_string(),
                doc_type: kyc_common::models::DocumentType::Registration,
                compliant: true,
                processed_at: chrono::Utc::now(),
            },
            published_at: chrono::Utc::now(),
        };

        let input = audit_input(&envelope);
        assert_eq!(input.event_type, "document-processed");
        assert_eq!(input.component, "ingestion");
        assert_eq!(input.action, "process_document");
        assert_eq!(input.subject_id.as_deref(), Some("SUBJ_001"));
        assert_eq!(input.status, AuditStatus::Success);
    }
}
