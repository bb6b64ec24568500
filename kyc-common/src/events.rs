//! Event vocabulary and bus contract for the pipeline
//!
//! Every stage transition is announced on a named topic. Payloads are a
//! tagged union with one variant per topic, so a payload can never be
//! published under the wrong topic without being rejected at the boundary.
//!
//! Two bus implementations share the [`EventBus`] contract: the broker
//! client in the daemon crate, and [`MockEventBus`] here, which records
//! every envelope in an ordered per-topic buffer and invokes no handlers.
//! Callers are written against the trait only.

use crate::models::{Anomaly, AuditStatus, ComplianceStatus, DocumentType, ValidationStatus};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Fixed topic vocabulary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    DocumentProcessed,
    KycValidationRequested,
    KycValidationCompleted,
    ComplianceSummaryRequested,
    ComplianceSummaryGenerated,
    ChatInteraction,
    AuditLog,
    AuditAnomaly,
}

impl Topic {
    /// All topics, for subscription wiring
    pub const ALL: [Topic; 8] = [
        Topic::DocumentProcessed,
        Topic::KycValidationRequested,
        Topic::KycValidationCompleted,
        Topic::ComplianceSummaryRequested,
        Topic::ComplianceSummaryGenerated,
        Topic::ChatInteraction,
        Topic::AuditLog,
        Topic::AuditAnomaly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::DocumentProcessed => "document-processed",
            Topic::KycValidationRequested => "kyc-validation-requested",
            Topic::KycValidationCompleted => "kyc-validation-completed",
            Topic::ComplianceSummaryRequested => "compliance-summary-requested",
            Topic::ComplianceSummaryGenerated => "compliance-summary-generated",
            Topic::ChatInteraction => "chat-interaction",
            Topic::AuditLog => "audit-log",
            Topic::AuditAnomaly => "audit-anomaly",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown topic: {s}")))
    }
}

/// Per-topic event payloads
///
/// One variant per topic; [`EventPayload::topic`] is the authoritative
/// mapping and publish implementations reject mismatches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    /// A document finished ingestion
    DocumentProcessed {
        document_id: String,
        subject_id: String,
        doc_type: DocumentType,
        compliant: bool,
        processed_at: DateTime<Utc>,
    },

    /// A processed document awaits KYC validation
    KycValidationRequested {
        document_id: String,
        subject_id: String,
        doc_type: DocumentType,
    },

    /// KYC validation finished (passed or failed)
    KycValidationCompleted {
        validation_id: Uuid,
        document_id: String,
        subject_id: String,
        status: ValidationStatus,
        score: f64,
        validated_at: DateTime<Utc>,
    },

    /// A subject's summary should be (re)generated
    ComplianceSummaryRequested {
        subject_id: String,
        validation_id: Option<Uuid>,
        requested_at: DateTime<Utc>,
    },

    /// A subject's summary was generated or refreshed
    ComplianceSummaryGenerated {
        subject_id: String,
        status: ComplianceStatus,
        score: f64,
        generated_at: DateTime<Utc>,
    },

    /// A chat turn was recorded against the compliance corpus
    ChatInteraction {
        session_id: String,
        subject_id: Option<String>,
        query: String,
        documents_referenced: usize,
        occurred_at: DateTime<Utc>,
    },

    /// An audit trail entry was written
    AuditLogged {
        event_id: Uuid,
        event_type: String,
        component: String,
        subject_id: Option<String>,
        status: AuditStatus,
        occurred_at: DateTime<Utc>,
    },

    /// The anomaly detector fired
    AuditAnomaly { anomaly: Anomaly },
}

impl EventPayload {
    /// The topic this payload belongs on
    pub fn topic(&self) -> Topic {
        match self {
            EventPayload::DocumentProcessed { .. } => Topic::DocumentProcessed,
            EventPayload::KycValidationRequested { .. } => Topic::KycValidationRequested,
            EventPayload::KycValidationCompleted { .. } => Topic::KycValidationCompleted,
            EventPayload::ComplianceSummaryRequested { .. } => Topic::ComplianceSummaryRequested,
            EventPayload::ComplianceSummaryGenerated { .. } => Topic::ComplianceSummaryGenerated,
            EventPayload::ChatInteraction { .. } => Topic::ChatInteraction,
            EventPayload::AuditLogged { .. } => Topic::AuditLog,
            EventPayload::AuditAnomaly { .. } => Topic::AuditAnomaly,
        }
    }
}

/// The wire unit carried by every bus implementation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub topic: Topic,
    /// Partition/routing key: document id for document-keyed topics,
    /// subject id for subject-keyed topics
    pub key: String,
    pub payload: EventPayload,
    pub published_at: DateTime<Utc>,
}

/// Async subscription callback
pub type EventHandler = Arc<dyn Fn(EventEnvelope) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as an [`EventHandler`]
pub fn handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |envelope| Box::pin(f(envelope)))
}

/// Publish/subscribe contract shared by the broker client and the mock
///
/// Publishing is fire-and-forget from the pipeline's point of view:
/// implementations return `Err` for observability, but no stage requires
/// publish acknowledgment to proceed.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a payload on a topic. Fails with `InvalidInput` when the
    /// payload does not belong on the topic.
    async fn publish(&self, topic: Topic, key: &str, payload: EventPayload) -> Result<()>;

    /// Register a handler for a topic
    async fn subscribe(&self, topic: Topic, handler: EventHandler) -> Result<()>;
}

/// Reject topic/payload mismatches before anything reaches the wire
pub fn check_topic(topic: Topic, payload: &EventPayload) -> Result<()> {
    if payload.topic() != topic {
        return Err(Error::InvalidInput(format!(
            "payload for {} published on {}",
            payload.topic(),
            topic
        )));
    }
    Ok(())
}

/// In-process bus for tests and broker-less environments
///
/// Stores every published envelope in an ordered, inspectable per-topic
/// buffer. Handlers registered via `subscribe` are retained but never
/// invoked automatically; message loss when nothing drains the buffers is
/// accepted.
#[derive(Default)]
pub struct MockEventBus {
    buffers: Mutex<HashMap<Topic, Vec<EventEnvelope>>>,
    handlers: Mutex<HashMap<Topic, Vec<EventHandler>>>,
}

impl MockEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelopes published on a topic, in submission order
    pub fn published(&self, topic: Topic) -> Vec<EventEnvelope> {
        self.buffers
            .lock()
            .expect("mock bus buffer lock")
            .get(&topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Drain a topic's buffer
    pub fn take(&self, topic: Topic) -> Vec<EventEnvelope> {
        self.buffers
            .lock()
            .expect("mock bus buffer lock")
            .remove(&topic)
            .unwrap_or_default()
    }

    /// Total envelopes buffered across all topics
    pub fn len(&self) -> usize {
        self.buffers
            .lock()
            .expect("mock bus buffer lock")
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handlers registered for a topic (for wiring assertions)
    pub fn handler_count(&self, topic: Topic) -> usize {
        self.handlers
            .lock()
            .expect("mock bus handler lock")
            .get(&topic)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn publish(&self, topic: Topic, key: &str, payload: EventPayload) -> Result<()> {
        check_topic(topic, &payload)?;
        let envelope = EventEnvelope {
            topic,
            key: key.to_string(),
            payload,
            published_at: Utc::now(),
        };
        self.buffers
            .lock()
            .expect("mock bus buffer lock")
            .entry(topic)
            .or_default()
            .push(envelope);
        Ok(())
    }

    async fn subscribe(&self, topic: Topic, handler: EventHandler) -> Result<()> {
        self.handlers
            .lock()
            .expect("mock bus handler lock")
            .entry(topic)
            .or_default()
            .push(handler);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processed_payload(doc: &str) -> EventPayload {
        EventPayload::DocumentProcessed {
            document_id: doc.to_string(),
            subject_id: "SUBJ_001".to_string(),
            doc_type: DocumentType::Registration,
            compliant: true,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn test_topic_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
        }
        assert!("no-such-topic".parse::<Topic>().is_err());
    }

    #[test]
    fn test_topic_serde_matches_vocabulary() {
        let json = serde_json::to_string(&Topic::KycValidationRequested).unwrap();
        assert_eq!(json, "\"kyc-validation-requested\"");
    }

    #[test]
    fn test_payload_topic_mapping() {
        assert_eq!(processed_payload("d1").topic(), Topic::DocumentProcessed);
        let anomaly = EventPayload::AuditAnomaly {
            anomaly: Anomaly {
                kind: crate::models::AnomalyKind::EventRateSpike {
                    event_type: "audit-log".into(),
                    count: 101,
                },
                detected_at: Utc::now(),
            },
        };
        assert_eq!(anomaly.topic(), Topic::AuditAnomaly);
    }

    #[tokio::test]
    async fn test_mock_bus_preserves_per_topic_order() {
        let bus = MockEventBus::new();
        for i in 0..5 {
            bus.publish(
                Topic::DocumentProcessed,
                &format!("doc_{i}"),
                processed_payload(&format!("doc_{i}")),
            )
            .await
            .unwrap();
        }

        let buffered = bus.published(Topic::DocumentProcessed);
        assert_eq!(buffered.len(), 5);
        for (i, envelope) in buffered.iter().enumerate() {
            assert_eq!(envelope.key, format!("doc_{i}"));
        }
    }

    #[tokio::test]
    async fn test_mock_bus_rejects_topic_mismatch() {
        let bus = MockEventBus::new();
        let err = bus
            .publish(Topic::AuditLog, "doc_1", processed_payload("doc_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(bus.is_empty());
    }

    #[tokio::test]
    async fn test_mock_bus_never_invokes_handlers() {
        let bus = MockEventBus::new();
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = hits.clone();
        bus.subscribe(
            Topic::DocumentProcessed,
            handler(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
            }),
        )
        .await
        .unwrap();

        bus.publish(Topic::DocumentProcessed, "doc_1", processed_payload("doc_1"))
            .await
            .unwrap();

        assert_eq!(bus.handler_count(Topic::DocumentProcessed), 1);
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(bus.published(Topic::DocumentProcessed).len(), 1);
    }

    #[test]
    fn test_envelope_serde_round_trip() {
        let envelope = EventEnvelope {
            topic: Topic::ChatInteraction,
            key: "session_1".to_string(),
            payload: EventPayload::ChatInteraction {
                session_id: "session_1".to_string(),
                subject_id: None,
                query: "is SUBJ_001 compliant?".to_string(),
                documents_referenced: 3,
                occurred_at: Utc::now(),
            },
            published_at: Utc::now(),
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"topic\":\"chat-interaction\""));
        let back: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.topic, Topic::ChatInteraction);
        assert_eq!(back.key, "session_1");
    }
}
