//! Pipeline coordinator
//!
//! Orchestrates the four stages (ingest → validate → summarize → audit),
//! consuming from the tiered store and cache, invoking the scoring engine
//! and anomaly detector, and publishing a lifecycle event per stage
//! transition. Constructed with interface-typed handles so every
//! collaborator can be substituted with an in-memory double.
//!
//! Failure semantics: only `NotFound` and invalid caller input abort an
//! operation. Store, cache, and bus trouble degrades the optional
//! guarantee (durability tier, caching, eventing) with a logged warning
//! but never the primary data-producing operation.

mod report;

pub use report::{AuditReport, StatusSummary};

use crate::anomaly::AnomalyDetector;
use crate::cache::{keys, Cache};
use crate::classify::DocumentClassifier;
use crate::rules::ValidationRules;
use crate::scoring::ScoringEngine;
use crate::store::{
    get_record, put_record, query_records, Collection, QueryFilter, RecordMeta, Store, StoreStatus,
    Tier,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use kyc_common::config::CacheConfig;
use kyc_common::events::{EventBus, EventPayload};
use kyc_common::models::{
    AuditEvent, AuditStatus, ChatTurn, ComplianceSummary, Document, KycValidation, ValidationStatus,
};
use kyc_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Most chat turns retained per session in the cached history
const CHAT_HISTORY_LIMIT: usize = 50;

/// Caller-supplied fields of an audit event
#[derive(Debug, Clone)]
pub struct AuditInput {
    pub event_type: String,
    pub component: String,
    pub subject_id: Option<String>,
    pub action: String,
    pub details: serde_json::Value,
    pub status: AuditStatus,
}

pub struct PipelineCoordinator {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    bus: Arc<dyn EventBus>,
    scoring: ScoringEngine,
    anomaly: AnomalyDetector,
    rules: Arc<dyn ValidationRules>,
    classifier: Arc<dyn DocumentClassifier>,
    validation_ttl: Duration,
    summary_ttl: Duration,
    chat_ttl: Duration,
    /// One writer at a time per subject for the summary upsert
    summary_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PipelineCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        bus: Arc<dyn EventBus>,
        anomaly: AnomalyDetector,
        rules: Arc<dyn ValidationRules>,
        classifier: Arc<dyn DocumentClassifier>,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            store,
            cache,
            bus,
            scoring: ScoringEngine::new(),
            anomaly,
            rules,
            classifier,
            validation_ttl: Duration::from_secs(cache_config.validation_ttl_secs),
            summary_ttl: Duration::from_secs(cache_config.summary_ttl_secs),
            chat_ttl: Duration::from_secs(cache_config.chat_ttl_secs),
            summary_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Current store health, for observability endpoints
    pub fn store_status(&self) -> StoreStatus {
        self.store.status()
    }

    // ========================================
    // Stage: ingest
    // ========================================

    /// Ingest an extracted document for a subject.
    ///
    /// Classifies the text, writes the immutable Document record under a
    /// content fingerprint, and announces `document-processed` followed by
    /// `kyc-validation-requested`.
    pub async fn ingest(&self, subject_id: &str, source: &str, text: &str) -> Result<Document> {
        if subject_id.trim().is_empty() {
            return Err(Error::InvalidInput("subject id must not be empty".to_string()));
        }

        let classification = self.classifier.classify(text);
        let now = Utc::now();
        let id = Document::fingerprint(subject_id, source, text, now);

        let document = Document {
            id: id.clone(),
            subject_id: subject_id.to_string(),
            doc_type: classification.doc_type,
            content: text.to_string(),
            content_length: text.len(),
            compliant: classification.compliant,
            issues: classification.issues,
            recommendations: classification.recommendations,
            created_at: now,
        };

        let tier = put_record(
            self.store.as_ref(),
            Collection::Documents,
            &id,
            RecordMeta::new(Some(subject_id), now),
            &document,
        )
        .await?;
        self.note_tier("document", &id, tier);

        info!(
            document_id = %id,
            subject_id,
            doc_type = %document.doc_type,
            "Document ingested"
        );

        self.publish(
            &id,
            EventPayload::DocumentProcessed {
                document_id: id.clone(),
                subject_id: subject_id.to_string(),
                doc_type: document.doc_type,
                compliant: document.compliant,
                processed_at: now,
            },
        )
        .await;
        self.publish(
            &id,
            EventPayload::KycValidationRequested {
                document_id: id.clone(),
                subject_id: subject_id.to_string(),
                doc_type: document.doc_type,
            },
        )
        .await;

        Ok(document)
    }

    // ========================================
    // Stage: validate
    // ========================================

    /// Run KYC validation for one document.
    ///
    /// Cache-fronted: a cached validation inside its TTL is returned
    /// as-is. A missing document is a hard error; a document that fails
    /// its rule checks is a normal `failed` validation.
    pub async fn validate(&self, document_id: &str, subject_id: &str) -> Result<KycValidation> {
        let cache_key = keys::kyc(document_id);
        if let Some(cached) = self.cached::<KycValidation>(&cache_key).await {
            debug!(document_id, "Returning cached KYC validation");
            return Ok(cached);
        }

        let document: Document =
            get_record(self.store.as_ref(), Collection::Documents, document_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("document {document_id}")))?;

        if document.subject_id != subject_id {
            return Err(Error::InvalidInput(format!(
                "document {document_id} belongs to subject {}, not {subject_id}",
                document.subject_id
            )));
        }

        let outcome = self.rules.evaluate(document.doc_type, &document.content);
        let now = Utc::now();
        let validation = KycValidation {
            id: Uuid::new_v4(),
            document_id: document_id.to_string(),
            subject_id: subject_id.to_string(),
            status: outcome.status,
            score: outcome.score,
            identity_verified: outcome.identity_verified,
            address_verified: outcome.address_verified,
            business_verified: outcome.business_verified,
            issues: outcome.issues,
            recommendations: outcome.recommendations,
            validated_at: now,
        };

        // Re-validation appends under a fresh id; history is preserved
        let tier = put_record(
            self.store.as_ref(),
            Collection::KycValidations,
            &validation.id.to_string(),
            RecordMeta::new(Some(subject_id), now),
            &validation,
        )
        .await?;
        self.note_tier("validation", &validation.id.to_string(), tier);

        self.cache_put(&cache_key, &validation, self.validation_ttl).await;

        info!(
            document_id,
            subject_id,
            status = %validation.status,
            score = validation.score,
            "KYC validation complete"
        );

        self.publish(
            document_id,
            EventPayload::KycValidationCompleted {
                validation_id: validation.id,
                document_id: document_id.to_string(),
                subject_id: subject_id.to_string(),
                status: validation.status,
                score: validation.score,
                validated_at: now,
            },
        )
        .await;

        if validation.status == ValidationStatus::Passed {
            self.publish(
                subject_id,
                EventPayload::ComplianceSummaryRequested {
                    subject_id: subject_id.to_string(),
                    validation_id: Some(validation.id),
                    requested_at: now,
                },
            )
            .await;
        }

        Ok(validation)
    }

    // ========================================
    // Stage: summarize
    // ========================================

    /// Generate or refresh the compliance summary for a subject.
    ///
    /// Upserts the single per-subject Summary record; regeneration updates
    /// it in place under a per-subject lock so concurrent calls cannot
    /// produce duplicates.
    pub async fn summarize(&self, subject_id: &str) -> Result<ComplianceSummary> {
        if subject_id.trim().is_empty() {
            return Err(Error::InvalidInput("subject id must not be empty".to_string()));
        }

        let cache_key = keys::summary(subject_id);
        if let Some(cached) = self.cached::<ComplianceSummary>(&cache_key).await {
            debug!(subject_id, "Returning cached compliance summary");
            return Ok(cached);
        }

        let lock = self.subject_lock(subject_id).await;
        let _guard = lock.lock().await;

        let documents: Vec<Document> = query_records(
            self.store.as_ref(),
            Collection::Documents,
            QueryFilter::by_subject(subject_id),
        )
        .await?;
        let validations: Vec<KycValidation> = query_records(
            self.store.as_ref(),
            Collection::KycValidations,
            QueryFilter::by_subject(subject_id),
        )
        .await?;

        let score = self.scoring.score(&documents, &validations);
        let now = Utc::now();

        // Regeneration keeps the original generation time
        let existing: Option<ComplianceSummary> =
            get_record(self.store.as_ref(), Collection::ComplianceSummaries, subject_id).await?;

        let summary = ComplianceSummary {
            subject_id: subject_id.to_string(),
            total_documents: documents.len(),
            validated_documents: validations.len(),
            compliant_documents: score.compliant_count,
            overall_score: score.overall_score,
            status: score.status,
            summary_text: compose_summary_text(subject_id, documents.len(), &score),
            issues: score.issues.clone(),
            recommendations: score.recommendations.clone(),
            generated_at: existing.map_or(now, |e| e.generated_at),
            updated_at: now,
        };

        let tier = put_record(
            self.store.as_ref(),
            Collection::ComplianceSummaries,
            subject_id,
            RecordMeta::new(Some(subject_id), now),
            &summary,
        )
        .await?;
        self.note_tier("summary", subject_id, tier);

        self.cache_put(&cache_key, &summary, self.summary_ttl).await;

        info!(
            subject_id,
            status = %summary.status,
            score = summary.overall_score,
            "Compliance summary generated"
        );

        self.publish(
            subject_id,
            EventPayload::ComplianceSummaryGenerated {
                subject_id: subject_id.to_string(),
                status: summary.status,
                score: summary.overall_score,
                generated_at: now,
            },
        )
        .await;

        Ok(summary)
    }

    // ========================================
    // Stage: audit
    // ========================================

    /// Record an audit event.
    ///
    /// Always succeeds from the caller's point of view: the tiered store
    /// absorbs durability trouble and anomaly detection is best-effort.
    pub async fn audit(&self, input: AuditInput) -> AuditEvent {
        let mut event = AuditEvent {
            id: Uuid::new_v4(),
            event_type: input.event_type,
            component: input.component,
            subject_id: input.subject_id,
            action: input.action,
            details: input.details,
            status: input.status,
            anomaly: false,
            occurred_at: Utc::now(),
        };

        let anomalies = self.anomaly.observe(&event).await;
        event.anomaly = !anomalies.is_empty();

        let write = put_record(
            self.store.as_ref(),
            Collection::AuditLogs,
            &event.id.to_string(),
            RecordMeta::new(event.subject_id.as_deref(), event.occurred_at),
            &event,
        )
        .await;
        match write {
            Ok(tier) => self.note_tier("audit event", &event.id.to_string(), tier),
            Err(e) => warn!(error = %e, "Audit event not persisted"),
        }

        self.publish(
            &event.id.to_string(),
            EventPayload::AuditLogged {
                event_id: event.id,
                event_type: event.event_type.clone(),
                component: event.component.clone(),
                subject_id: event.subject_id.clone(),
                status: event.status,
                occurred_at: event.occurred_at,
            },
        )
        .await;

        for anomaly in anomalies {
            self.anomaly.record_alert(&anomaly).await;
            let key = event.subject_id.clone().unwrap_or_else(|| event.event_type.clone());
            self.publish(&key, EventPayload::AuditAnomaly { anomaly }).await;
        }

        event
    }

    /// Aggregate the audit trail into a report.
    ///
    /// Defaults to the last 24 hours when no range is given.
    pub async fn audit_report(
        &self,
        subject_id: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<AuditReport> {
        let end = end.unwrap_or_else(Utc::now);
        let start = start.unwrap_or(end - ChronoDuration::days(1));
        if start > end {
            return Err(Error::InvalidInput("report start is after its end".to_string()));
        }

        let filter = QueryFilter::between(start, end).with_subject(subject_id);
        let events: Vec<AuditEvent> =
            query_records(self.store.as_ref(), Collection::AuditLogs, filter).await?;

        Ok(report::build_report(&events, subject_id, start, end))
    }

    // ========================================
    // Stage: chat
    // ========================================

    /// Record one retrieval-augmented chat turn.
    ///
    /// The response itself is produced by external collaborators; the
    /// pipeline keeps the session history (cache, 2 h TTL) and announces
    /// the interaction.
    pub async fn chat(
        &self,
        session_id: &str,
        subject_id: Option<&str>,
        query: &str,
        response: &str,
        documents_referenced: Vec<String>,
    ) -> Result<ChatTurn> {
        if session_id.trim().is_empty() {
            return Err(Error::InvalidInput("session id must not be empty".to_string()));
        }

        let turn = ChatTurn {
            session_id: session_id.to_string(),
            subject_id: subject_id.map(str::to_string),
            query: query.to_string(),
            response: response.to_string(),
            documents_referenced,
            occurred_at: Utc::now(),
        };

        let mut history = self.history(session_id).await;
        history.push(turn.clone());
        if history.len() > CHAT_HISTORY_LIMIT {
            history.drain(..history.len() - CHAT_HISTORY_LIMIT);
        }
        self.cache_put(&keys::chat_history(session_id), &history, self.chat_ttl)
            .await;

        self.publish(
            session_id,
            EventPayload::ChatInteraction {
                session_id: session_id.to_string(),
                subject_id: turn.subject_id.clone(),
                query: turn.query.clone(),
                documents_referenced: turn.documents_referenced.len(),
                occurred_at: turn.occurred_at,
            },
        )
        .await;

        Ok(turn)
    }

    /// Cached conversation history for a session (empty when the cache is
    /// cold or unreachable)
    pub async fn history(&self, session_id: &str) -> Vec<ChatTurn> {
        self.cached::<Vec<ChatTurn>>(&keys::chat_history(session_id))
            .await
            .unwrap_or_default()
    }

    // ========================================
    // Internals
    // ========================================

    async fn subject_lock(&self, subject_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.summary_locks.lock().await;
        locks.entry(subject_id.to_string()).or_default().clone()
    }

    /// Fire-and-forget publish: failures are logged, never raised
    async fn publish(&self, key: &str, payload: EventPayload) {
        let topic = payload.topic();
        if let Err(e) = self.bus.publish(topic, key, payload).await {
            warn!(topic = %topic, key, error = %e, "Event publish failed, continuing");
        }
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.cache.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable cache entry");
                None
            }
        }
    }

    async fn cache_put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.cache.set(key, &raw, ttl).await,
            Err(e) => warn!(key, error = %e, "Skipping cache of unserializable value"),
        }
    }

    fn note_tier(&self, what: &str, key: &str, tier: Tier) {
        if tier == Tier::Memory {
            warn!(what, key, "Record accepted by memory tier only (degraded durability)");
        }
    }
}

/// Narrative summary without any model in the loop
fn compose_summary_text(
    subject_id: &str,
    total_documents: usize,
    score: &crate::scoring::ScoreReport,
) -> String {
    let mut text = format!(
        "Compliance summary for subject {subject_id}: status is {} with {} of {} documents compliant. Overall compliance score: {:.1}%.",
        score.status.as_str().replace('_', " "),
        score.compliant_count,
        total_documents,
        score.overall_score * 100.0,
    );
    if !score.issues.is_empty() {
        let main: Vec<&str> = score.issues.iter().take(2).map(String::as_str).collect();
        text.push_str(&format!(" Main issues: {}.", main.join(", ")));
    }
    if !score.recommendations.is_empty() {
        let next: Vec<&str> = score.recommendations.iter().take(2).map(String::as_str).collect();
        text.push_str(&format!(" Next steps: {}.", next.join(", ")));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyc_common::models::ComplianceStatus;

    #[test]
    fn test_summary_text_mentions_status_and_issues() {
        let score = crate::scoring::ScoreReport {
            overall_score: 0.74,
            compliant_count: 2,
            status: ComplianceStatus::PartiallyCompliant,
            issues: vec!["Missing financial statement".to_string()],
            recommendations: vec!["Provide financial statement".to_string()],
        };
        let text = compose_summary_text("SUBJ_001", 3, &score);
        assert!(text.contains("SUBJ_001"));
        assert!(text.contains("partially compliant"));
        assert!(text.contains("2 of 3"));
        assert!(text.contains("74.0%"));
        assert!(text.contains("Missing financial statement"));
        assert!(text.contains("Next steps"));
    }

    #[test]
    fn test_summary_text_clean_subject() {
        let score = crate::scoring::ScoreReport {
            overall_score: 0.92,
            compliant_count: 3,
            status: ComplianceStatus::Compliant,
            issues: vec![],
            recommendations: vec![],
        };
        let text = compose_summary_text("SUBJ_002", 3, &score);
        assert!(text.contains("status is compliant"));
        assert!(!text.contains("Main issues"));
        assert!(!text.contains("Next steps"));
    }
}
