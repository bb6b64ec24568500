//! Data models for the KYC compliance pipeline
//!
//! Documents are immutable once written; re-ingestion produces a new
//! fingerprint. Validations append (history preserved). Summaries are
//! keyed by subject and updated in place. Audit events are append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Classified document type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Registration,
    Identity,
    FinancialStatement,
    TaxCertificate,
    Unknown,
}

impl DocumentType {
    /// Document types a subject must provide for full compliance
    pub const MANDATORY: [DocumentType; 3] = [
        DocumentType::Registration,
        DocumentType::Identity,
        DocumentType::FinancialStatement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Registration => "registration",
            DocumentType::Identity => "identity",
            DocumentType::FinancialStatement => "financial_statement",
            DocumentType::TaxCertificate => "tax_certificate",
            DocumentType::Unknown => "unknown",
        }
    }

    /// Human-readable name for issue/recommendation text
    pub fn display_name(&self) -> &'static str {
        match self {
            DocumentType::Registration => "registration",
            DocumentType::Identity => "identity document",
            DocumentType::FinancialStatement => "financial statement",
            DocumentType::TaxCertificate => "tax certificate",
            DocumentType::Unknown => "unknown document",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An ingested document
///
/// The id is a content fingerprint (see [`Document::fingerprint`]), not a
/// counter: re-ingesting the same source at a later time yields a new
/// record under a new id rather than mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub subject_id: String,
    pub doc_type: DocumentType,
    /// Raw extracted text (extraction itself happens upstream)
    pub content: String,
    pub content_length: usize,
    pub compliant: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Derive a document fingerprint from subject, source name, content,
    /// and capture time.
    pub fn fingerprint(
        subject_id: &str,
        source: &str,
        content: &str,
        captured_at: DateTime<Utc>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(subject_id.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(source.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(content.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(captured_at.timestamp_micros().to_le_bytes());
        hex_encode(&hasher.finalize())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{:02x}", b);
        s
    })
}

/// Validation outcome status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pending,
    Passed,
    Failed,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationStatus::Pending => write!(f, "pending"),
            ValidationStatus::Passed => write!(f, "passed"),
            ValidationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A KYC validation of one document
///
/// One validation per document per run; re-validation appends a new record
/// so the history is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycValidation {
    pub id: Uuid,
    pub document_id: String,
    pub subject_id: String,
    pub status: ValidationStatus,
    /// Rule-check score in [0, 1]
    pub score: f64,
    pub identity_verified: bool,
    pub address_verified: bool,
    pub business_verified: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub validated_at: DateTime<Utc>,
}

/// Aggregate compliance status for a subject
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    PartiallyCompliant,
    NonCompliant,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "compliant",
            ComplianceStatus::PartiallyCompliant => "partially_compliant",
            ComplianceStatus::NonCompliant => "non_compliant",
        }
    }
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-subject compliance summary
///
/// At most one live summary exists per subject; regeneration updates the
/// existing record (updated_at moves, generated_at stays).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub subject_id: String,
    pub total_documents: usize,
    pub validated_documents: usize,
    pub compliant_documents: usize,
    pub overall_score: f64,
    pub status: ComplianceStatus,
    pub summary_text: String,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audit event status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
    Warning,
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStatus::Success => write!(f, "success"),
            AuditStatus::Failure => write!(f, "failure"),
            AuditStatus::Warning => write!(f, "warning"),
        }
    }
}

/// Append-only audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub event_type: String,
    /// Originating component (ingestion, kyc, summary, chat, ...)
    pub component: String,
    pub subject_id: Option<String>,
    pub action: String,
    pub details: serde_json::Value,
    pub status: AuditStatus,
    pub anomaly: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Detector-raised anomaly signal, distinct from a single failed operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Failure burst for one subject inside the failure window
    RepeatedFailure { subject_id: String, count: i64 },
    /// Event-rate spike for one event type inside the rate window
    EventRateSpike { event_type: String, count: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(flatten)]
    pub kind: AnomalyKind,
    pub detected_at: DateTime<Utc>,
}

impl Anomaly {
    pub fn describe(&self) -> String {
        match &self.kind {
            AnomalyKind::RepeatedFailure { subject_id, count } => {
                format!("repeated failures for subject {subject_id} ({count} in window)")
            }
            AnomalyKind::EventRateSpike { event_type, count } => {
                format!("high event rate for {event_type} ({count} in window)")
            }
        }
    }
}

/// One recorded chat interaction (history lives in the ephemeral cache)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub session_id: String,
    pub subject_id: Option<String>,
    pub query: String,
    pub response: String,
    pub documents_referenced: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}
