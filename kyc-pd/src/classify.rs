//! Document classification seam
//!
//! Real deployments plug in an external classifier (typically
//! model-backed); the pipeline only depends on this trait. The built-in
//! keyword heuristic keeps ingestion working when no classifier service
//! is wired in.

use kyc_common::models::DocumentType;

/// Classifier output consumed by `ingest`
#[derive(Debug, Clone)]
pub struct Classification {
    pub doc_type: DocumentType,
    pub compliant: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

pub trait DocumentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Classification;
}

/// Keyword-based classifier used when no external classifier is wired in
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Classification {
        let lower = text.to_lowercase();

        let doc_type = if lower.contains("commercial registration") || lower.contains("registration certificate") {
            DocumentType::Registration
        } else if lower.contains("identity") || lower.contains("national id") || lower.contains("passport") {
            DocumentType::Identity
        } else if lower.contains("bank statement") || lower.contains("account statement") || lower.contains("balance") {
            DocumentType::FinancialStatement
        } else if lower.contains("tax") {
            DocumentType::TaxCertificate
        } else {
            DocumentType::Unknown
        };

        if doc_type == DocumentType::Unknown {
            Classification {
                doc_type,
                compliant: false,
                issues: vec!["Could not determine document type".to_string()],
                recommendations: vec!["Please review manually".to_string()],
            }
        } else {
            // A recognizable, non-empty document is treated as compliant at
            // ingestion; the KYC rule checks decide the rest
            Classification {
                doc_type,
                compliant: !text.trim().is_empty(),
                issues: vec![],
                recommendations: vec![],
            }
        }
    }
}
