//! Compliance scoring
//!
//! Pure and deterministic: identical inputs always produce identical
//! output, so the engine needs no seam for testing and no state.

use kyc_common::models::{ComplianceStatus, Document, DocumentType, KycValidation, ValidationStatus};

/// Weight of the document compliance rate in the overall score
const DOCUMENT_WEIGHT: f64 = 0.6;
/// Weight of the mean validation score in the overall score
const VALIDATION_WEIGHT: f64 = 0.4;

const COMPLIANT_THRESHOLD: f64 = 0.8;
const PARTIAL_THRESHOLD: f64 = 0.6;

/// Output of one scoring pass over a subject's records
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    pub overall_score: f64,
    pub compliant_count: usize,
    pub status: ComplianceStatus,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score a subject's documents and validations.
    ///
    /// overall = 0.6 * document_compliance_rate + 0.4 * mean_validation_score,
    /// with each term 0 when its inputs are empty. Thresholds: >= 0.8
    /// compliant, >= 0.6 partially compliant, else non-compliant.
    pub fn score(&self, documents: &[Document], validations: &[KycValidation]) -> ScoreReport {
        let compliant_count = documents.iter().filter(|d| d.compliant).count();
        let document_rate = if documents.is_empty() {
            0.0
        } else {
            compliant_count as f64 / documents.len() as f64
        };

        let mean_validation = if validations.is_empty() {
            0.0
        } else {
            validations.iter().map(|v| v.score).sum::<f64>() / validations.len() as f64
        };

        let overall_score = DOCUMENT_WEIGHT * document_rate + VALIDATION_WEIGHT * mean_validation;

        let status = if overall_score >= COMPLIANT_THRESHOLD {
            ComplianceStatus::Compliant
        } else if overall_score >= PARTIAL_THRESHOLD {
            ComplianceStatus::PartiallyCompliant
        } else {
            ComplianceStatus::NonCompliant
        };

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        for required in DocumentType::MANDATORY {
            if !documents.iter().any(|d| d.doc_type == required) {
                issues.push(format!("Missing {}", required.display_name()));
                recommendations.push(format!("Provide {}", required.display_name()));
            }
        }

        for validation in validations {
            if validation.status != ValidationStatus::Passed {
                let short_id: String = validation.document_id.chars().take(8).collect();
                issues.push(format!("Document {short_id} validation failed"));
            }
        }

        ScoreReport {
            overall_score,
            compliant_count,
            status,
            issues,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn doc(doc_type: DocumentType, compliant: bool) -> Document {
        Document {
            id: format!("{doc_type}_fingerprint_0000"),
            subject_id: "SUBJ_001".to_string(),
            doc_type,
            content: String::new(),
            content_length: 0,
            compliant,
            issues: vec![],
            recommendations: vec![],
            created_at: Utc::now(),
        }
    }

    fn validation(score: f64, status: ValidationStatus) -> KycValidation {
        KycValidation {
            id: Uuid::new_v4(),
            document_id: "abcdef0123456789".to_string(),
            subject_id: "SUBJ_001".to_string(),
            status,
            score,
            identity_verified: false,
            address_verified: false,
            business_verified: false,
            issues: vec![],
            recommendations: vec![],
            validated_at: Utc::now(),
        }
    }

    #[test]
    fn test_worked_example() {
        // Two compliant documents of three, validations 0.9 and 0.8 both
        // passed: rate 2/3, mean 0.85, overall ~0.740
        let documents = vec![
            doc(DocumentType::Registration, true),
            doc(DocumentType::Identity, true),
            doc(DocumentType::TaxCertificate, false),
        ];
        let validations = vec![
            validation(0.9, ValidationStatus::Passed),
            validation(0.8, ValidationStatus::Passed),
        ];

        let report = ScoringEngine::new().score(&documents, &validations);
        assert!((report.overall_score - 0.740).abs() < 0.001, "got {}", report.overall_score);
        assert_eq!(report.status, ComplianceStatus::PartiallyCompliant);
        assert_eq!(report.compliant_count, 2);
        assert!(report
            .issues
            .iter()
            .any(|i| i.contains("financial statement")));
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("financial statement")));
    }

    #[test]
    fn test_deterministic() {
        let documents = vec![doc(DocumentType::Registration, true)];
        let validations = vec![validation(0.7, ValidationStatus::Passed)];
        let engine = ScoringEngine::new();
        let first = engine.score(&documents, &validations);
        for _ in 0..10 {
            assert_eq!(engine.score(&documents, &validations), first);
        }
    }

    #[test]
    fn test_empty_inputs() {
        let report = ScoringEngine::new().score(&[], &[]);
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.status, ComplianceStatus::NonCompliant);
        assert_eq!(report.compliant_count, 0);
        // All three mandatory types are missing
        assert_eq!(report.issues.len(), 3);
        assert_eq!(report.recommendations.len(), 3);
    }

    #[test]
    fn test_full_compliance() {
        let documents = vec![
            doc(DocumentType::Registration, true),
            doc(DocumentType::Identity, true),
            doc(DocumentType::FinancialStatement, true),
        ];
        let validations = vec![
            validation(0.9, ValidationStatus::Passed),
            validation(0.85, ValidationStatus::Passed),
            validation(0.95, ValidationStatus::Passed),
        ];

        let report = ScoringEngine::new().score(&documents, &validations);
        assert_eq!(report.status, ComplianceStatus::Compliant);
        assert!(report.issues.is_empty());
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_failed_validation_produces_truncated_issue() {
        let documents = vec![doc(DocumentType::Registration, true)];
        let validations = vec![validation(0.3, ValidationStatus::Failed)];

        let report = ScoringEngine::new().score(&documents, &validations);
        assert!(report.issues.iter().any(|i| i.contains("abcdef01")));
        assert!(!report.issues.iter().any(|i| i.contains("abcdef0123456789")));
    }

    #[test]
    fn test_no_documents_still_credits_validations() {
        // Rate term contributes 0; validation mean still carries 40%
        let validations = vec![validation(1.0, ValidationStatus::Passed)];
        let report = ScoringEngine::new().score(&[], &validations);
        assert!((report.overall_score - 0.4).abs() < f64::EPSILON);
        assert_eq!(report.status, ComplianceStatus::NonCompliant);
    }

    #[test]
    fn test_status_tiers() {
        let engine = ScoringEngine::new();
        let all = vec![
            doc(DocumentType::Registration, true),
            doc(DocumentType::Identity, true),
            doc(DocumentType::FinancialStatement, true),
        ];

        // rate 1.0, mean 0.75 → 0.9 → compliant
        let report = engine.score(&all, &[validation(0.75, ValidationStatus::Passed)]);
        assert_eq!(report.status, ComplianceStatus::Compliant);

        // rate 1/3, mean 0.75 → 0.5 → non-compliant
        let one = vec![
            doc(DocumentType::Registration, true),
            doc(DocumentType::Identity, false),
            doc(DocumentType::FinancialStatement, false),
        ];
        let report = engine.score(&one, &[validation(0.75, ValidationStatus::Passed)]);
        assert_eq!(report.status, ComplianceStatus::NonCompliant);
    }
}
