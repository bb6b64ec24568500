//! Type-specific KYC rule checks
//!
//! The coordinator is written against the [`ValidationRules`] trait;
//! [`StandardRules`] is the built-in rule set. Each check scans the
//! document text for the fields a reviewer would look for and accumulates
//! a score; a failed check is a normal `failed` outcome, never an error.

use kyc_common::models::{DocumentType, ValidationStatus};
use regex::Regex;

/// Result of evaluating one document against its type's rules
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub status: ValidationStatus,
    pub score: f64,
    pub identity_verified: bool,
    pub address_verified: bool,
    pub business_verified: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl RuleOutcome {
    fn pending(issue: &str, recommendation: &str) -> Self {
        Self {
            status: ValidationStatus::Pending,
            score: 0.5,
            identity_verified: false,
            address_verified: false,
            business_verified: false,
            issues: vec![issue.to_string()],
            recommendations: vec![recommendation.to_string()],
        }
    }
}

/// Rule-check seam; implementations are injected into the coordinator
pub trait ValidationRules: Send + Sync {
    fn evaluate(&self, doc_type: DocumentType, text: &str) -> RuleOutcome;
}

/// Built-in rule set
pub struct StandardRules {
    registration_number: Regex,
    account_number: Regex,
    iban: Regex,
    id_number: Regex,
    date: Regex,
}

const CURRENCY_TOKENS: [&str; 5] = ["sar", "usd", "eur", "gbp", "currency"];

impl StandardRules {
    pub fn new() -> Self {
        // Patterns are compile-time constants; a failure here is a
        // programming error, not a runtime condition
        Self {
            registration_number: Regex::new(r"\b\d{10}\b").expect("static pattern"),
            account_number: Regex::new(r"\b\d{10,}\b").expect("static pattern"),
            iban: Regex::new(r"\b[A-Z]{2}\d{13,30}\b").expect("static pattern"),
            id_number: Regex::new(r"\b\d{8,12}\b").expect("static pattern"),
            date: Regex::new(r"\d{1,2}/\d{1,2}/\d{4}").expect("static pattern"),
        }
    }

    fn has_currency(text_lower: &str) -> bool {
        CURRENCY_TOKENS.iter().any(|token| text_lower.contains(token))
    }

    fn check_registration(&self, text: &str) -> RuleOutcome {
        let lower = text.to_lowercase();
        let mut score = 0.0;
        let mut issues = Vec::new();

        if self.registration_number.is_match(text) {
            score += 0.3;
        } else {
            issues.push("Valid 10-digit registration number not found".to_string());
        }
        if ["company", "corporation", "ltd", "llc"].iter().any(|w| lower.contains(w)) {
            score += 0.2;
        } else {
            issues.push("Company name not clearly identified".to_string());
        }
        if lower.contains("capital") {
            score += 0.2;
        } else {
            issues.push("Capital amount not specified".to_string());
        }
        if Self::has_currency(&lower) {
            score += 0.2;
        } else {
            issues.push("Currency not mentioned".to_string());
        }
        if self.date.is_match(text) {
            score += 0.1;
        }

        let passed = score >= 0.7;
        RuleOutcome {
            status: if passed { ValidationStatus::Passed } else { ValidationStatus::Failed },
            score,
            identity_verified: false,
            address_verified: false,
            business_verified: passed,
            recommendations: if issues.is_empty() {
                vec![]
            } else {
                vec!["Ensure all registration details are visible".to_string()]
            },
            issues,
        }
    }

    fn check_identity(&self, text: &str) -> RuleOutcome {
        let lower = text.to_lowercase();
        let mut score = 0.0;
        let mut issues = Vec::new();

        if self.id_number.is_match(text) {
            score += 0.4;
        } else {
            issues.push("Valid identity number not found".to_string());
        }
        if lower.contains("name") {
            score += 0.3;
        }
        if lower.contains("birth") {
            score += 0.2;
        }
        if lower.contains("nationality") {
            score += 0.1;
        }

        let passed = score >= 0.7;
        RuleOutcome {
            status: if passed { ValidationStatus::Passed } else { ValidationStatus::Failed },
            score,
            identity_verified: passed,
            address_verified: false,
            business_verified: false,
            recommendations: if issues.is_empty() {
                vec![]
            } else {
                vec!["Ensure the identity document is clearly readable".to_string()]
            },
            issues,
        }
    }

    fn check_financial_statement(&self, text: &str) -> RuleOutcome {
        let lower = text.to_lowercase();
        let mut score = 0.0;
        let mut issues = Vec::new();

        if self.account_number.is_match(text) {
            score += 0.3;
        } else {
            issues.push("Account number not found".to_string());
        }
        if self.iban.is_match(text) {
            score += 0.3;
        } else {
            issues.push("IBAN not found".to_string());
        }
        if Self::has_currency(&lower) {
            score += 0.2;
        } else {
            issues.push("Currency not mentioned".to_string());
        }
        if lower.contains("bank") {
            score += 0.2;
        }

        let passed = score >= 0.6;
        RuleOutcome {
            status: if passed { ValidationStatus::Passed } else { ValidationStatus::Failed },
            score,
            identity_verified: false,
            address_verified: passed,
            business_verified: false,
            recommendations: if issues.is_empty() {
                vec![]
            } else {
                vec!["Provide a recent bank statement".to_string()]
            },
            issues,
        }
    }
}

impl Default for StandardRules {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationRules for StandardRules {
    fn evaluate(&self, doc_type: DocumentType, text: &str) -> RuleOutcome {
        match doc_type {
            DocumentType::Registration => self.check_registration(text),
            DocumentType::Identity => self.check_identity(text),
            DocumentType::FinancialStatement => self.check_financial_statement(text),
            DocumentType::TaxCertificate | DocumentType::Unknown => RuleOutcome::pending(
                "Document type has no automated rule set",
                "Manual review required",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRATION_TEXT: &str = "\
        Commercial Registration Certificate\n\
        Company Name: Al-Rashid Technologies LLC\n\
        Registration Number: 1010345678\n\
        Issue Date: 01/01/2026\n\
        Authorized Capital: 5,000,000 SAR\n";

    const IDENTITY_TEXT: &str = "\
        National Identity Card\n\
        Name: Jordan Example\n\
        ID Number: 1045678901\n\
        Date of Birth: 12/04/1988\n\
        Nationality: Example\n";

    const STATEMENT_TEXT: &str = "\
        Example Bank Monthly Statement\n\
        Account: 1234567890123\n\
        IBAN: SA4420000001234567891234\n\
        Closing balance: 52,300.00 SAR\n";

    #[test]
    fn test_registration_passes_with_full_details() {
        let outcome = StandardRules::new().evaluate(DocumentType::Registration, REGISTRATION_TEXT);
        assert_eq!(outcome.status, ValidationStatus::Passed);
        assert!(outcome.business_verified);
        assert!(outcome.score >= 0.7);
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn test_registration_fails_without_number() {
        let outcome = StandardRules::new()
            .evaluate(DocumentType::Registration, "Company: Acme Ltd, capital in USD");
        assert_eq!(outcome.status, ValidationStatus::Failed);
        assert!(!outcome.business_verified);
        assert!(outcome
            .issues
            .iter()
            .any(|i| i.contains("registration number")));
        assert!(!outcome.recommendations.is_empty());
    }

    #[test]
    fn test_identity_passes() {
        let outcome = StandardRules::new().evaluate(DocumentType::Identity, IDENTITY_TEXT);
        assert_eq!(outcome.status, ValidationStatus::Passed);
        assert!(outcome.identity_verified);
    }

    #[test]
    fn test_identity_fails_on_sparse_text() {
        let outcome = StandardRules::new().evaluate(DocumentType::Identity, "illegible scan");
        assert_eq!(outcome.status, ValidationStatus::Failed);
        assert!(outcome.issues.iter().any(|i| i.contains("identity number")));
    }

    #[test]
    fn test_financial_statement_passes() {
        let outcome =
            StandardRules::new().evaluate(DocumentType::FinancialStatement, STATEMENT_TEXT);
        assert_eq!(outcome.status, ValidationStatus::Passed);
        assert!(outcome.address_verified);
    }

    #[test]
    fn test_unknown_type_is_pending_not_error() {
        let outcome = StandardRules::new().evaluate(DocumentType::Unknown, "anything");
        assert_eq!(outcome.status, ValidationStatus::Pending);
        assert_eq!(outcome.score, 0.5);
        assert!(outcome.recommendations.iter().any(|r| r.contains("Manual review")));
    }
}
