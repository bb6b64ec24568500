//! Audit report aggregation

use chrono::{DateTime, Utc};
use kyc_common::models::{AuditEvent, AuditStatus};
use serde::Serialize;
use std::collections::BTreeMap;

/// Success/failure/warning breakdown over a report window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub success: usize,
    pub failure: usize,
    pub warning: usize,
}

/// Aggregated view over the audit trail for a time window
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub report_id: String,
    pub subject_id: Option<String>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_events: usize,
    pub events_by_type: BTreeMap<String, usize>,
    pub events_by_component: BTreeMap<String, usize>,
    pub status_summary: StatusSummary,
    /// Events the detector flagged while they were logged
    pub anomalous_events: usize,
    pub report_text: String,
    pub generated_at: DateTime<Utc>,
}

/// Aggregate already-fetched events into a report
pub fn build_report(
    events: &[AuditEvent],
    subject_id: Option<&str>,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> AuditReport {
    let mut events_by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut events_by_component: BTreeMap<String, usize> = BTreeMap::new();
    let mut status_summary = StatusSummary::default();
    let mut anomalous_events = 0;

    for event in events {
        *events_by_type.entry(event.event_type.clone()).or_default() += 1;
        *events_by_component.entry(event.component.clone()).or_default() += 1;
        match event.status {
            AuditStatus::Success => status_summary.success += 1,
            AuditStatus::Failure => status_summary.failure += 1,
            AuditStatus::Warning => status_summary.warning += 1,
        }
        if event.anomaly {
            anomalous_events += 1;
        }
    }

    let generated_at = Utc::now();
    let report_text = compose_report_text(
        events.len(),
        subject_id,
        period_start,
        period_end,
        &status_summary,
        &events_by_component,
    );

    AuditReport {
        report_id: format!("audit_{}", generated_at.format("%Y%m%d_%H%M%S")),
        subject_id: subject_id.map(str::to_string),
        period_start,
        period_end,
        total_events: events.len(),
        events_by_type,
        events_by_component,
        status_summary,
        anomalous_events,
        report_text,
        generated_at,
    }
}

fn compose_report_text(
    total: usize,
    subject_id: Option<&str>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    status: &StatusSummary,
    by_component: &BTreeMap<String, usize>,
) -> String {
    let success_rate = if total > 0 {
        status.success as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let mut text = format!(
        "Audit report for period {} to {}. Total of {total} events processed",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
    );
    if let Some(subject) = subject_id {
        text.push_str(&format!(" for subject {subject}"));
    }
    text.push_str(&format!(" with {success_rate:.1}% success rate. "));

    if let Some((component, _)) = by_component.iter().max_by_key(|(_, count)| **count) {
        text.push_str(&format!("Most active component: {component}. "));
    }

    if status.failure > 0 {
        text.push_str(&format!("Note: {} failed operations require attention.", status.failure));
    } else {
        text.push_str("All operations completed successfully.");
    }
    text
}
