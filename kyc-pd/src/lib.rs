//! kyc-pd - Compliance Pipeline Daemon
//!
//! Event-driven coordinator for the KYC compliance workflow:
//! ingest → validate → summarize → audit, with tiered storage, ephemeral
//! caching, compliance scoring, and anomaly detection over the audit
//! stream.

pub mod anomaly;
pub mod bus;
pub mod cache;
pub mod classify;
pub mod coordinator;
pub mod rules;
pub mod scoring;
pub mod store;
pub mod workers;
