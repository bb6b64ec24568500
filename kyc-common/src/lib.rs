//! # KYC Common Library
//!
//! Shared code for the KYC compliance pipeline services including:
//! - Data models (documents, validations, summaries, audit events)
//! - Event vocabulary and EventBus contract (plus in-process mock)
//! - Configuration loading
//! - Database schema initialization
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
