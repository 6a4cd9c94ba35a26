//! Intake funnel — a multi-page questionnaire with per-step persistence.

pub mod config;
pub mod error;
pub mod local;
pub mod questionnaire;
pub mod store;
