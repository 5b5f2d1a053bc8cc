//! Core types for the cohort analyzer.
//!
//! Holds the event and cohort data model, the shared error type, CLI
//! settings, raw-value parsing helpers and display formatting.

pub mod data_processors;
pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;

pub use error::{CohortError, Result};
pub use models::{
    Cohort, CohortDraft, CohortId, CohortSummary, Comparator, Condition, ConditionDraft, Event,
    EventProperty, Logic, Operation, UserDetail,
};
