//! Data layer for the cohort analyzer.
//!
//! Loads and generates user events, stores them behind the [`store::EventStore`]
//! seam, evaluates conditions and cohorts against them, and projects
//! per-user activity rows.

pub mod engine;
pub mod evaluator;
pub mod generator;
pub mod projection;
pub mod reader;
pub mod store;

pub use cohort_core as core;
pub use engine::CohortEngine;
pub use store::{EventStore, MemoryEventStore};
