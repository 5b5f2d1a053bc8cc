//! Cohort registry and concurrent evaluation runtime.
//!
//! [`registry::CohortRegistry`] owns cohort definitions and evaluates them on
//! demand; [`orchestrator::SummaryOrchestrator`] fans evaluations of many
//! cohorts out over tokio's blocking pool.

pub mod orchestrator;
pub mod presets;
pub mod registry;

pub use orchestrator::{CohortMembers, EvaluationOutcome, SummaryOrchestrator};
pub use registry::CohortRegistry;
