//! Text reports and tabular exports for the cohort analyzer.
//!
//! Renders the cohort summary, dataset insights and per-cohort user
//! listings as plain text, and writes CSV or JSON exports.

pub mod export;
pub mod insights_view;
pub mod summary_view;
pub mod table_view;

pub use export::{ExportFormat, Exporter};
pub use insights_view::{render_data_insights, DataInsights};
pub use summary_view::render_cohort_summary;
pub use table_view::render_user_table;
