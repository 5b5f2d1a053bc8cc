//! Tabular export of cohort members.
//!
//! An export holds one table per evaluated cohort, a `Cohorts_Summary`
//! table and an `All_Cohort_Users` table. CSV exports write a directory
//! with one file per table; JSON exports write a single document. When the
//! full export cannot be written, the summary table alone is written as
//! `{name}.csv` next to the intended target.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use cohort_core::error::{CohortError, Result};
use cohort_core::formatting::format_datetime;
use cohort_core::models::{actions, Cohort, UserDetail};
use cohort_data::projection::UserProjector;
use cohort_data::store::EventStore;
use cohort_runtime::orchestrator::CohortMembers;

/// Longest table name accepted by spreadsheet tools.
pub const MAX_SHEET_NAME_LEN: usize = 31;
pub const SUMMARY_TABLE: &str = "Cohorts_Summary";
pub const ALL_USERS_TABLE: &str = "All_Cohort_Users";

const USER_COLUMNS: [&str; 16] = [
    "user_id",
    "total_events",
    "recent_events",
    "last_activity",
    "total_cart_value",
    "total_purchase_value",
    "cart_additions",
    "purchases",
    "page_views",
    "checkouts",
    "logins",
    "wishlist_additions",
    "unique_categories_viewed",
    "unique_brands_interacted",
    "unique_products_viewed",
    "conversion_rate",
];

const SUMMARY_COLUMNS: [&str; 6] = [
    "Cohort ID",
    "Cohort Name",
    "Description",
    "Total Users",
    "Created Date",
    "Conditions Count",
];

// ── Format ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = CohortError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(CohortError::Config(format!("unknown export format: {other}"))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csv => "csv",
            Self::Json => "json",
        })
    }
}

// ── Tables ────────────────────────────────────────────────────────────────────

/// One named table of an export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ExportTable {
    fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Render as RFC 4180 CSV with a header line.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_csv_line(&mut out, self.columns.iter().map(|c| c.as_str().into()));
        for row in &self.rows {
            push_csv_line(&mut out, row.iter().map(csv_cell));
        }
        out
    }
}

fn csv_cell(value: &Value) -> std::borrow::Cow<'_, str> {
    match value {
        Value::Null => "".into(),
        Value::String(s) => s.as_str().into(),
        other => other.to_string().into(),
    }
}

fn push_csv_line<'a>(out: &mut String, cells: impl Iterator<Item = std::borrow::Cow<'a, str>>) {
    let escaped: Vec<String> = cells
        .map(|cell| {
            if cell.contains([',', '"', '\n', '\r']) {
                format!("\"{}\"", cell.replace('"', "\"\""))
            } else {
                cell.into_owned()
            }
        })
        .collect();
    out.push_str(&escaped.join(","));
    out.push('\n');
}

/// Replace characters spreadsheet tools reject in table names with `_` and
/// cut the result to [`MAX_SHEET_NAME_LEN`] characters.
pub fn sanitize_sheet_name(name: &str) -> String {
    static FORBIDDEN: OnceLock<Regex> = OnceLock::new();
    let re = FORBIDDEN.get_or_init(|| Regex::new(r"[\\/*?:\[\]]").expect("regex is valid"));
    re.replace_all(name, "_")
        .chars()
        .take(MAX_SHEET_NAME_LEN)
        .collect()
}

/// Base name for an export: keyed on `target` when given.
pub fn default_export_name(target: Option<&Cohort>) -> String {
    match target {
        Some(cohort) => {
            let safe: String = cohort
                .name
                .replace([' ', '/'], "_")
                .chars()
                .take(20)
                .collect();
            format!("cohorts_export_{}_{}", cohort.id, safe)
        }
        None => "cohorts_export_all".to_string(),
    }
}

fn user_row(u: &UserDetail) -> Vec<Value> {
    vec![
        json!(u.user_id),
        json!(u.total_events),
        json!(u.recent_events),
        u.last_activity.map(|t| json!(format_datetime(t))).unwrap_or(Value::Null),
        json!(u.total_cart_value),
        json!(u.total_purchase_value),
        json!(u.count_for(actions::CART_ADDED)),
        json!(u.count_for(actions::PAYMENT_SUCCESSFUL)),
        json!(u.count_for(actions::PDP_VIEW)),
        json!(u.count_for(actions::CHECKOUT_CLICKED)),
        json!(u.count_for(actions::USER_LOGIN)),
        json!(u.count_for(actions::WISHLIST_ADDED)),
        json!(u.unique_categories),
        json!(u.unique_brands),
        json!(u.unique_skus),
        json!(u.conversion_rate),
    ]
}

/// Build every table of an export from evaluated cohort members.
///
/// Cohort tables keep the order of `members`. Two cohorts whose sanitized
/// names collide share one table; the later cohort's rows win.
pub fn build_tables<S: EventStore + ?Sized>(
    members: &[CohortMembers],
    store: &S,
    now: DateTime<Utc>,
) -> Vec<ExportTable> {
    let mut tables: Vec<ExportTable> = Vec::new();
    let mut summary = ExportTable::new(SUMMARY_TABLE, &SUMMARY_COLUMNS);
    let mut all_users: BTreeSet<&str> = BTreeSet::new();

    for m in members {
        let name = sanitize_sheet_name(&format!("Cohort_{}_{}", m.cohort.id, m.cohort.name));
        let mut table = ExportTable::new(name, &USER_COLUMNS);
        table.rows = UserProjector::project_all(store, &m.users, now)
            .iter()
            .map(user_row)
            .collect();

        match tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => tables.push(table),
        }

        summary.rows.push(vec![
            json!(m.cohort.id),
            json!(m.cohort.name),
            json!(m.cohort.description),
            json!(m.users.len()),
            json!(m.cohort.created_date),
            json!(m.cohort.conditions.len()),
        ]);
        all_users.extend(m.users.iter().map(String::as_str));
    }

    let mut users_table = ExportTable::new(ALL_USERS_TABLE, &["user_id"]);
    users_table.rows = all_users.into_iter().map(|u| vec![json!(u)]).collect();

    tables.push(summary);
    tables.push(users_table);
    tables
}

// ── Exporter ──────────────────────────────────────────────────────────────────

/// Writes exports under an output directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    format: ExportFormat,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>, format: ExportFormat) -> Self {
        Self {
            output_dir: output_dir.into(),
            format,
        }
    }

    /// Path the full export is written to for base name `name`.
    pub fn target_path(&self, name: &str) -> PathBuf {
        match self.format {
            ExportFormat::Csv => self.output_dir.join(name),
            ExportFormat::Json => self.output_dir.join(format!("{name}.json")),
        }
    }

    /// Write `tables` under base name `name`, returning the path written.
    ///
    /// Falls back to the summary table as a single CSV when the full export
    /// fails; only a failing fallback is an error.
    pub fn export(&self, name: &str, tables: &[ExportTable]) -> Result<PathBuf> {
        let target = self.target_path(name);
        let written = match self.format {
            ExportFormat::Csv => write_csv_dir(&target, tables),
            ExportFormat::Json => write_json(&target, tables),
        };

        match written {
            Ok(()) => {
                info!(tables = tables.len(), "exported cohort data to {}", target.display());
                Ok(target)
            }
            Err(e) => {
                warn!(error = %e, "export to {} failed; writing summary CSV", target.display());
                let fallback = self.output_dir.join(format!("{name}.csv"));
                let summary = tables
                    .iter()
                    .find(|t| t.name == SUMMARY_TABLE)
                    .ok_or_else(|| CohortError::Export(format!("{e}; no summary table")))?;
                write_file(&fallback, &summary.to_csv())
                    .map_err(|e2| CohortError::Export(format!("{e}; fallback failed: {e2}")))?;
                info!("exported cohort summary to {}", fallback.display());
                Ok(fallback)
            }
        }
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|source| CohortError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Write one CSV per table into `dir`. On failure the files written so far
/// are removed, along with `dir` itself if this call created it.
fn write_csv_dir(dir: &Path, tables: &[ExportTable]) -> Result<()> {
    let created = !dir.exists();
    std::fs::create_dir_all(dir).map_err(|source| CohortError::FileWrite {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for table in tables {
        let path = dir.join(format!("{}.csv", table.name));
        if let Err(e) = write_file(&path, &table.to_csv()) {
            for path in &written {
                let _ = std::fs::remove_file(path);
            }
            if created {
                let _ = std::fs::remove_dir(dir);
            }
            return Err(e);
        }
        written.push(path);
    }
    Ok(())
}

fn write_json(path: &Path, tables: &[ExportTable]) -> Result<()> {
    let doc = json!({ "tables": tables });
    write_file(path, &serde_json::to_string_pretty(&doc)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
