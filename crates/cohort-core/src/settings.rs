use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data_processors::TimestampProcessor;
use crate::error::{CohortError, Result};

/// Name of the per-user state directory under `$HOME`.
pub const APP_DIR_NAME: &str = ".cohort-analyzer";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Behavioral cohort analysis over user event logs
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cohort-analyzer",
    about = "Behavioral cohort analysis over user event logs",
    version
)]
pub struct Settings {
    /// What to produce
    #[arg(long, default_value = "summary", value_parser = ["summary", "insights", "users", "export"])]
    pub view: String,

    /// Number of synthetic users to generate when no event file is given
    #[arg(long, default_value = "5000", value_parser = clap::value_parser!(u32).range(1..=1_000_000))]
    pub users: u32,

    /// Seed for the synthetic event generator
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// JSONL event file, or a directory scanned for *.jsonl files
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// JSON file with additional cohort definitions
    #[arg(long)]
    pub cohorts: Option<PathBuf>,

    /// Cohort to list (users view) or to name the export after (export view)
    #[arg(long)]
    pub cohort_id: Option<u64>,

    /// Directory exports are written into (defaults to the current directory)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Export format
    #[arg(long, default_value = "csv", value_parser = ["csv", "json"])]
    pub format: String,

    /// Maximum number of cohorts evaluated concurrently (defaults to available cores)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=256))]
    pub workers: Option<u32>,

    /// Per-cohort evaluation deadline in milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Evaluation instant (RFC 3339); defaults to the current time
    #[arg(long)]
    pub now: Option<String>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging, including per-condition evaluation traces
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.cohort-analyzer/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<u32>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(APP_DIR_NAME).join("last_used.json")
    }

    /// Load persisted params from the default path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load persisted params from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to an explicit path, creating parent
    /// directories if needed.
    pub fn save_to(&self, path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation – accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            let _ = LastUsedParams::clear_at(config_path);
            return Self::apply_overrides(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins. Event and cohort sources are never restored.
        if !is_arg_explicitly_set(&matches, "view") {
            if let Some(v) = last.view {
                settings.view = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "users") {
            if let Some(v) = last.users {
                settings.users = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "seed") {
            if let Some(v) = last.seed {
                settings.seed = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "format") {
            if let Some(v) = last.format {
                settings.format = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "workers") && settings.workers.is_none() {
            settings.workers = last.workers;
        }

        settings = Self::apply_overrides(settings);

        let params = LastUsedParams::from(&settings);
        let _ = params.save_to(config_path);

        settings
    }

    /// The evaluation instant: `--now` when given, otherwise `fallback`.
    pub fn evaluation_time(&self, fallback: DateTime<Utc>) -> Result<DateTime<Utc>> {
        match self.now.as_deref() {
            None => Ok(fallback),
            Some(raw) => TimestampProcessor::parse_str(raw)
                .ok_or_else(|| CohortError::TimestampParse(raw.to_string())),
        }
    }

    /// Worker count for multi-cohort evaluation, defaulting to available cores.
    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(n) => n as usize,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    /// Apply the `--debug` flag.
    fn apply_overrides(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            view: Some(s.view.clone()),
            users: Some(s.users),
            seed: Some(s.seed),
            format: Some(s.format.clone()),
            workers: s.workers,
        }
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
