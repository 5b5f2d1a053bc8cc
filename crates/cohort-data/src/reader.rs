//! JSONL event loading and saving, plus cohort definition files.
//!
//! An event source is either a single `.jsonl` file or a directory that is
//! scanned recursively. Each non-blank line holds one event object; lines
//! that fail to parse or lack a required field are skipped.

use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use cohort_core::data_processors::EventConverter;
use cohort_core::error::{CohortError, Result};
use cohort_core::models::{CohortDraft, Event};
use serde::Deserialize;
use tracing::{debug, info, warn};

// ── Public API ────────────────────────────────────────────────────────────────

/// Find the `.jsonl` files making up an event source, sorted by path.
///
/// A file path is returned as-is regardless of its extension.
pub fn find_jsonl_files(data_path: &Path) -> Vec<PathBuf> {
    if data_path.is_file() {
        return vec![data_path.to_path_buf()];
    }
    if !data_path.exists() {
        warn!("Event path does not exist: {}", data_path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext == "jsonl")
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Load every event under `data_path`, sorted by timestamp.
pub fn load_events(data_path: &Path) -> Result<Vec<Event>> {
    if !data_path.exists() {
        return Err(CohortError::EventsNotFound(data_path.to_path_buf()));
    }

    let files = find_jsonl_files(data_path);
    if files.is_empty() {
        warn!("No JSONL files found in {}", data_path.display());
        return Ok(Vec::new());
    }

    let mut events = Vec::new();
    for file in &files {
        events.extend(read_event_file(file)?);
    }
    events.sort_by_key(|e| e.timestamp);

    info!(
        events = events.len(),
        files = files.len(),
        "loaded events from {}",
        data_path.display()
    );
    Ok(events)
}

/// Write `events` to `path` as JSONL, creating parent directories.
pub fn save_events(path: &Path, events: &[Event]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| CohortError::FileWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let write_err = |source| CohortError::FileWrite {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    for event in events {
        let line = serde_json::to_string(event)?;
        writeln!(writer, "{line}").map_err(write_err)?;
    }
    writer.flush().map_err(write_err)?;

    debug!(events = events.len(), "saved events to {}", path.display());
    Ok(())
}

/// Load cohort definitions from a JSON file.
///
/// Accepts either a bare array of definitions or an object with a
/// `cohorts` array.
pub fn load_cohort_drafts(path: &Path) -> Result<Vec<CohortDraft>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DefinitionFile {
        List(Vec<CohortDraft>),
        Wrapped { cohorts: Vec<CohortDraft> },
    }

    let text = std::fs::read_to_string(path).map_err(|source| CohortError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let drafts = match serde_json::from_str::<DefinitionFile>(&text)? {
        DefinitionFile::List(list) => list,
        DefinitionFile::Wrapped { cohorts } => cohorts,
    };

    debug!(
        definitions = drafts.len(),
        "loaded cohort definitions from {}",
        path.display()
    );
    Ok(drafts)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn read_event_file(file_path: &Path) -> Result<Vec<Event>> {
    let file = std::fs::File::open(file_path).map_err(|source| CohortError::FileRead {
        path: file_path.to_path_buf(),
        source,
    })?;

    let reader = std::io::BufReader::new(file);
    let mut events = Vec::new();
    let mut skipped = 0u64;

    for (line_no, line_result) in reader.lines().enumerate() {
        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                debug!("Unreadable line {} in {}: {}", line_no + 1, file_path.display(), e);
                skipped += 1;
                continue;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let value: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                debug!(
                    "Failed to parse JSON line {} in {}: {}",
                    line_no + 1,
                    file_path.display(),
                    e
                );
                skipped += 1;
                continue;
            }
        };

        match EventConverter::from_value(&value) {
            Some(event) => events.push(event),
            None => {
                debug!("Line {} in {} is not an event", line_no + 1, file_path.display());
                skipped += 1;
            }
        }
    }

    debug!(
        "File {}: {} events, {} skipped",
        file_path.display(),
        events.len(),
        skipped
    );
    Ok(events)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
