mod bootstrap;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cohort_core::models::Event;
use cohort_core::settings::Settings;
use cohort_data::generator::generate_events;
use cohort_data::projection::UserProjector;
use cohort_data::reader::{load_cohort_drafts, load_events};
use cohort_data::store::MemoryEventStore;
use cohort_report::export::{build_tables, default_export_name, ExportFormat, Exporter};
use cohort_report::{render_cohort_summary, render_data_insights, render_user_table, DataInsights};
use cohort_runtime::orchestrator::{CohortFailure, SummaryOrchestrator};
use cohort_runtime::registry::CohortRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("Cohort Analyzer v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("View: {}, Workers: {}", settings.view, settings.worker_count());

    let now = settings.evaluation_time(Utc::now())?;
    let store = Arc::new(MemoryEventStore::new(load_or_generate(&settings, now)?));
    let registry = build_registry(&settings, now)?;

    let orchestrator = SummaryOrchestrator::new(store.clone())
        .with_workers(settings.worker_count())
        .with_deadline(settings.deadline_ms.map(Duration::from_millis));

    match settings.view.as_str() {
        "insights" => {
            println!("{}", render_data_insights(&DataInsights::from_store(&store)));
        }

        "summary" => {
            println!("{}", render_data_insights(&DataInsights::from_store(&store)));
            let (summaries, failures) = orchestrator.summarize(&registry, now).await;
            println!("{}", render_cohort_summary(&summaries));
            report_failures(&failures);
        }

        "users" => {
            let id = match settings.cohort_id {
                Some(id) => id,
                None => {
                    let (summaries, failures) = orchestrator.summarize(&registry, now).await;
                    report_failures(&failures);
                    // Largest cohort, lowest id on ties.
                    summaries
                        .iter()
                        .max_by(|a, b| a.user_count.cmp(&b.user_count).then(b.id.cmp(&a.id)))
                        .map(|s| s.id)
                        .context("no active cohorts to list")?
                }
            };
            let cohort = registry
                .get(id)
                .with_context(|| format!("cohort {id} not found"))?;
            let users = registry.get_users(id, store.as_ref(), now);
            let details = UserProjector::project_all(store.as_ref(), &users, now);
            println!(
                "{}",
                render_user_table(&format!("Cohort #{}: {}", cohort.id, cohort.name), &details)
            );
        }

        "export" => {
            let format: ExportFormat = settings.format.parse()?;
            let outcome = orchestrator.evaluate_registry(&registry, now).await;
            report_failures(&outcome.failures);

            let tables = build_tables(&outcome.members, store.as_ref(), now);
            let target = settings.cohort_id.and_then(|id| registry.get(id));
            let name = default_export_name(target);
            let output_dir = settings.output.clone().unwrap_or_else(|| PathBuf::from("."));

            let path = Exporter::new(output_dir, format).export(&name, &tables)?;
            println!("Exported cohort data to: {}", path.display());
        }

        unknown => {
            eprintln!("Unknown view: {}", unknown);
        }
    }

    Ok(())
}

/// Events from `--events`, or a seeded synthetic set.
fn load_or_generate(settings: &Settings, now: DateTime<Utc>) -> Result<Vec<Event>> {
    match &settings.events {
        Some(path) => load_events(path).with_context(|| format!("loading {}", path.display())),
        None => {
            tracing::info!(users = settings.users, seed = settings.seed, "generating synthetic events");
            Ok(generate_events(settings.users, settings.seed, now))
        }
    }
}

/// Built-in cohorts plus any valid definitions from `--cohorts`.
fn build_registry(settings: &Settings, now: DateTime<Utc>) -> Result<CohortRegistry> {
    let mut registry = CohortRegistry::with_presets(now);
    if let Some(path) = &settings.cohorts {
        let drafts = load_cohort_drafts(path)
            .with_context(|| format!("loading cohort definitions from {}", path.display()))?;
        for draft in drafts {
            let name = draft.name.clone();
            if let Err(e) = registry.create_from_definition(draft) {
                tracing::warn!(cohort = %name, error = %e, "skipping cohort definition");
            }
        }
    }
    Ok(registry)
}

fn report_failures(failures: &[CohortFailure]) {
    for f in failures {
        eprintln!("Cohort #{} ({}) skipped: {}", f.cohort_id, f.name, f.error);
    }
}
