//! Parallel multi-cohort evaluation.
//!
//! Each cohort is evaluated in its own `spawn_blocking` task against a shared
//! [`EventStore`] snapshot and a single `now`. A [`Semaphore`] bounds the
//! number of evaluations in flight. Results are gathered from a [`JoinSet`]
//! and re-sorted by cohort id, so output order never depends on scheduling.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cohort_core::error::CohortError;
use cohort_core::models::{Cohort, CohortId, CohortSummary};
use cohort_data::engine::CohortEngine;
use cohort_data::store::EventStore;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::registry::CohortRegistry;

// ── Public types ──────────────────────────────────────────────────────────────

/// Evaluated membership of one cohort.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortMembers {
    pub cohort: Cohort,
    /// Sorted ascending.
    pub users: Vec<String>,
}

/// A cohort whose evaluation did not complete.
#[derive(Debug)]
pub struct CohortFailure {
    pub cohort_id: CohortId,
    pub name: String,
    pub error: CohortError,
}

/// Members of every cohort that finished, plus the ones that did not.
#[derive(Debug, Default)]
pub struct EvaluationOutcome {
    pub members: Vec<CohortMembers>,
    pub failures: Vec<CohortFailure>,
}

impl EvaluationOutcome {
    /// Summary rows for the cohorts that finished, in id order.
    pub fn summaries(&self) -> Vec<CohortSummary> {
        self.members
            .iter()
            .map(|m| CohortSummary::from_cohort(&m.cohort, m.users.len()))
            .collect()
    }
}

// ── SummaryOrchestrator ───────────────────────────────────────────────────────

/// Fans cohort evaluations out over a bounded pool of blocking workers.
pub struct SummaryOrchestrator {
    store: Arc<dyn EventStore>,
    workers: usize,
    deadline: Option<Duration>,
}

impl SummaryOrchestrator {
    /// Create an orchestrator sized to the available parallelism, no deadline.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            store,
            workers,
            deadline: None,
        }
    }

    /// Cap concurrent evaluations. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Per-cohort deadline, measured from when the cohort gets a worker.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Evaluate every active cohort of `registry`.
    pub async fn evaluate_registry(
        &self,
        registry: &CohortRegistry,
        now: DateTime<Utc>,
    ) -> EvaluationOutcome {
        self.evaluate(registry.active_cohorts().cloned().collect(), now)
            .await
    }

    /// Summary rows for every active cohort of `registry`.
    pub async fn summarize(
        &self,
        registry: &CohortRegistry,
        now: DateTime<Utc>,
    ) -> (Vec<CohortSummary>, Vec<CohortFailure>) {
        let outcome = self.evaluate_registry(registry, now).await;
        (outcome.summaries(), outcome.failures)
    }

    /// Evaluate `cohorts` concurrently. Failures never abort the others.
    pub async fn evaluate(&self, cohorts: Vec<Cohort>, now: DateTime<Utc>) -> EvaluationOutcome {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();

        tracing::debug!(
            cohorts = cohorts.len(),
            workers = self.workers,
            deadline_ms = self.deadline.map(|d| d.as_millis() as u64),
            "starting cohort evaluation"
        );

        // Cohorts not yet reported by their task.
        let mut pending: BTreeMap<CohortId, String> =
            cohorts.iter().map(|c| (c.id, c.name.clone())).collect();

        for cohort in cohorts {
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let deadline = self.deadline;
            set.spawn(async move {
                let result = run_one(&cohort, store, semaphore, deadline, now).await;
                (cohort, result)
            });
        }

        let mut outcome = EvaluationOutcome::default();
        while let Some(joined) = set.join_next().await {
            if let Ok((cohort, _)) = &joined {
                pending.remove(&cohort.id);
            }
            match joined {
                Ok((cohort, Ok(users))) => outcome.members.push(CohortMembers { cohort, users }),
                Ok((cohort, Err(error))) => {
                    tracing::warn!(id = cohort.id, name = %cohort.name, %error, "cohort evaluation failed");
                    outcome.failures.push(CohortFailure {
                        cohort_id: cohort.id,
                        name: cohort.name,
                        error,
                    });
                }
                Err(e) => tracing::error!(error = %e, "cohort evaluation task aborted"),
            }
        }
        record_dropped(&mut outcome, pending);

        outcome.members.sort_by_key(|m| m.cohort.id);
        outcome.failures.sort_by_key(|f| f.cohort_id);
        outcome
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

async fn run_one(
    cohort: &Cohort,
    store: Arc<dyn EventStore>,
    semaphore: Arc<Semaphore>,
    deadline: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<Vec<String>, CohortError> {
    let permit = semaphore
        .acquire_owned()
        .await
        .map_err(|e| CohortError::Other(anyhow::anyhow!("worker pool closed: {e}")))?;

    let task_cohort = cohort.clone();
    let work = tokio::task::spawn_blocking(move || {
        // Held until the evaluation itself returns, even past a deadline.
        let _permit = permit;
        CohortEngine::evaluate(&task_cohort, store.as_ref(), now)
    });

    match deadline {
        Some(limit) => match tokio::time::timeout(limit, work).await {
            Ok(joined) => joined.map_err(join_failure),
            Err(_) => Err(CohortError::EvaluationTimeout {
                cohort_id: cohort.id,
            }),
        },
        None => work.await.map_err(join_failure),
    }
}

/// Report cohorts whose task ended without returning a result.
fn record_dropped(outcome: &mut EvaluationOutcome, pending: BTreeMap<CohortId, String>) {
    for (cohort_id, name) in pending {
        tracing::warn!(id = cohort_id, name = %name, "cohort dropped by aborted task");
        outcome.failures.push(CohortFailure {
            cohort_id,
            name,
            error: CohortError::Other(anyhow::anyhow!("evaluation task aborted")),
        });
    }
}

fn join_failure(e: JoinError) -> CohortError {
    CohortError::Other(anyhow::anyhow!("evaluation task failed: {e}"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cohort_core::models::{Condition, Event};
    use cohort_data::generator::generate_events;
    use cohort_data::store::MemoryEventStore;
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn generated_store() -> Arc<dyn EventStore> {
        Arc::new(MemoryEventStore::new(generate_events(300, 11, now())))
    }

    /// Store whose universe lookup stalls, to exercise deadlines.
    struct SlowStore {
        inner: MemoryEventStore,
        delay: std::time::Duration,
    }

    impl EventStore for SlowStore {
        fn events(&self) -> &[Event] {
            self.inner.events()
        }

        fn universe(&self) -> BTreeSet<String> {
            std::thread::sleep(self.delay);
            self.inner.universe()
        }
    }

    /// Store that panics on any lookup.
    struct PanickingStore;

    impl EventStore for PanickingStore {
        fn events(&self) -> &[Event] {
            panic!("store unavailable")
        }

        fn universe(&self) -> BTreeSet<String> {
            panic!("store unavailable")
        }
    }

    // ── construction ──────────────────────────────────────────────────────

    #[test]
    fn test_orchestrator_builders() {
        let orch = SummaryOrchestrator::new(Arc::new(MemoryEventStore::default()))
            .with_workers(0)
            .with_deadline(Some(Duration::from_millis(10)));
        assert_eq!(orch.workers(), 1);
        assert_eq!(orch.deadline, Some(Duration::from_millis(10)));
    }

    // ── evaluation ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let store = generated_store();
        let registry = CohortRegistry::with_presets(now());
        let sequential = registry.list_active_summaries(store.as_ref(), now());

        let orch = SummaryOrchestrator::new(Arc::clone(&store)).with_workers(3);
        let (parallel, failures) = orch.summarize(&registry, now()).await;

        assert!(failures.is_empty());
        assert_eq!(parallel, sequential);
    }

    #[tokio::test]
    async fn test_results_sorted_by_id_and_skip_inactive() {
        let store = generated_store();
        let mut registry = CohortRegistry::with_presets(now());
        registry.set_active(2, false);

        let outcome = SummaryOrchestrator::new(store)
            .with_workers(1)
            .evaluate_registry(&registry, now())
            .await;
        let ids: Vec<CohortId> = outcome.members.iter().map(|m| m.cohort.id).collect();
        assert_eq!(ids, vec![1, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_members_match_registry_lookup() {
        let store = generated_store();
        let registry = CohortRegistry::with_presets(now());
        let outcome = SummaryOrchestrator::new(Arc::clone(&store))
            .evaluate_registry(&registry, now())
            .await;
        for m in &outcome.members {
            assert_eq!(m.users, registry.get_users(m.cohort.id, store.as_ref(), now()));
        }
    }

    #[tokio::test]
    async fn test_empty_cohort_list() {
        let outcome = SummaryOrchestrator::new(generated_store())
            .evaluate(Vec::new(), now())
            .await;
        assert!(outcome.members.is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_store_is_reported_per_cohort() {
        let mut registry = CohortRegistry::new(now());
        for name in ["First", "Second"] {
            registry
                .create(name, "", vec![Condition::new("cart_added", "count", ">=", 1.0, 7)])
                .unwrap();
        }

        let outcome = SummaryOrchestrator::new(Arc::new(PanickingStore))
            .evaluate_registry(&registry, now())
            .await;

        assert!(outcome.members.is_empty());
        let ids: Vec<CohortId> = outcome.failures.iter().map(|f| f.cohort_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_record_dropped_reports_unfinished_cohorts() {
        let mut outcome = EvaluationOutcome::default();
        let pending = BTreeMap::from([(3, "Lost".to_string())]);
        record_dropped(&mut outcome, pending);

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].cohort_id, 3);
        assert_eq!(outcome.failures[0].name, "Lost");
        assert!(outcome.failures[0].error.to_string().contains("aborted"));
    }

    #[tokio::test]
    async fn test_deadline_reports_timeout() {
        let store = Arc::new(SlowStore {
            inner: MemoryEventStore::default(),
            delay: std::time::Duration::from_millis(300),
        });
        let mut registry = CohortRegistry::new(now());
        registry
            .create("Slow", "", vec![Condition::new("cart_added", "count", ">=", 1.0, 7)])
            .unwrap();

        let outcome = SummaryOrchestrator::new(store)
            .with_deadline(Some(Duration::from_millis(20)))
            .evaluate_registry(&registry, now())
            .await;

        assert!(outcome.members.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            outcome.failures[0].error,
            CohortError::EvaluationTimeout { cohort_id: 1 }
        ));
    }
}
