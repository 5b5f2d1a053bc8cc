//! In-memory cohort registry.
//!
//! Owns every cohort definition keyed by id. Ids come from a monotonic
//! counter and are never reused. Membership is never stored; it is
//! evaluated on demand against an [`EventStore`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use cohort_core::error::{CohortError, Result};
use cohort_core::formatting::format_date;
use cohort_core::models::{Cohort, CohortDraft, CohortId, CohortSummary, Condition, ConditionDraft};
use cohort_data::engine::CohortEngine;
use cohort_data::store::EventStore;

/// `created_by` value for built-in cohorts.
pub const CREATED_BY_SYSTEM: &str = "System";
/// `created_by` value for cohorts created at runtime.
pub const CREATED_BY_USER: &str = "User";

/// Mapping of cohort id to definition.
#[derive(Debug, Clone)]
pub struct CohortRegistry {
    cohorts: BTreeMap<CohortId, Cohort>,
    next_id: CohortId,
    /// Stamped into `created_date` of new cohorts.
    now: DateTime<Utc>,
}

impl CohortRegistry {
    /// Empty registry whose cohorts are dated `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            cohorts: BTreeMap::new(),
            next_id: 1,
            now,
        }
    }

    /// Registry holding the built-in sample cohorts.
    pub fn with_presets(now: DateTime<Utc>) -> Self {
        let mut registry = Self::new(now);
        for preset in crate::presets::preset_cohorts() {
            registry.insert(preset.name, preset.description, preset.conditions, CREATED_BY_SYSTEM);
        }
        registry
    }

    /// Validate and register a new cohort.
    pub fn create(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        conditions: Vec<Condition>,
    ) -> Result<Cohort> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CohortError::Validation("cohort name is empty".to_string()));
        }
        for (i, condition) in conditions.iter().enumerate() {
            condition.validate().map_err(|e| match e {
                CohortError::Validation(msg) => {
                    CohortError::Validation(format!("condition {}: {}", i + 1, msg))
                }
                other => other,
            })?;
        }

        let cohort = self.insert(name, description.into(), conditions, CREATED_BY_USER);
        tracing::info!(id = cohort.id, name = %cohort.name, "cohort created");
        Ok(cohort)
    }

    /// Like [`CohortRegistry::create`], converting loosely typed drafts first.
    pub fn create_from_drafts(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        drafts: Vec<ConditionDraft>,
    ) -> Result<Cohort> {
        let conditions = drafts
            .into_iter()
            .enumerate()
            .map(|(i, draft)| {
                Condition::try_from(draft).map_err(|e| match e {
                    CohortError::Validation(msg) => {
                        CohortError::Validation(format!("condition {}: {}", i + 1, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.create(name, description, conditions)
    }

    /// Register a definition loaded from a file.
    pub fn create_from_definition(&mut self, draft: CohortDraft) -> Result<Cohort> {
        self.create_from_drafts(draft.name, draft.description, draft.conditions)
    }

    pub fn get(&self, id: CohortId) -> Option<&Cohort> {
        self.cohorts.get(&id)
    }

    /// Every cohort in id order.
    pub fn cohorts(&self) -> impl Iterator<Item = &Cohort> {
        self.cohorts.values()
    }

    /// Active cohorts in id order.
    pub fn active_cohorts(&self) -> impl Iterator<Item = &Cohort> {
        self.cohorts.values().filter(|c| c.active)
    }

    pub fn len(&self) -> usize {
        self.cohorts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }

    /// Toggle a cohort's active flag. Returns `false` for unknown ids.
    pub fn set_active(&mut self, id: CohortId, active: bool) -> bool {
        match self.cohorts.get_mut(&id) {
            Some(cohort) => {
                cohort.active = active;
                true
            }
            None => false,
        }
    }

    /// Members of cohort `id`; empty when the id is unknown or inactive.
    pub fn get_users<S: EventStore + ?Sized>(
        &self,
        id: CohortId,
        store: &S,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        match self.cohorts.get(&id) {
            Some(cohort) if cohort.active => CohortEngine::evaluate(cohort, store, now),
            Some(_) => {
                tracing::debug!(id, "cohort inactive");
                Vec::new()
            }
            None => {
                tracing::debug!(id, "cohort not found");
                Vec::new()
            }
        }
    }

    /// One summary per active cohort, evaluated sequentially in id order.
    pub fn list_active_summaries<S: EventStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
    ) -> Vec<CohortSummary> {
        self.active_cohorts()
            .map(|cohort| {
                let users = CohortEngine::evaluate(cohort, store, now);
                CohortSummary::from_cohort(cohort, users.len())
            })
            .collect()
    }

    fn insert(
        &mut self,
        name: String,
        description: String,
        conditions: Vec<Condition>,
        created_by: &str,
    ) -> Cohort {
        let id = self.next_id;
        self.next_id += 1;
        let cohort = Cohort {
            id,
            name,
            description,
            conditions,
            active: true,
            created_date: format_date(self.now),
            created_by: created_by.to_string(),
        };
        self.cohorts.insert(id, cohort.clone());
        cohort
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use cohort_core::models::Event;
    use cohort_data::store::MemoryEventStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn event(user: &str, action: &str, days_ago: i64, price: Option<f64>) -> Event {
        Event {
            user_id: user.to_string(),
            action: action.to_string(),
            timestamp: now() - Duration::days(days_ago),
            price,
            category: String::new(),
            sku_id: String::new(),
            brand: String::new(),
        }
    }

    fn store() -> MemoryEventStore {
        MemoryEventStore::new(vec![
            event("A", "cart_added", 1, Some(2000.0)),
            event("A", "cart_added", 2, Some(1500.0)),
            event("B", "cart_added", 1, Some(500.0)),
            event("C", "payment_successful", 3, Some(900.0)),
        ])
    }

    fn carted() -> Vec<Condition> {
        vec![Condition::new("cart_added", "count", ">=", 1.0, 7)]
    }

    // ── create ────────────────────────────────────────────────────────────────

    #[test]
    fn test_create_assigns_sequential_ids() {
        let mut reg = CohortRegistry::new(now());
        let a = reg.create("First", "", carted()).unwrap();
        let b = reg.create("Second", "", carted()).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert!(a.active);
        assert_eq!(a.created_by, CREATED_BY_USER);
        assert_eq!(a.created_date, "2024-06-15");
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_create_rejects_invalid() {
        let mut reg = CohortRegistry::new(now());
        assert!(matches!(
            reg.create("  ", "", carted()),
            Err(CohortError::Validation(_))
        ));

        let zero_days = vec![Condition::new("cart_added", "count", ">=", 1.0, 0)];
        let err = reg.create("Bad", "", zero_days).unwrap_err();
        assert!(err.to_string().contains("condition 1"));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_create_rejects_oversized_timeframe() {
        let mut reg = CohortRegistry::new(now());
        let wide = vec![Condition::new("cart_added", "count", ">=", 1.0, 200_000_000)];
        assert!(matches!(
            reg.create("Wide", "", wide),
            Err(CohortError::Validation(_))
        ));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_failed_create_does_not_consume_id() {
        let mut reg = CohortRegistry::new(now());
        let _ = reg.create("", "", carted());
        assert_eq!(reg.create("Ok", "", carted()).unwrap().id, 1);
    }

    #[test]
    fn test_create_from_drafts_missing_field() {
        let mut reg = CohortRegistry::new(now());
        let draft = ConditionDraft {
            action: Some("cart_added".to_string()),
            operation: Some("count".to_string()),
            comparator: Some(">=".to_string()),
            ..Default::default()
        };
        let err = reg.create_from_drafts("Draft", "", vec![draft]).unwrap_err();
        assert!(matches!(err, CohortError::Validation(ref m) if m.contains("`value`")));
    }

    #[test]
    fn test_create_from_definition() {
        let mut reg = CohortRegistry::new(now());
        let def: CohortDraft = serde_json::from_str(
            r#"{"name":"Carted","conditions":[
                {"action":"cart_added","operation":"count","condition":">=","value":1}
            ]}"#,
        )
        .unwrap();
        let cohort = reg.create_from_definition(def).unwrap();
        assert_eq!(cohort.conditions[0].timeframe_days, 30);
        assert!(cohort.conditions[0].include);
    }

    // ── lookup ────────────────────────────────────────────────────────────────

    #[test]
    fn test_get_users_unknown_and_inactive() {
        let mut reg = CohortRegistry::new(now());
        let id = reg.create("Carted", "", carted()).unwrap().id;
        let s = store();

        assert_eq!(reg.get_users(id, &s, now()), vec!["A", "B"]);
        assert!(reg.get_users(99, &s, now()).is_empty());

        assert!(reg.set_active(id, false));
        assert!(reg.get_users(id, &s, now()).is_empty());
        assert!(!reg.set_active(99, false));
    }

    #[test]
    fn test_list_active_summaries_skips_inactive() {
        let mut reg = CohortRegistry::new(now());
        reg.create("Carted", "any cart", carted()).unwrap();
        let hidden = reg
            .create("Paid", "", vec![Condition::new("payment_successful", "count", ">=", 1.0, 7)])
            .unwrap();
        reg.set_active(hidden.id, false);

        let summaries = reg.list_active_summaries(&store(), now());
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "Carted");
        assert_eq!(summaries[0].user_count, 2);
        assert_eq!(summaries[0].conditions_count, 1);
    }

    // ── presets ───────────────────────────────────────────────────────────────

    #[test]
    fn test_with_presets() {
        let mut reg = CohortRegistry::with_presets(now());
        assert_eq!(reg.len(), 6);
        assert!(reg.cohorts().all(|c| c.created_by == CREATED_BY_SYSTEM));
        let names: Vec<&str> = reg.cohorts().map(|c| c.name.as_str()).collect();
        assert_eq!(names[0], "High Value Abandoned Cart");
        assert_eq!(names[5], "Silver");

        // High-value abandoned cart: A carted 3500 and never paid.
        assert_eq!(reg.get_users(1, &store(), now()), vec!["A"]);

        let next = reg.create("Custom", "", carted()).unwrap();
        assert_eq!(next.id, 7);
    }
}
