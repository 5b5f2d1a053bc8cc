//! Cohort evaluation: folds a cohort's conditions into one user set.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use cohort_core::models::{Cohort, Condition, Logic, Operation};

use crate::evaluator::ConditionEvaluator;
use crate::store::EventStore;

/// Per-condition diagnostics captured by [`CohortEngine::evaluate_traced`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionTrace {
    /// Zero-based position in the cohort's condition list.
    pub index: usize,
    pub action: String,
    pub operation: Operation,
    pub include: bool,
    /// Users matching before the include flag is applied.
    pub raw_count: usize,
    /// Users contributed after the include flag is applied.
    pub effective_count: usize,
    /// Size of the running result after this condition was folded in.
    pub running_count: usize,
}

/// Stateless cohort evaluator.
pub struct CohortEngine;

impl CohortEngine {
    /// Users belonging to `cohort` as of `now`, sorted ascending.
    pub fn evaluate<S: EventStore + ?Sized>(
        cohort: &Cohort,
        store: &S,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        Self::evaluate_traced(cohort, store, now).0
    }

    /// Like [`CohortEngine::evaluate`], also returning a trace per condition.
    ///
    /// The first condition seeds the running result and its `logic` is
    /// ignored. Every later condition is joined using its *own* `logic`:
    /// `OR` unions, anything else intersects.
    pub fn evaluate_traced<S: EventStore + ?Sized>(
        cohort: &Cohort,
        store: &S,
        now: DateTime<Utc>,
    ) -> (Vec<String>, Vec<ConditionTrace>) {
        if cohort.conditions.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let universe = store.universe();
        tracing::debug!(
            cohort = %cohort.name,
            universe = universe.len(),
            "evaluating cohort"
        );

        let mut traces = Vec::with_capacity(cohort.conditions.len());
        let mut running: Option<BTreeSet<String>> = None;

        for (index, condition) in cohort.conditions.iter().enumerate() {
            let raw = ConditionEvaluator::raw_matches(condition, store, now);
            let raw_count = raw.len();
            let effective = Self::apply_include(condition, raw, &universe);
            let effective_count = effective.len();

            let next = match running.take() {
                None => effective,
                Some(acc) => Self::combine(acc, effective, condition.logic.as_ref()),
            };

            let trace = ConditionTrace {
                index,
                action: condition.action.clone(),
                operation: condition.operation.clone(),
                include: condition.include,
                raw_count,
                effective_count,
                running_count: next.len(),
            };
            tracing::debug!(
                cond = index + 1,
                action = %trace.action,
                op = %trace.operation,
                include = trace.include,
                met = trace.raw_count,
                cond_users = trace.effective_count,
                running = trace.running_count,
                "condition evaluated"
            );
            traces.push(trace);
            running = Some(next);
        }

        let users: Vec<String> = running.unwrap_or_default().into_iter().collect();
        tracing::debug!(cohort = %cohort.name, users = users.len(), "final matching users");
        (users, traces)
    }

    /// The condition's contribution: raw matches, or their complement within
    /// `universe` for an excluding condition.
    pub fn apply_include(
        condition: &Condition,
        raw: BTreeSet<String>,
        universe: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        if condition.include {
            raw
        } else {
            universe.difference(&raw).cloned().collect()
        }
    }

    /// Join `next` into `acc`. Only an explicit `OR` unions.
    pub fn combine(
        mut acc: BTreeSet<String>,
        next: BTreeSet<String>,
        logic: Option<&Logic>,
    ) -> BTreeSet<String> {
        match logic {
            Some(Logic::Or) => {
                acc.extend(next);
                acc
            }
            Some(Logic::And) | Some(Logic::Unrecognized(_)) | None => {
                acc.retain(|user| next.contains(user));
                acc
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEventStore;
    use chrono::{Duration, TimeZone};
    use cohort_core::models::Event;

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

    fn cohort(conditions: Vec<Condition>) -> Cohort {
        Cohort {
            id: 1,
            name: "test".to_string(),
            description: String::new(),
            conditions,
            active: true,
            created_date: "2024-06-15".to_string(),
            created_by: "User".to_string(),
        }
    }

    /// A: two carts (3500 total) in the last week; B: one cart (500);
    /// C: one login only, and a payment.
    fn store() -> MemoryEventStore {
        MemoryEventStore::new(vec![
            event("A", "cart_added", 1, Some(2000.0)),
            event("A", "cart_added", 2, Some(1500.0)),
            event("B", "cart_added", 1, Some(500.0)),
            event("C", "user_login", 3, None),
            event("C", "payment_successful", 3, Some(900.0)),
        ])
    }

    fn high_cart() -> Condition {
        Condition::new("cart_added", "sum", ">=", 3000.0, 7).with_property("price")
    }

    fn any_cart() -> Condition {
        Condition::new("cart_added", "count", ">=", 1.0, 7)
    }

    fn paid() -> Condition {
        Condition::new("payment_successful", "count", ">=", 1.0, 7)
    }

    // ── Empty input ──────────────────────────────────────────────────────────

    #[test]
    fn test_zero_conditions_is_empty() {
        let (users, traces) = CohortEngine::evaluate_traced(&cohort(vec![]), &store(), now());
        assert!(users.is_empty());
        assert!(traces.is_empty());
    }

    #[test]
    fn test_empty_store() {
        let empty = MemoryEventStore::default();
        let users = CohortEngine::evaluate(&cohort(vec![any_cart().excluding()]), &empty, now());
        assert!(users.is_empty());
    }

    // ── Include / exclude ────────────────────────────────────────────────────

    #[test]
    fn test_complement_law() {
        let s = store();
        let universe = s.universe();
        let raw = ConditionEvaluator::raw_matches(&any_cart(), &s, now());
        let excluded = CohortEngine::evaluate(&cohort(vec![any_cart().excluding()]), &s, now());
        let excluded: BTreeSet<String> = excluded.into_iter().collect();

        assert!(raw.is_disjoint(&excluded));
        let union: BTreeSet<String> = raw.union(&excluded).cloned().collect();
        assert_eq!(union, universe);
        assert_eq!(excluded.into_iter().collect::<Vec<_>>(), vec!["C"]);
    }

    #[test]
    fn test_abandoned_cart_scenario() {
        // No payments by A or B; C paid but has no high-value cart.
        let c = cohort(vec![
            high_cart().with_logic("AND"),
            paid().excluding().with_logic("AND"),
        ]);
        assert_eq!(CohortEngine::evaluate(&c, &store(), now()), vec!["A"]);
    }

    #[test]
    fn test_exclusion_with_no_matching_events() {
        let s = MemoryEventStore::new(vec![
            event("A", "cart_added", 1, Some(2000.0)),
            event("A", "cart_added", 2, Some(1500.0)),
            event("B", "cart_added", 1, Some(500.0)),
        ]);
        let (users, traces) = CohortEngine::evaluate_traced(
            &cohort(vec![high_cart(), paid().excluding().with_logic("AND")]),
            &s,
            now(),
        );
        assert_eq!(users, vec!["A"]);
        assert_eq!(traces[1].raw_count, 0);
        assert_eq!(traces[1].effective_count, 2);
    }

    // ── Fold ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_and_is_intersection() {
        let s = store();
        let users = CohortEngine::evaluate(
            &cohort(vec![any_cart(), high_cart().with_logic("AND")]),
            &s,
            now(),
        );
        assert_eq!(users, vec!["A"]);
    }

    #[test]
    fn test_or_is_union() {
        let s = store();
        let users = CohortEngine::evaluate(
            &cohort(vec![high_cart(), paid().with_logic("OR")]),
            &s,
            now(),
        );
        assert_eq!(users, vec!["A", "C"]);
    }

    #[test]
    fn test_missing_and_unknown_logic_intersect() {
        let s = store();
        for logic in [None, Some(Logic::from("XOR")), Some(Logic::from("and"))] {
            let mut second = high_cart();
            second.logic = logic.clone();
            let users = CohortEngine::evaluate(&cohort(vec![any_cart(), second]), &s, now());
            assert_eq!(users, vec!["A"], "logic {logic:?}");
        }
    }

    #[test]
    fn test_first_condition_logic_is_ignored() {
        let s = store();
        let users = CohortEngine::evaluate(
            &cohort(vec![high_cart().with_logic("OR"), any_cart()]),
            &s,
            now(),
        );
        assert_eq!(users, vec!["A"]);
    }

    #[test]
    fn test_logic_read_from_current_condition() {
        let s = store();
        // [paid, high_cart(AND), any_cart(OR)] → ({C} ∩ {A}) ∪ {A, B} = {A, B}.
        // Reading the operator from the previous condition instead would give
        // ({C} ∪ {A}) ∩ {A, B} = {A}.
        let users = CohortEngine::evaluate(
            &cohort(vec![
                paid().with_logic("OR"),
                high_cart().with_logic("AND"),
                any_cart().with_logic("OR"),
            ]),
            &s,
            now(),
        );
        assert_eq!(users, vec!["A", "B"]);
    }

    // ── Determinism / fallbacks ──────────────────────────────────────────────

    #[test]
    fn test_evaluation_is_idempotent_and_sorted() {
        let s = store();
        let c = cohort(vec![any_cart(), paid().with_logic("OR")]);
        let first = CohortEngine::evaluate(&c, &s, now());
        let second = CohortEngine::evaluate(&c, &s, now());
        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(first, sorted);
    }

    #[test]
    fn test_unknown_comparator_in_exclusion_keeps_universe() {
        let s = store();
        let broken = Condition::new("cart_added", "count", "≥", 1.0, 7).excluding();
        let users = CohortEngine::evaluate(&cohort(vec![broken]), &s, now());
        assert_eq!(users, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_trace_running_counts() {
        let (_, traces) = CohortEngine::evaluate_traced(
            &cohort(vec![any_cart(), paid().with_logic("OR")]),
            &store(),
            now(),
        );
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].running_count, 2);
        assert_eq!(traces[1].raw_count, 1);
        assert_eq!(traces[1].running_count, 3);
    }
}
