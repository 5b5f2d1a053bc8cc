//! Single-condition evaluation.
//!
//! [`ConditionEvaluator::raw_matches`] turns one [`Condition`] into the set of
//! users whose per-user aggregate passes the comparator, before any
//! include/exclude inversion is applied.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};
use cohort_core::models::{Condition, Event, EventProperty, Operation};

use crate::store::EventStore;

/// Property aggregated by `distinct_count` when the condition names none.
pub const DEFAULT_DISTINCT_PROPERTY: &str = "sku_id";

// ── Aggregation ───────────────────────────────────────────────────────────────

/// The aggregation actually applied once fallbacks are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregation {
    Count,
    /// Sum of price, missing prices count as zero.
    SumPrice,
    /// Mean of price over all selected events, missing prices count as zero.
    AvgPrice,
    /// Distinct non-missing values of a property.
    DistinctCount(EventProperty),
}

impl Aggregation {
    /// Resolve the aggregation for a condition.
    ///
    /// `sum` and `avg` are only defined over `price`; with any other property
    /// they, like unrecognized operations, fall back to counting events.
    pub fn for_condition(condition: &Condition) -> Self {
        match &condition.operation {
            Operation::Count => Self::Count,
            Operation::Sum if condition.property == "price" => Self::SumPrice,
            Operation::Avg if condition.property == "price" => Self::AvgPrice,
            Operation::DistinctCount => {
                let name = if condition.property.is_empty() {
                    DEFAULT_DISTINCT_PROPERTY
                } else {
                    condition.property.as_str()
                };
                Self::DistinctCount(EventProperty::parse(name))
            }
            Operation::Sum | Operation::Avg | Operation::Unrecognized(_) => {
                tracing::trace!(
                    operation = %condition.operation,
                    property = %condition.property,
                    "operation falls back to count"
                );
                Self::Count
            }
        }
    }
}

// ── ConditionEvaluator ────────────────────────────────────────────────────────

/// Stateless evaluator for individual conditions.
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Users meeting `condition`'s threshold within its lookback window
    /// ending at `now`, ignoring the include flag.
    ///
    /// Never fails: an empty selection or an unrecognized comparator yields
    /// the empty set.
    pub fn raw_matches<S: EventStore + ?Sized>(
        condition: &Condition,
        store: &S,
        now: DateTime<Utc>,
    ) -> BTreeSet<String> {
        // A window reaching past chrono's range covers all history.
        let cutoff = now
            .checked_sub_signed(Duration::days(i64::from(condition.timeframe_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let selected = store.events_where(&condition.action, cutoff);
        if selected.is_empty() {
            return BTreeSet::new();
        }
        if !condition.comparator.is_recognized() {
            tracing::trace!(comparator = %condition.comparator, "unrecognized comparator matches nobody");
            return BTreeSet::new();
        }

        Self::aggregate(&Aggregation::for_condition(condition), &selected)
            .into_iter()
            .filter(|(_, metric)| condition.comparator.matches(*metric, condition.value))
            .map(|(user, _)| user.to_string())
            .collect()
    }

    /// Per-user metric for `aggregation` over `events`.
    pub fn aggregate<'a>(aggregation: &Aggregation, events: &[&'a Event]) -> BTreeMap<&'a str, f64> {
        match aggregation {
            Aggregation::Count => {
                let mut counts: BTreeMap<&str, f64> = BTreeMap::new();
                for e in events {
                    *counts.entry(e.user_id.as_str()).or_default() += 1.0;
                }
                counts
            }
            Aggregation::SumPrice => {
                let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
                for e in events {
                    *sums.entry(e.user_id.as_str()).or_default() += e.price_or_zero();
                }
                sums
            }
            Aggregation::AvgPrice => {
                let mut acc: BTreeMap<&str, (f64, u64)> = BTreeMap::new();
                for e in events {
                    let slot = acc.entry(e.user_id.as_str()).or_default();
                    slot.0 += e.price_or_zero();
                    slot.1 += 1;
                }
                acc.into_iter()
                    .map(|(user, (sum, n))| (user, sum / n as f64))
                    .collect()
            }
            Aggregation::DistinctCount(property) => {
                let mut seen: BTreeMap<&str, HashSet<String>> = BTreeMap::new();
                for e in events {
                    let values = seen.entry(e.user_id.as_str()).or_default();
                    if let Some(v) = e.property_value(property) {
                        values.insert(v);
                    }
                }
                seen.into_iter()
                    .map(|(user, values)| (user, values.len() as f64))
                    .collect()
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
