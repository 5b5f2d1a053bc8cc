//! Read-only event storage queried by the evaluation engine.
//!
//! [`EventStore`] is the seam between cohort evaluation and wherever events
//! come from. [`MemoryEventStore`] keeps a time-ordered table with per-action
//! and per-user indices so that windowed lookups are a binary search.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use cohort_core::models::Event;

// ── EventStore ────────────────────────────────────────────────────────────────

/// Read-only, time-ordered collection of user events.
pub trait EventStore: Send + Sync {
    /// Every event, oldest first.
    fn events(&self) -> &[Event];

    /// Events with the given action whose timestamp is at or after `since`,
    /// oldest first.
    fn events_where(&self, action: &str, since: DateTime<Utc>) -> Vec<&Event> {
        self.events()
            .iter()
            .filter(|e| e.action == action && e.timestamp >= since)
            .collect()
    }

    /// All distinct user ids present in the store.
    fn universe(&self) -> BTreeSet<String> {
        self.events().iter().map(|e| e.user_id.clone()).collect()
    }

    /// Every event of one user, oldest first.
    fn events_for_user(&self, user_id: &str) -> Vec<&Event> {
        self.events()
            .iter()
            .filter(|e| e.user_id == user_id)
            .collect()
    }

    fn len(&self) -> usize {
        self.events().len()
    }

    fn is_empty(&self) -> bool {
        self.events().is_empty()
    }
}

// ── MemoryEventStore ──────────────────────────────────────────────────────────

/// In-memory [`EventStore`] built once from a batch of events.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    events: Vec<Event>,
    /// Indices into `events` per action, in timestamp order.
    by_action: HashMap<String, Vec<usize>>,
    /// Indices into `events` per user, in timestamp order.
    by_user: HashMap<String, Vec<usize>>,
}

impl MemoryEventStore {
    /// Build a store. Events are sorted by timestamp; ties keep input order.
    pub fn new(mut events: Vec<Event>) -> Self {
        events.sort_by_key(|e| e.timestamp);

        let mut by_action: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_user: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, event) in events.iter().enumerate() {
            by_action.entry(event.action.clone()).or_default().push(idx);
            by_user.entry(event.user_id.clone()).or_default().push(idx);
        }

        tracing::debug!(
            events = events.len(),
            users = by_user.len(),
            actions = by_action.len(),
            "event store built"
        );

        Self {
            events,
            by_action,
            by_user,
        }
    }

    /// Earliest and latest event timestamps, `None` when empty.
    pub fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.events.first()?.timestamp, self.events.last()?.timestamp))
    }

    /// Number of events per action, sorted by descending count then name.
    pub fn action_distribution(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = self
            .by_action
            .iter()
            .map(|(action, idx)| (action.clone(), idx.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }

    fn resolve<'a>(&'a self, indices: &[usize]) -> Vec<&'a Event> {
        indices.iter().map(|&i| &self.events[i]).collect()
    }
}

impl EventStore for MemoryEventStore {
    fn events(&self) -> &[Event] {
        &self.events
    }

    fn events_where(&self, action: &str, since: DateTime<Utc>) -> Vec<&Event> {
        let Some(indices) = self.by_action.get(action) else {
            return Vec::new();
        };
        let start = indices.partition_point(|&i| self.events[i].timestamp < since);
        self.resolve(&indices[start..])
    }

    fn universe(&self) -> BTreeSet<String> {
        self.by_user.keys().cloned().collect()
    }

    fn events_for_user(&self, user_id: &str) -> Vec<&Event> {
        self.by_user
            .get(user_id)
            .map(|indices| self.resolve(indices))
            .unwrap_or_default()
    }
}

impl FromIterator<Event> for MemoryEventStore {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
