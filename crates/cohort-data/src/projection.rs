//! Per-user activity projection consumed by listings and exports.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use cohort_core::formatting::percentage;
use cohort_core::models::{actions, Event, UserDetail};

use crate::store::EventStore;

/// Window counted as "recent" activity.
pub const RECENT_WINDOW_DAYS: i64 = 30;

/// Builds [`UserDetail`] rows from an event store.
pub struct UserProjector;

impl UserProjector {
    /// Project one user. Unknown users produce an all-zero row.
    pub fn project<S: EventStore + ?Sized>(
        store: &S,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> UserDetail {
        let events = store.events_for_user(user_id);
        Self::from_events(user_id, &events, now)
    }

    /// Project each of `user_ids`, preserving order.
    pub fn project_all<S: EventStore + ?Sized>(
        store: &S,
        user_ids: &[String],
        now: DateTime<Utc>,
    ) -> Vec<UserDetail> {
        user_ids
            .iter()
            .map(|id| Self::project(store, id, now))
            .collect()
    }

    fn from_events(user_id: &str, events: &[&Event], now: DateTime<Utc>) -> UserDetail {
        let recent_cutoff = now - Duration::days(RECENT_WINDOW_DAYS);
        let mut detail = UserDetail {
            user_id: user_id.to_string(),
            ..Default::default()
        };

        let mut categories: HashSet<&str> = HashSet::new();
        let mut brands: HashSet<&str> = HashSet::new();
        let mut skus: HashSet<&str> = HashSet::new();

        for e in events {
            detail.total_events += 1;
            if e.timestamp >= recent_cutoff {
                detail.recent_events += 1;
            }
            if detail.last_activity.map_or(true, |last| e.timestamp > last) {
                detail.last_activity = Some(e.timestamp);
            }
            *detail.action_counts.entry(e.action.clone()).or_default() += 1;

            match e.action.as_str() {
                actions::CART_ADDED => detail.total_cart_value += e.price_or_zero(),
                actions::PAYMENT_SUCCESSFUL => detail.total_purchase_value += e.price_or_zero(),
                _ => {}
            }

            if !e.category.is_empty() {
                categories.insert(&e.category);
            }
            if !e.brand.is_empty() {
                brands.insert(&e.brand);
            }
            if !e.sku_id.is_empty() {
                skus.insert(&e.sku_id);
            }
        }

        detail.unique_categories = categories.len() as u64;
        detail.unique_brands = brands.len() as u64;
        detail.unique_skus = skus.len() as u64;
        detail.conversion_rate = if detail.total_cart_value > 0.0 {
            percentage(detail.total_purchase_value, detail.total_cart_value, 2)
        } else {
            0.0
        };

        detail
    }
}
