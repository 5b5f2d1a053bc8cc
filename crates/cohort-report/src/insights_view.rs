//! Dataset-level statistics printed before cohort analysis.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use cohort_core::formatting::{format_count, format_currency, format_date};
use cohort_core::models::actions;
use cohort_data::store::{EventStore, MemoryEventStore};

/// Cart prices at or above this count as high value.
pub const HIGH_VALUE_CART: f64 = 3000.0;

/// Statistics over priced `cart_added` events.
#[derive(Debug, Clone, PartialEq)]
pub struct CartStats {
    pub events: usize,
    /// Mean, max and min over carts that carry a price.
    pub average: f64,
    pub max: f64,
    pub min: f64,
    pub high_value_carts: usize,
    pub high_value_users: usize,
}

/// Dataset summary computed from an event store.
#[derive(Debug, Clone, PartialEq)]
pub struct DataInsights {
    pub total_events: usize,
    pub unique_users: usize,
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Event count per action, most frequent first.
    pub distribution: Vec<(String, usize)>,
    pub carts: Option<CartStats>,
}

impl DataInsights {
    pub fn from_store(store: &MemoryEventStore) -> Self {
        let carts: Vec<_> = store
            .events()
            .iter()
            .filter(|e| e.action == actions::CART_ADDED)
            .collect();

        let cart_stats = if carts.is_empty() {
            None
        } else {
            let prices: Vec<f64> = carts.iter().filter_map(|e| e.price).collect();
            let (average, max, min) = if prices.is_empty() {
                (0.0, 0.0, 0.0)
            } else {
                (
                    prices.iter().sum::<f64>() / prices.len() as f64,
                    prices.iter().copied().fold(f64::MIN, f64::max),
                    prices.iter().copied().fold(f64::MAX, f64::min),
                )
            };
            let high: Vec<_> = carts
                .iter()
                .filter(|e| e.price.is_some_and(|p| p >= HIGH_VALUE_CART))
                .collect();
            let high_users: HashSet<&str> = high.iter().map(|e| e.user_id.as_str()).collect();
            Some(CartStats {
                events: carts.len(),
                average,
                max,
                min,
                high_value_carts: high.len(),
                high_value_users: high_users.len(),
            })
        };

        Self {
            total_events: store.len(),
            unique_users: store.universe().len(),
            date_range: store.date_range(),
            distribution: store.action_distribution(),
            carts: cart_stats,
        }
    }
}

/// Render [`DataInsights`] as an 80-column text block.
pub fn render_data_insights(insights: &DataInsights) -> String {
    let heavy = "=".repeat(80);
    let mut out = format!("{heavy}\nDATA INSIGHTS\n{heavy}\n");
    out.push_str(&format!("Total Events: {}\n", format_count(insights.total_events)));
    out.push_str(&format!("Unique Users: {}\n", format_count(insights.unique_users)));
    if let Some((first, last)) = insights.date_range {
        out.push_str(&format!(
            "Date Range: {} to {}\n",
            format_date(first),
            format_date(last)
        ));
    }

    out.push_str("\nEvent Distribution:\n");
    for (action, count) in &insights.distribution {
        out.push_str(&format!("  {action}: {}\n", format_count(*count)));
    }

    if let Some(c) = &insights.carts {
        out.push_str("\nCart Statistics:\n");
        out.push_str(&format!("  Total Cart Events: {}\n", format_count(c.events)));
        out.push_str(&format!("  Average Cart Value: {}\n", format_currency(c.average)));
        out.push_str(&format!("  Max Cart Value: {}\n", format_currency(c.max)));
        out.push_str(&format!("  Min Cart Value: {}\n", format_currency(c.min)));
        out.push_str(&format!(
            "  High Value Carts (≥{}): {}\n",
            format_currency(HIGH_VALUE_CART),
            format_count(c.high_value_carts)
        ));
        out.push_str(&format!(
            "  Users with High Value Carts: {}\n",
            format_count(c.high_value_users)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn test_insights_from_store() {
        let store = MemoryEventStore::new(vec![
            event("a", "cart_added", 1, Some(4000.0)),
            event("a", "cart_added", 2, Some(3000.0)),
            event("b", "cart_added", 3, Some(1000.0)),
            event("b", "cart_added", 4, None),
            event("c", "user_login", 10, None),
        ]);
        let insights = DataInsights::from_store(&store);

        assert_eq!(insights.total_events, 5);
        assert_eq!(insights.unique_users, 3);
        assert_eq!(insights.distribution[0], ("cart_added".to_string(), 4));

        let carts = insights.carts.unwrap();
        assert_eq!(carts.events, 4);
        assert!((carts.average - 8000.0 / 3.0).abs() < 1e-9);
        assert_eq!(carts.max, 4000.0);
        assert_eq!(carts.min, 1000.0);
        assert_eq!(carts.high_value_carts, 2);
        assert_eq!(carts.high_value_users, 1);
    }

    #[test]
    fn test_render_without_carts() {
        let store = MemoryEventStore::new(vec![event("c", "user_login", 0, None)]);
        let out = render_data_insights(&DataInsights::from_store(&store));
        assert!(out.contains("Total Events: 1"));
        assert!(out.contains("Date Range: 2024-06-15 to 2024-06-15"));
        assert!(out.contains("  user_login: 1"));
        assert!(!out.contains("Cart Statistics"));
    }

    #[test]
    fn test_render_empty_store() {
        let out = render_data_insights(&DataInsights::from_store(&MemoryEventStore::default()));
        assert!(out.contains("Unique Users: 0"));
        assert!(!out.contains("Date Range"));
    }
}
