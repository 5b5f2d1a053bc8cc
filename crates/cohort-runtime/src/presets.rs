//! Built-in sample cohorts loaded by [`CohortRegistry::with_presets`].
//!
//! [`CohortRegistry::with_presets`]: crate::registry::CohortRegistry::with_presets

use cohort_core::models::{actions, Condition};

/// A cohort definition before the registry assigns it an id.
#[derive(Debug, Clone)]
pub struct Preset {
    pub name: String,
    pub description: String,
    pub conditions: Vec<Condition>,
}

fn preset(name: &str, description: &str, conditions: Vec<Condition>) -> Preset {
    Preset {
        name: name.to_string(),
        description: description.to_string(),
        conditions,
    }
}

fn count_at_least(action: &str, value: f64, days: u32) -> Condition {
    Condition::new(action, "count", ">=", value, days).with_property("events")
}

fn price_at_least(action: &str, operation: &str, value: f64, days: u32) -> Condition {
    Condition::new(action, operation, ">=", value, days).with_property("price")
}

/// Premium tier: purchase value, purchase count and average cart value over
/// the last year, plus a purchase within `recent_days`.
fn premium_tier(
    name: &str,
    description: &str,
    purchase_value: f64,
    purchases: f64,
    avg_cart: f64,
    recent_days: u32,
) -> Preset {
    preset(
        name,
        description,
        vec![
            price_at_least(actions::PAYMENT_SUCCESSFUL, "sum", purchase_value, 365).with_logic("AND"),
            count_at_least(actions::PAYMENT_SUCCESSFUL, purchases, 365).with_logic("AND"),
            price_at_least(actions::CART_ADDED, "avg", avg_cart, 365).with_logic("AND"),
            count_at_least(actions::PAYMENT_SUCCESSFUL, 1.0, recent_days),
        ],
    )
}

/// The six sample cohorts, in id order.
pub fn preset_cohorts() -> Vec<Preset> {
    vec![
        preset(
            "High Value Abandoned Cart",
            "Users who added expensive items but didn't complete purchase",
            vec![
                price_at_least(actions::CART_ADDED, "sum", 3000.0, 7).with_logic("AND"),
                count_at_least(actions::PAYMENT_SUCCESSFUL, 1.0, 7).excluding(),
            ],
        ),
        preset(
            "Checkout Abandoners",
            "Users who started checkout but didn't complete payment",
            vec![
                count_at_least(actions::CHECKOUT_CLICKED, 1.0, 7).with_logic("AND"),
                count_at_least(actions::PAYMENT_SUCCESSFUL, 1.0, 7).excluding(),
            ],
        ),
        preset(
            "Browser Non-Purchasers",
            "Users who browse extensively but don't add to cart",
            vec![
                count_at_least(actions::PDP_VIEW, 5.0, 7).with_logic("AND"),
                count_at_least(actions::CART_ADDED, 1.0, 7).excluding(),
            ],
        ),
        premium_tier(
            "Platinum",
            "Top-tier premium customers: high LTV, frequent buyers, and recent purchasers",
            15000.0,
            5.0,
            2000.0,
            90,
        ),
        premium_tier(
            "Gold",
            "Mid-tier premium customers: good spenders and somewhat frequent buyers",
            7000.0,
            3.0,
            1000.0,
            180,
        ),
        premium_tier(
            "Silver",
            "Entry premium: some spend and at least one recent purchase",
            2000.0,
            1.0,
            500.0,
            365,
        ),
    ]
}
