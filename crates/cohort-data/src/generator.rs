//! Seeded synthetic event generation for demos and tests.

use chrono::{DateTime, Duration, Utc};
use cohort_core::models::{actions, Event};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const CATEGORIES: [&str; 4] = ["men_shoe", "women_clothing", "electronics", "beauty"];
const BRANDS: [&str; 5] = ["Nike", "Adidas", "Puma", "Apple", "Samsung"];

/// Parameters for [`EventGenerator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorConfig {
    pub users: u32,
    pub seed: u64,
    /// Events per user, inclusive range.
    pub min_events: u32,
    pub max_events: u32,
    /// Events are spread over this many days before `now`.
    pub history_days: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            users: 5000,
            seed: 42,
            min_events: 5,
            max_events: 20,
            history_days: 30,
        }
    }
}

/// Produces a deterministic event stream for a given seed.
pub struct EventGenerator {
    config: GeneratorConfig,
    rng: StdRng,
}

impl EventGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
        }
    }

    /// Generate events for users `user_1..=user_N`, sorted by timestamp.
    pub fn generate(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        for i in 1..=self.config.users {
            let user_id = format!("user_{i}");
            let n = self
                .rng
                .gen_range(self.config.min_events..=self.config.max_events.max(self.config.min_events));
            for _ in 0..n {
                events.push(self.random_event(&user_id, now));
            }
        }
        events.sort_by_key(|e| e.timestamp);

        tracing::info!(
            events = events.len(),
            users = self.config.users,
            seed = self.config.seed,
            "generated synthetic events"
        );
        events
    }

    fn random_event(&mut self, user_id: &str, now: DateTime<Utc>) -> Event {
        let action = *actions::ALL.choose(&mut self.rng).unwrap_or(&actions::USER_LOGIN);
        let price = match action {
            actions::CART_ADDED => Some(f64::from(self.rng.gen_range(500u32..=8000))),
            actions::PAYMENT_SUCCESSFUL => Some(f64::from(self.rng.gen_range(300u32..=6000))),
            _ => None,
        };
        let offset = Duration::days(self.rng.gen_range(0..=self.config.history_days))
            + Duration::hours(self.rng.gen_range(0..=23))
            + Duration::minutes(self.rng.gen_range(0..=59));

        Event {
            user_id: user_id.to_string(),
            action: action.to_string(),
            timestamp: now - offset,
            price,
            category: CATEGORIES.choose(&mut self.rng).unwrap_or(&CATEGORIES[0]).to_string(),
            sku_id: format!("SKU{}", self.rng.gen_range(1000..=9999)),
            brand: BRANDS.choose(&mut self.rng).unwrap_or(&BRANDS[0]).to_string(),
        }
    }
}

/// Convenience wrapper: generate with default ranges for `users` and `seed`.
pub fn generate_events(users: u32, seed: u64, now: DateTime<Utc>) -> Vec<Event> {
    EventGenerator::new(GeneratorConfig {
        users,
        seed,
        ..Default::default()
    })
    .generate(now)
}
