use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CohortError, Result};

/// Lookback window applied when a condition definition omits `timeframe`.
pub const DEFAULT_TIMEFRAME_DAYS: u32 = 30;

/// Longest lookback a condition may declare (about a century).
pub const MAX_TIMEFRAME_DAYS: u32 = 36_500;

/// Identifier assigned to a cohort by the registry.
pub type CohortId = u64;

/// Action names emitted by the storefront.
pub mod actions {
    pub const CART_ADDED: &str = "cart_added";
    pub const PAYMENT_SUCCESSFUL: &str = "payment_successful";
    pub const CHECKOUT_CLICKED: &str = "checkout_clicked";
    pub const PDP_VIEW: &str = "PDP_view";
    pub const BUY_NOW_CLICKED: &str = "buy_now_clicked";
    pub const USER_LOGIN: &str = "user_login";
    pub const USER_SIGNUP: &str = "user_signup";
    pub const WISHLIST_ADDED: &str = "wishlist_added";

    /// Every known action, in catalogue order.
    pub const ALL: [&str; 8] = [
        CART_ADDED,
        PAYMENT_SUCCESSFUL,
        CHECKOUT_CLICKED,
        PDP_VIEW,
        BUY_NOW_CLICKED,
        USER_LOGIN,
        USER_SIGNUP,
        WISHLIST_ADDED,
    ];
}

// ── Event ─────────────────────────────────────────────────────────────────────

/// A single user interaction recorded by the storefront.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier of the user that performed the action.
    pub user_id: String,
    /// Action name, e.g. `"cart_added"`.
    #[serde(alias = "event")]
    pub action: String,
    /// UTC instant at which the action happened.
    pub timestamp: DateTime<Utc>,
    /// Item price, present only for priced actions.
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sku_id: String,
    #[serde(default)]
    pub brand: String,
}

impl Event {
    /// Price with missing values counted as zero.
    pub fn price_or_zero(&self) -> f64 {
        self.price.unwrap_or(0.0)
    }

    /// Value of `property` on this event, `None` when absent.
    ///
    /// Empty string attributes count as absent.
    pub fn property_value(&self, property: &EventProperty) -> Option<String> {
        let text = match property {
            EventProperty::UserId => &self.user_id,
            EventProperty::Action => &self.action,
            EventProperty::Category => &self.category,
            EventProperty::SkuId => &self.sku_id,
            EventProperty::Brand => &self.brand,
            EventProperty::Price => return self.price.map(|p| p.to_string()),
            EventProperty::Unknown(_) => return None,
        };
        if text.is_empty() {
            None
        } else {
            Some(text.clone())
        }
    }
}

/// An event attribute that conditions can aggregate over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventProperty {
    UserId,
    Action,
    Price,
    Category,
    SkuId,
    Brand,
    /// A name that is not an event attribute; it never has a value.
    Unknown(String),
}

impl EventProperty {
    /// Resolve a property name. `"event"` is accepted for the action.
    pub fn parse(name: &str) -> Self {
        match name {
            "user_id" => Self::UserId,
            "action" | "event" => Self::Action,
            "price" => Self::Price,
            "category" => Self::Category,
            "sku_id" => Self::SkuId,
            "brand" => Self::Brand,
            other => Self::Unknown(other.to_string()),
        }
    }
}

// ── Operation ─────────────────────────────────────────────────────────────────

/// Per-user aggregation applied to the events selected by a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operation {
    Count,
    Sum,
    Avg,
    DistinctCount,
    /// Any other token; evaluated as [`Operation::Count`].
    Unrecognized(String),
}

impl From<String> for Operation {
    fn from(s: String) -> Self {
        match s.as_str() {
            "count" => Self::Count,
            "sum" => Self::Sum,
            "avg" => Self::Avg,
            "distinct_count" => Self::DistinctCount,
            _ => Self::Unrecognized(s),
        }
    }
}

impl From<&str> for Operation {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        op.to_string()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => f.write_str("count"),
            Self::Sum => f.write_str("sum"),
            Self::Avg => f.write_str("avg"),
            Self::DistinctCount => f.write_str("distinct_count"),
            Self::Unrecognized(s) => f.write_str(s),
        }
    }
}

// ── Comparator ────────────────────────────────────────────────────────────────

/// Threshold test applied to a user's aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Comparator {
    Gte,
    Gt,
    Lte,
    Lt,
    Eq,
    /// Any other token; matches nobody.
    Unrecognized(String),
}

impl Comparator {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    /// Compare `metric` against `threshold`. Unrecognized comparators never match.
    pub fn matches(&self, metric: f64, threshold: f64) -> bool {
        match self {
            Self::Gte => metric >= threshold,
            Self::Gt => metric > threshold,
            Self::Lte => metric <= threshold,
            Self::Lt => metric < threshold,
            Self::Eq => metric == threshold,
            Self::Unrecognized(_) => false,
        }
    }
}

impl From<String> for Comparator {
    fn from(s: String) -> Self {
        match s.as_str() {
            ">=" => Self::Gte,
            ">" => Self::Gt,
            "<=" => Self::Lte,
            "<" => Self::Lt,
            "==" => Self::Eq,
            _ => Self::Unrecognized(s),
        }
    }
}

impl From<&str> for Comparator {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Comparator> for String {
    fn from(c: Comparator) -> Self {
        c.to_string()
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gte => f.write_str(">="),
            Self::Gt => f.write_str(">"),
            Self::Lte => f.write_str("<="),
            Self::Lt => f.write_str("<"),
            Self::Eq => f.write_str("=="),
            Self::Unrecognized(s) => f.write_str(s),
        }
    }
}

// ── Logic ─────────────────────────────────────────────────────────────────────

/// How a condition joins the running result of the conditions before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Logic {
    And,
    Or,
    /// Any other token; combined as [`Logic::And`].
    Unrecognized(String),
}

impl From<String> for Logic {
    /// Parsing is case-insensitive.
    fn from(s: String) -> Self {
        match s.to_uppercase().as_str() {
            "AND" => Self::And,
            "OR" => Self::Or,
            _ => Self::Unrecognized(s),
        }
    }
}

impl From<&str> for Logic {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Logic> for String {
    fn from(l: Logic) -> Self {
        l.to_string()
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
            Self::Unrecognized(s) => f.write_str(s),
        }
    }
}

// ── Condition ─────────────────────────────────────────────────────────────────

/// One behavioral predicate over an action within a lookback window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub action: String,
    pub operation: Operation,
    /// Aggregated attribute for `sum`, `avg` and `distinct_count`.
    #[serde(default)]
    pub property: String,
    #[serde(alias = "condition")]
    pub comparator: Comparator,
    pub value: f64,
    #[serde(alias = "timeframe")]
    pub timeframe_days: u32,
    /// `false` turns the condition into "everyone except the matches".
    pub include: bool,
    #[serde(default)]
    pub logic: Option<Logic>,
}

impl Condition {
    /// Build an including condition with no property and no logic.
    pub fn new(
        action: impl Into<String>,
        operation: impl Into<Operation>,
        comparator: impl Into<Comparator>,
        value: f64,
        timeframe_days: u32,
    ) -> Self {
        Self {
            action: action.into(),
            operation: operation.into(),
            property: String::new(),
            comparator: comparator.into(),
            value,
            timeframe_days,
            include: true,
            logic: None,
        }
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = property.into();
        self
    }

    pub fn with_logic(mut self, logic: impl Into<Logic>) -> Self {
        self.logic = Some(logic.into());
        self
    }

    pub fn excluding(mut self) -> Self {
        self.include = false;
        self
    }

    /// Structural checks performed when a condition is attached to a cohort.
    pub fn validate(&self) -> Result<()> {
        if self.action.trim().is_empty() {
            return Err(CohortError::Validation(
                "condition action must not be empty".to_string(),
            ));
        }
        if self.timeframe_days == 0 {
            return Err(CohortError::Validation(format!(
                "condition on '{}' must have a positive timeframe",
                self.action
            )));
        }
        if self.timeframe_days > MAX_TIMEFRAME_DAYS {
            return Err(CohortError::Validation(format!(
                "condition on '{}' has a timeframe of {} days (max {})",
                self.action, self.timeframe_days, MAX_TIMEFRAME_DAYS
            )));
        }
        if !self.value.is_finite() {
            return Err(CohortError::Validation(format!(
                "condition on '{}' has a non-finite value",
                self.action
            )));
        }
        Ok(())
    }
}

/// Loosely typed condition as it appears in definition files.
///
/// Every field is optional so that a missing one can be reported as a
/// [`CohortError::Validation`] instead of a parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionDraft {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default, alias = "condition")]
    pub comparator: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default, alias = "timeframe")]
    pub timeframe_days: Option<u32>,
    #[serde(default)]
    pub include: Option<bool>,
    #[serde(default)]
    pub logic: Option<String>,
}

impl TryFrom<ConditionDraft> for Condition {
    type Error = CohortError;

    fn try_from(draft: ConditionDraft) -> Result<Self> {
        fn missing(field: &str) -> CohortError {
            CohortError::Validation(format!("missing required field `{}`", field))
        }

        let condition = Condition {
            action: draft.action.ok_or_else(|| missing("action"))?,
            operation: Operation::from(draft.operation.ok_or_else(|| missing("operation"))?),
            property: draft.property.unwrap_or_default(),
            comparator: Comparator::from(draft.comparator.ok_or_else(|| missing("condition"))?),
            value: draft.value.ok_or_else(|| missing("value"))?,
            timeframe_days: draft.timeframe_days.unwrap_or(DEFAULT_TIMEFRAME_DAYS),
            include: draft.include.unwrap_or(true),
            logic: draft.logic.map(Logic::from),
        };
        condition.validate()?;
        Ok(condition)
    }
}

// ── Cohort ────────────────────────────────────────────────────────────────────

/// A named, ordered set of conditions defining a user segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    pub id: CohortId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub conditions: Vec<Condition>,
    pub active: bool,
    /// Creation date formatted as `YYYY-MM-DD`.
    pub created_date: String,
    /// `"System"` for built-in cohorts, `"User"` otherwise.
    pub created_by: String,
}

/// A cohort definition file entry, before the registry assigns an id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohortDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub conditions: Vec<ConditionDraft>,
}

/// Reporting row for one active cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSummary {
    pub id: CohortId,
    pub name: String,
    pub description: String,
    pub user_count: usize,
    pub conditions_count: usize,
    pub created_date: String,
}

impl CohortSummary {
    pub fn from_cohort(cohort: &Cohort, user_count: usize) -> Self {
        Self {
            id: cohort.id,
            name: cohort.name.clone(),
            description: cohort.description.clone(),
            user_count,
            conditions_count: cohort.conditions.len(),
            created_date: cohort.created_date.clone(),
        }
    }
}

/// Per-user activity projection used by listings and exports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDetail {
    pub user_id: String,
    pub total_events: u64,
    /// Events within the last 30 days.
    pub recent_events: u64,
    pub last_activity: Option<DateTime<Utc>>,
    /// Event count per action name.
    pub action_counts: BTreeMap<String, u64>,
    pub total_cart_value: f64,
    pub total_purchase_value: f64,
    pub unique_categories: u64,
    pub unique_brands: u64,
    pub unique_skus: u64,
    /// Purchase value as a percentage of cart value, 0 without cart value.
    pub conversion_rate: f64,
}

impl UserDetail {
    /// Number of events recorded for `action`.
    pub fn count_for(&self, action: &str) -> u64 {
        self.action_counts.get(action).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_event(price: Option<f64>) -> Event {
        Event {
            user_id: "user_1".to_string(),
            action: actions::CART_ADDED.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            price,
            category: "electronics".to_string(),
            sku_id: "SKU1234".to_string(),
            brand: String::new(),
        }
    }

    // ── Event ────────────────────────────────────────────────────────────────

    #[test]
    fn test_price_or_zero() {
        assert_eq!(sample_event(Some(12.5)).price_or_zero(), 12.5);
        assert_eq!(sample_event(None).price_or_zero(), 0.0);
    }

    #[test]
    fn test_property_value_known_fields() {
        let e = sample_event(Some(100.0));
        assert_eq!(
            e.property_value(&EventProperty::SkuId),
            Some("SKU1234".to_string())
        );
        assert_eq!(
            e.property_value(&EventProperty::Category),
            Some("electronics".to_string())
        );
        assert_eq!(
            e.property_value(&EventProperty::Price),
            Some("100".to_string())
        );
    }

    #[test]
    fn test_property_value_empty_and_unknown_are_absent() {
        let e = sample_event(None);
        assert_eq!(e.property_value(&EventProperty::Brand), None);
        assert_eq!(e.property_value(&EventProperty::Price), None);
        assert_eq!(
            e.property_value(&EventProperty::Unknown("color".to_string())),
            None
        );
    }

    #[test]
    fn test_event_deserialize_accepts_event_key() {
        let json = r#"{"user_id":"u1","event":"PDP_view","timestamp":"2024-03-01T10:00:00Z"}"#;
        let e: Event = serde_json::from_str(json).unwrap();
        assert_eq!(e.action, "PDP_view");
        assert!(e.price.is_none());
        assert!(e.sku_id.is_empty());
    }

    #[test]
    fn test_event_property_parse() {
        assert_eq!(EventProperty::parse("event"), EventProperty::Action);
        assert_eq!(EventProperty::parse("sku_id"), EventProperty::SkuId);
        assert_eq!(
            EventProperty::parse("events"),
            EventProperty::Unknown("events".to_string())
        );
    }

    // ── Enumerations ─────────────────────────────────────────────────────────

    #[test]
    fn test_operation_parse_and_display() {
        assert_eq!(Operation::from("distinct_count"), Operation::DistinctCount);
        assert_eq!(
            Operation::from("median"),
            Operation::Unrecognized("median".to_string())
        );
        assert_eq!(Operation::from("median").to_string(), "median");
        assert_eq!(Operation::Avg.to_string(), "avg");
    }

    #[test]
    fn test_operation_is_case_sensitive() {
        assert_eq!(
            Operation::from("COUNT"),
            Operation::Unrecognized("COUNT".to_string())
        );
    }

    #[test]
    fn test_comparator_matches() {
        assert!(Comparator::Gte.matches(3.0, 3.0));
        assert!(!Comparator::Gt.matches(3.0, 3.0));
        assert!(Comparator::Lte.matches(2.0, 3.0));
        assert!(Comparator::Lt.matches(2.0, 3.0));
        assert!(Comparator::Eq.matches(3.0, 3.0));
        assert!(!Comparator::from("!=").matches(2.0, 3.0));
        assert!(!Comparator::from("=>").is_recognized());
    }

    #[test]
    fn test_logic_parse_case_insensitive() {
        assert_eq!(Logic::from("or"), Logic::Or);
        assert_eq!(Logic::from("And"), Logic::And);
        assert_eq!(Logic::from("XOR"), Logic::Unrecognized("XOR".to_string()));
    }

    #[test]
    fn test_enums_serialize_as_tokens() {
        let c = Condition::new("cart_added", "sum", ">=", 3000.0, 7)
            .with_property("price")
            .with_logic("AND");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["operation"], "sum");
        assert_eq!(json["comparator"], ">=");
        assert_eq!(json["logic"], "AND");

        let back: Condition = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    // ── Condition ────────────────────────────────────────────────────────────

    #[test]
    fn test_condition_builder() {
        let c = Condition::new("payment_successful", "count", ">=", 1.0, 7)
            .excluding()
            .with_logic("AND");
        assert!(!c.include);
        assert_eq!(c.logic, Some(Logic::And));
        assert!(c.property.is_empty());
    }

    #[test]
    fn test_condition_validate_rejects_zero_timeframe() {
        let c = Condition::new("cart_added", "count", ">=", 1.0, 0);
        assert!(matches!(c.validate(), Err(CohortError::Validation(_))));
    }

    #[test]
    fn test_condition_validate_bounds_timeframe() {
        let max = Condition::new("cart_added", "count", ">=", 1.0, MAX_TIMEFRAME_DAYS);
        assert!(max.validate().is_ok());
        let huge = Condition::new("cart_added", "count", ">=", 1.0, 200_000_000);
        assert!(matches!(huge.validate(), Err(CohortError::Validation(_))));
    }

    #[test]
    fn test_condition_validate_rejects_blank_action() {
        let c = Condition::new("  ", "count", ">=", 1.0, 7);
        assert!(matches!(c.validate(), Err(CohortError::Validation(_))));
    }

    #[test]
    fn test_condition_validate_accepts_unknown_tokens() {
        let c = Condition::new("cart_added", "median", "~=", 1.0, 7).with_logic("XOR");
        assert!(c.validate().is_ok());
    }

    // ── ConditionDraft ───────────────────────────────────────────────────────

    #[test]
    fn test_draft_with_definition_file_keys() {
        let json = r#"{
            "include": false,
            "action": "payment_successful",
            "operation": "count",
            "property": "events",
            "condition": ">=",
            "value": 1,
            "timeframe": 7,
            "logic": null
        }"#;
        let draft: ConditionDraft = serde_json::from_str(json).unwrap();
        let c = Condition::try_from(draft).unwrap();
        assert_eq!(c.comparator, Comparator::Gte);
        assert_eq!(c.timeframe_days, 7);
        assert!(!c.include);
        assert!(c.logic.is_none());
    }

    #[test]
    fn test_draft_defaults() {
        let draft = ConditionDraft {
            action: Some("cart_added".to_string()),
            operation: Some("count".to_string()),
            comparator: Some(">".to_string()),
            value: Some(0.0),
            ..Default::default()
        };
        let c = Condition::try_from(draft).unwrap();
        assert_eq!(c.timeframe_days, DEFAULT_TIMEFRAME_DAYS);
        assert!(c.include);
    }

    #[test]
    fn test_draft_missing_field_is_validation_error() {
        let draft = ConditionDraft {
            action: Some("cart_added".to_string()),
            operation: Some("count".to_string()),
            value: Some(1.0),
            ..Default::default()
        };
        let err = Condition::try_from(draft).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid cohort definition: missing required field `condition`"
        );
    }

    // ── UserDetail ───────────────────────────────────────────────────────────

    #[test]
    fn test_user_detail_count_for() {
        let mut detail = UserDetail::default();
        detail.action_counts.insert("cart_added".to_string(), 3);
        assert_eq!(detail.count_for("cart_added"), 3);
        assert_eq!(detail.count_for("user_login"), 0);
    }
}
