//! Cohort summary report.

use cohort_core::formatting::format_count;
use cohort_core::models::CohortSummary;

const RULE_WIDTH: usize = 80;

/// Render totals followed by one block per active cohort.
pub fn render_cohort_summary(summaries: &[CohortSummary]) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);

    let mut out = String::new();
    out.push_str(&heavy);
    out.push_str("\nUSER COHORT ANALYSIS SUMMARY\n");
    out.push_str(&heavy);
    out.push('\n');

    if summaries.is_empty() {
        out.push_str("No active cohorts found.\n");
        return out;
    }

    let total: usize = summaries.iter().map(|s| s.user_count).sum();
    let average = total as f64 / summaries.len() as f64;
    out.push_str(&format!("\nTotal Active Cohorts: {}\n", summaries.len()));
    out.push_str(&format!("Total Users Across All Cohorts: {}\n", format_count(total)));
    out.push_str(&format!("Average Cohort Size: {average:.0}\n"));

    out.push_str(&format!("\n{light}\nCOHORT DETAILS:\n{light}\n"));
    for s in summaries {
        out.push_str(&format!("\nCohort #{}: {}\n", s.id, s.name));
        out.push_str(&format!("  Description: {}\n", s.description));
        out.push_str(&format!("  Users: {}\n", format_count(s.user_count)));
        out.push_str(&format!("  Created: {}\n", s.created_date));
        out.push_str(&format!("  Conditions: {}\n", s.conditions_count));
    }
    out.push_str(&format!("\n{heavy}\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: u64, name: &str, users: usize) -> CohortSummary {
        CohortSummary {
            id,
            name: name.to_string(),
            description: format!("{name} users"),
            user_count: users,
            conditions_count: 2,
            created_date: "2024-06-15".to_string(),
        }
    }

    #[test]
    fn test_empty_summary() {
        let out = render_cohort_summary(&[]);
        assert!(out.contains("No active cohorts found."));
        assert!(!out.contains("COHORT DETAILS"));
    }

    #[test]
    fn test_summary_totals_and_blocks() {
        let out = render_cohort_summary(&[summary(1, "Carted", 1200), summary(3, "Paid", 300)]);
        assert!(out.contains("Total Active Cohorts: 2"));
        assert!(out.contains("Total Users Across All Cohorts: 1,500"));
        assert!(out.contains("Average Cohort Size: 750"));
        assert!(out.contains("Cohort #3: Paid"));
        assert!(out.contains("  Users: 1,200"));
        assert!(out.lines().all(|l| l.chars().count() <= RULE_WIDTH));
    }
}
