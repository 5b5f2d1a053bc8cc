//! Column-aligned text tables.
//!
//! Widths are measured in terminal columns with `unicode-width`, so names
//! containing wide glyphs (currency signs, CJK) still line up.

use unicode_width::UnicodeWidthStr;

use cohort_core::formatting::{format_count, format_currency, format_datetime};
use cohort_core::models::{actions, UserDetail};

/// Horizontal alignment of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// A header row plus data rows, rendered with one space-padded column each.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    aligns: Vec<Align>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = (S, Align)>,
        S: Into<String>,
    {
        let (headers, aligns) = headers
            .into_iter()
            .map(|(h, a)| (h.into(), a))
            .unzip();
        Self {
            headers,
            aligns,
            rows: Vec::new(),
        }
    }

    /// Append a row. Missing cells render empty; extra cells are dropped.
    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.width()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.width());
            }
        }
        widths
    }

    fn render_line(&self, cells: &[String], widths: &[usize]) -> String {
        let mut parts = Vec::with_capacity(widths.len());
        for (i, width) in widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            parts.push(pad(cell, *width, self.aligns[i]));
        }
        parts.join("  ").trim_end().to_string()
    }

    /// Render header, a dashed rule, then every row.
    pub fn render(&self) -> String {
        let widths = self.widths();
        let mut out = String::new();
        out.push_str(&self.render_line(&self.headers, &widths));
        out.push('\n');
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&rule.join("  "));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&self.render_line(row, &widths));
            out.push('\n');
        }
        out
    }
}

/// Pad `text` to `width` display columns.
pub fn pad(text: &str, width: usize, align: Align) -> String {
    let fill = " ".repeat(width.saturating_sub(text.width()));
    match align {
        Align::Left => format!("{text}{fill}"),
        Align::Right => format!("{fill}{text}"),
    }
}

/// Member listing for one cohort, one row per user.
pub fn render_user_table(title: &str, users: &[UserDetail]) -> String {
    let mut table = TextTable::new([
        ("User", Align::Left),
        ("Events", Align::Right),
        ("Recent", Align::Right),
        ("Last Activity", Align::Left),
        ("Carts", Align::Right),
        ("Purchases", Align::Right),
        ("Cart Value", Align::Right),
        ("Purchase Value", Align::Right),
        ("Conv %", Align::Right),
    ]);

    for u in users {
        table.push_row(vec![
            u.user_id.clone(),
            u.total_events.to_string(),
            u.recent_events.to_string(),
            u.last_activity.map(format_datetime).unwrap_or_else(|| "-".to_string()),
            u.count_for(actions::CART_ADDED).to_string(),
            u.count_for(actions::PAYMENT_SUCCESSFUL).to_string(),
            format_currency(u.total_cart_value),
            format_currency(u.total_purchase_value),
            format!("{:.2}", u.conversion_rate),
        ]);
    }

    let mut out = format!("{title} ({} users)\n\n", format_count(users.len()));
    if table.is_empty() {
        out.push_str("No users in this cohort.\n");
    } else {
        out.push_str(&table.render());
    }
    out
}
