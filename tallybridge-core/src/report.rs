//! Human-readable reconciliation reports.
//!
//! The raw [`ReconciliationResult`] is never truncated; only the rendered
//! summary and email cap the missing list for presentation.

use chrono::{DateTime, Utc};

use crate::model::ReconciliationResult;

/// Missing entries shown in the one-line summary before the overflow
/// counter takes over.
pub const MISSING_SUMMARY_LIMIT: usize = 20;

/// Missing entries listed in the HTML report body.
const MISSING_HTML_LIMIT: usize = 40;

/// One-line summary of the missing list: up to 20 entries, then "... +N".
pub fn missing_summary(missing: &[String]) -> String {
    if missing.is_empty() {
        return "None".to_string();
    }
    let shown = missing.len().min(MISSING_SUMMARY_LIMIT);
    let mut text = missing[..shown].join(", ");
    if missing.len() > MISSING_SUMMARY_LIMIT {
        text = format!("{}... +{}", text, missing.len() - MISSING_SUMMARY_LIMIT);
    }
    text
}

/// Subject line for the report email.
pub fn subject(result: &ReconciliationResult) -> String {
    let currency = if result.currency.is_empty() {
        "ALL"
    } else {
        &result.currency
    };
    format!(
        "Tallybridge Invoice Check - [{}] ({})",
        result.statuses.join(", "),
        currency
    )
}

/// Label for the filtered date range, with "..." standing in for an open
/// bound. Empty when no bound was given.
pub fn date_range_label(result: &ReconciliationResult) -> String {
    if result.date_from.is_none() && result.date_to.is_none() {
        return String::new();
    }
    let from = result
        .date_from
        .map(|d| d.to_string())
        .unwrap_or_else(|| "...".to_string());
    let to = result
        .date_to
        .map(|d| d.to_string())
        .unwrap_or_else(|| "...".to_string());
    format!("{} to {}", from, to)
}

/// Render the HTML report body.
pub fn render_html(result: &ReconciliationResult, generated_at: DateTime<Utc>) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(
        "<html><body style='font-family: Arial; background: #f6f8fb; padding: 16px;'>".to_string(),
    );
    parts.push(
        "<div style='max-width: 700px; margin: 0 auto; background: #ffffff; \
         border: 1px solid #e2e8f0; border-radius: 12px; overflow: hidden;'>"
            .to_string(),
    );
    parts.push(
        "<div style='background: linear-gradient(90deg, #1d4ed8, #0ea5e9); color: white; \
         padding: 20px;'>"
            .to_string(),
    );
    parts.push("<h2 style='margin: 0; font-size: 20px;'>Invoice Reconciliation Report</h2>".to_string());
    parts.push(format!(
        "<p style='margin: 6px 0 0; font-size: 12px;'>Generated {}</p>",
        generated_at.format("%d-%b-%Y %H:%M")
    ));
    parts.push("</div>".to_string());
    parts.push("<div style='padding: 20px;'>".to_string());

    let currency = if result.currency.is_empty() {
        "ALL"
    } else {
        &result.currency
    };
    parts.push(format!(
        "<p style='margin: 0 0 6px;'><strong>Filter:</strong> [{}] ({})</p>",
        result.statuses.join(", "),
        currency
    ));

    let range = date_range_label(result);
    if !range.is_empty() {
        parts.push(format!(
            "<p style='margin: 0 0 12px;'><strong>Date range:</strong> {}</p>",
            range
        ));
    }

    parts.push("<div style='display: flex; gap: 12px; flex-wrap: wrap; margin-bottom: 16px;'>".to_string());
    for (label, value, fg) in [
        ("Books Invoices", result.books_count, "#0f172a"),
        ("Storage Files", result.file_count, "#0f172a"),
        ("Matched", result.matched, "#166534"),
        ("Missing", result.missing, "#991b1b"),
    ] {
        parts.push(format!(
            "<div style='flex: 1; min-width: 140px; background: #f8fafc; \
             border: 1px solid #e2e8f0; padding: 12px; border-radius: 8px;'>\
             <div style='font-size: 12px; color: #64748b;'>{}</div>\
             <div style='font-size: 18px; font-weight: 700; color: {};'>{}</div></div>",
            label, fg, value
        ));
    }
    parts.push("</div>".to_string());

    parts.push("<h3 style='margin: 0 0 8px; font-size: 16px;'>Missing Invoices</h3>".to_string());
    if result.missing > 0 {
        let mut items: String = result
            .missing_list
            .iter()
            .take(MISSING_HTML_LIMIT)
            .map(|number| format!("<li style='margin: 2px 0;'>{}</li>", number))
            .collect();
        if result.missing > MISSING_HTML_LIMIT {
            items.push_str("<li>... more omitted</li>");
        }
        parts.push(format!(
            "<ul style='padding-left: 18px; margin: 0;'>{}</ul>",
            items
        ));
    } else {
        parts.push("<p style='margin: 0; color: #16a34a;'>None</p>".to_string());
    }

    parts.push("</div>".to_string());
    parts.push(
        "<div style='padding: 12px 20px; background: #f8fafc; font-size: 11px; \
         color: #94a3b8;'>Auto-generated reconciliation report</div>"
            .to_string(),
    );
    parts.push("</div>".to_string());
    parts.push("</body></html>".to_string());

    parts.concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with_missing(missing_list: Vec<String>) -> ReconciliationResult {
        ReconciliationResult {
            currency: "KES".to_string(),
            statuses: vec!["unpaid".to_string()],
            books_count: missing_list.len() + 2,
            file_count: 2,
            matched: 2,
            missing: missing_list.len(),
            missing_list,
            date_from: None,
            date_to: None,
            email_sent: false,
        }
    }

    #[test]
    fn test_missing_summary_empty() {
        assert_eq!(missing_summary(&[]), "None");
    }

    #[test]
    fn test_missing_summary_under_limit() {
        let missing = vec!["INV-1".to_string(), "INV-2".to_string()];
        assert_eq!(missing_summary(&missing), "INV-1, INV-2");
    }

    #[test]
    fn test_missing_summary_truncates_at_twenty() {
        let missing: Vec<String> = (1..=25).map(|i| format!("INV-{}", i)).collect();
        let summary = missing_summary(&missing);
        assert!(summary.ends_with("... +5"));
        assert!(summary.contains("INV-20"));
        assert!(!summary.contains("INV-21,"));
        // The raw list is untouched.
        assert_eq!(missing.len(), 25);
    }

    #[test]
    fn test_subject_uses_all_for_empty_currency() {
        let mut result = result_with_missing(vec![]);
        result.currency = String::new();
        assert_eq!(subject(&result), "Tallybridge Invoice Check - [unpaid] (ALL)");
    }

    #[test]
    fn test_date_range_label() {
        let mut result = result_with_missing(vec![]);
        assert_eq!(date_range_label(&result), "");

        result.date_from = chrono::NaiveDate::from_ymd_opt(2024, 1, 1);
        assert_eq!(date_range_label(&result), "2024-01-01 to ...");

        result.date_to = chrono::NaiveDate::from_ymd_opt(2024, 2, 1);
        assert_eq!(date_range_label(&result), "2024-01-01 to 2024-02-01");
    }

    #[test]
    fn test_render_html_counts_and_caps() {
        let missing: Vec<String> = (1..=45).map(|i| format!("INV-{}", i)).collect();
        let result = result_with_missing(missing);
        let html = render_html(&result, Utc::now());

        assert!(html.contains("Missing Invoices"));
        assert!(html.contains("<li style='margin: 2px 0;'>INV-40</li>"));
        assert!(!html.contains("<li style='margin: 2px 0;'>INV-41</li>"));
        assert!(html.contains("... more omitted"));
        assert!(html.contains("[unpaid] (KES)"));
    }

    #[test]
    fn test_render_html_no_missing() {
        let result = result_with_missing(vec![]);
        let html = render_html(&result, Utc::now());
        assert!(html.contains("None"));
        assert!(!html.contains("more omitted"));
    }
}
