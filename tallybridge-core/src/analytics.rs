//! Dashboard analytics derived from invoice listings.
//!
//! Pure computations over the raw invoice records the accounting client
//! returns; nothing here talks to the network.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::books::{RawInvoice, parse_invoice_date};

/// Number of invoices shown in the "recent" and "overdue" panels.
const PANEL_LIMIT: usize = 5;

/// Aggregate view of an invoice listing.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsOverview {
    pub total_invoices: usize,
    pub total_revenue: f64,
    pub total_outstanding: f64,
    pub paid_count: usize,
    pub unpaid_count: usize,
    pub overdue_count: usize,
    pub status_breakdown: BTreeMap<String, usize>,
    pub recent_invoices: Vec<RawInvoice>,
    pub overdue_invoices: Vec<RawInvoice>,
}

/// Compute the overview the dashboard shows.
///
/// "Unpaid" counts both `sent` and `unpaid` statuses, matching how the
/// reconciliation status filter buckets them.
pub fn overview(invoices: &[RawInvoice]) -> AnalyticsOverview {
    let total_revenue = invoices.iter().map(|inv| inv.total).sum();
    let total_outstanding = invoices.iter().map(|inv| inv.balance).sum();

    let mut status_breakdown: BTreeMap<String, usize> = BTreeMap::new();
    for invoice in invoices {
        let status = invoice.status.clone().unwrap_or_else(|| "unknown".to_string());
        *status_breakdown.entry(status).or_insert(0) += 1;
    }

    let overdue_invoices: Vec<RawInvoice> = invoices
        .iter()
        .filter(|inv| inv.status.as_deref() == Some("overdue"))
        .cloned()
        .collect();

    let mut recent_invoices: Vec<RawInvoice> = invoices.to_vec();
    recent_invoices.sort_by(|a, b| b.date.cmp(&a.date));
    recent_invoices.truncate(PANEL_LIMIT);

    AnalyticsOverview {
        total_invoices: invoices.len(),
        total_revenue,
        total_outstanding,
        paid_count: status_breakdown.get("paid").copied().unwrap_or(0),
        unpaid_count: status_breakdown.get("sent").copied().unwrap_or(0)
            + status_breakdown.get("unpaid").copied().unwrap_or(0),
        overdue_count: overdue_invoices.len(),
        status_breakdown,
        overdue_invoices: overdue_invoices.into_iter().take(PANEL_LIMIT).collect(),
        recent_invoices,
    }
}

/// An invoice due soon, annotated with how many days remain.
#[derive(Debug, Clone, Serialize)]
pub struct UpcomingInvoice {
    #[serde(flatten)]
    pub invoice: RawInvoice,
    pub days_until_due: i64,
}

/// Invoices still awaiting payment that fall due within `days` of `today`,
/// sorted by due date.
pub fn upcoming_due(invoices: &[RawInvoice], today: NaiveDate, days: i64) -> Vec<UpcomingInvoice> {
    let horizon = today + chrono::Duration::days(days);

    let mut upcoming: Vec<UpcomingInvoice> = invoices
        .iter()
        .filter(|inv| {
            matches!(
                inv.status.as_deref(),
                Some("sent") | Some("unpaid") | Some("partially_paid")
            )
        })
        .filter_map(|inv| {
            let due = inv.due_date.as_deref().and_then(parse_invoice_date)?;
            if due < today || due > horizon {
                return None;
            }
            Some(UpcomingInvoice {
                invoice: inv.clone(),
                days_until_due: (due - today).num_days(),
            })
        })
        .collect();

    upcoming.sort_by(|a, b| a.invoice.due_date.cmp(&b.invoice.due_date));
    upcoming
}
