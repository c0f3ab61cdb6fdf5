//! Invoice reconciliation between the accounting and storage upstreams.
//!
//! [`InvoiceReconciler::check_invoices`] is the one operation an HTTP or CLI
//! layer needs to expose: fetch invoices, fetch storage filenames, normalize
//! both into invoice-number collections, and diff them.

use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::books::{BooksClient, InvoiceQuery, normalize_invoice};
use crate::drive::DriveClient;
use crate::error::TallybridgeError;
use crate::model::{InvoiceStatus, ReconcileFilter, ReconciliationResult};
use crate::notify::Mailer;
use crate::report;

/// Normalize a caller-supplied currency spelling into an upstream currency
/// code.
///
/// Known local spellings map through a fixed table; anything else is
/// uppercased; absent means no filter.
pub fn normalize_currency(input: Option<&str>) -> String {
    let Some(input) = input else {
        return String::new();
    };
    match input.to_lowercase().as_str() {
        "ksh" | "kenyan shillings" => "KES".to_string(),
        "dollars" | "usd" => "USD".to_string(),
        _ => input.to_uppercase(),
    }
}

/// Parse a `YYYY-MM-DD` filter date, rejecting malformed input.
pub fn parse_filter_date(raw: &str) -> Result<NaiveDate, TallybridgeError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| TallybridgeError::validation(format!("unparseable date filter: {}", raw)))
}

/// Whether an invoice status falls in a requested status bucket.
///
/// "unpaid" covers both `sent` and `unpaid`; the other buckets are exact.
fn status_matches(requested: &str, status: InvoiceStatus) -> bool {
    match requested.to_lowercase().as_str() {
        "paid" => status == InvoiceStatus::Paid,
        "overdue" => status == InvoiceStatus::Overdue,
        "unpaid" => matches!(status, InvoiceStatus::Sent | InvoiceStatus::Unpaid),
        _ => false,
    }
}

/// Inclusive date-range check. Invoices without a parseable date are kept.
fn within_range(date: Option<NaiveDate>, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    let Some(date) = date else {
        return true;
    };
    if let Some(from) = from {
        if date < from {
            return false;
        }
    }
    if let Some(to) = to {
        if date > to {
            return false;
        }
    }
    true
}

/// Reconciles accounting invoices against storage filenames.
pub struct InvoiceReconciler {
    books: BooksClient,
    drive: DriveClient,
    mailer: Option<Arc<dyn Mailer>>,
}

impl InvoiceReconciler {
    pub fn new(books: BooksClient, drive: DriveClient) -> Self {
        Self {
            books,
            drive,
            mailer: None,
        }
    }

    /// Attach a mailer for the optional report email.
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Run one reconciliation pass.
    ///
    /// Gateway errors from either upstream propagate unchanged so the caller
    /// sees exactly which service failed. Mail delivery failure only flips
    /// `email_sent` to false.
    pub async fn check_invoices(
        &self,
        filter: &ReconcileFilter,
    ) -> Result<ReconciliationResult, TallybridgeError> {
        let currency = normalize_currency(filter.currency.as_deref());
        tracing::info!(
            currency = %currency,
            statuses = ?filter.statuses,
            "Starting invoice reconciliation"
        );

        // Server-side filters are a latency optimization; everything is
        // re-checked client-side below.
        let query = InvoiceQuery {
            currency_code: (!currency.is_empty()).then(|| currency.clone()),
            date_start: filter.date_from,
            date_end: filter.date_to,
            status: None,
        };
        let raw_invoices = self.books.list_invoices(&query).await?;

        let mut book_numbers: Vec<String> = Vec::new();
        for raw in &raw_invoices {
            let invoice = normalize_invoice(raw)?;

            if !currency.is_empty() && invoice.currency != currency {
                continue;
            }
            if (filter.date_from.is_some() || filter.date_to.is_some())
                && !within_range(invoice.date, filter.date_from, filter.date_to)
            {
                continue;
            }
            if !filter.statuses.is_empty()
                && !filter
                    .statuses
                    .iter()
                    .any(|requested| status_matches(requested, invoice.status))
            {
                continue;
            }
            book_numbers.push(invoice.number);
        }

        let file_numbers = self.drive.invoice_numbers().await?;
        let file_set: HashSet<&str> = file_numbers.iter().map(String::as_str).collect();

        // Exact string equality, as the sources report them. Case differences
        // between the two sides are not papered over.
        let mut matched = 0usize;
        let mut missing_list: Vec<String> = Vec::new();
        for number in &book_numbers {
            if file_set.contains(number.as_str()) {
                matched += 1;
            } else {
                missing_list.push(number.clone());
            }
        }

        tracing::info!(
            "Reconciliation done: {} book invoices, {} storage files, {} matched, {} missing",
            book_numbers.len(),
            file_numbers.len(),
            matched,
            missing_list.len()
        );

        let mut result = ReconciliationResult {
            currency,
            statuses: filter.statuses.clone(),
            books_count: book_numbers.len(),
            file_count: file_numbers.len(),
            matched,
            missing: missing_list.len(),
            missing_list,
            date_from: filter.date_from,
            date_to: filter.date_to,
            email_sent: false,
        };

        result.email_sent = self.maybe_send_report(filter, &result).await;
        Ok(result)
    }

    /// Hand the report to the mailer when a recipient was supplied and the
    /// storage listing was non-empty. Best-effort only.
    async fn maybe_send_report(
        &self,
        filter: &ReconcileFilter,
        result: &ReconciliationResult,
    ) -> bool {
        let Some(mailer) = &self.mailer else {
            return false;
        };
        let Some(recipient) = filter
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
        else {
            return false;
        };
        if result.file_count == 0 {
            return false;
        }

        let subject = report::subject(result);
        let body = report::render_html(result, Utc::now());
        match mailer
            .send_email(&[recipient.to_string()], &subject, &body)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to send reconciliation report email: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_currency_table() {
        assert_eq!(normalize_currency(Some("ksh")), "KES");
        assert_eq!(normalize_currency(Some("Kenyan Shillings")), "KES");
        assert_eq!(normalize_currency(Some("dollars")), "USD");
        assert_eq!(normalize_currency(Some("USD")), "USD");
        assert_eq!(normalize_currency(Some("eur")), "EUR");
        assert_eq!(normalize_currency(None), "");
    }

    #[test]
    fn test_parse_filter_date() {
        assert!(parse_filter_date("2024-01-31").is_ok());
        assert!(matches!(
            parse_filter_date("31/01/2024"),
            Err(TallybridgeError::Validation { .. })
        ));
    }

    #[test]
    fn test_status_matches_buckets() {
        assert!(status_matches("paid", InvoiceStatus::Paid));
        assert!(!status_matches("paid", InvoiceStatus::Sent));
        assert!(status_matches("overdue", InvoiceStatus::Overdue));
        assert!(status_matches("unpaid", InvoiceStatus::Sent));
        assert!(status_matches("unpaid", InvoiceStatus::Unpaid));
        assert!(!status_matches("unpaid", InvoiceStatus::Paid));
        assert!(!status_matches("draft", InvoiceStatus::Pending));
        // Requested statuses are matched case-insensitively.
        assert!(status_matches("Paid", InvoiceStatus::Paid));
    }

    #[test]
    fn test_within_range() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15);
        let june_1 = NaiveDate::from_ymd_opt(2024, 6, 1);
        let june_30 = NaiveDate::from_ymd_opt(2024, 6, 30);

        assert!(within_range(date, june_1, june_30));
        assert!(!within_range(date, june_30, None));
        assert!(!within_range(date, None, june_1));
        // Unparseable/absent dates are kept.
        assert!(within_range(None, june_1, june_30));
    }
}
