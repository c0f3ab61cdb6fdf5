//! Accounting (Books) upstream client.
//!
//! Thin wrapper over the [`ApiGateway`] for the invoice endpoints, plus the
//! parse/normalize step that turns raw upstream JSON into
//! [`NormalizedInvoice`] values.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::TallybridgeError;
use crate::gateway::{ApiGateway, UpstreamRequest};
use crate::model::{InvoiceStatus, NormalizedInvoice};

/// Default API host for the accounting service.
pub const DEFAULT_API_BASE: &str = "https://www.zohoapis.com";

const INVOICE_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// An invoice as the accounting service reports it.
///
/// Every field the upstream may omit is optional; normalization decides what
/// is actually required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawInvoice {
    pub invoice_id: Option<String>,
    pub invoice_number: Option<String>,
    pub customer_name: Option<String>,
    pub status: Option<String>,
    pub currency_code: Option<String>,
    pub date: Option<String>,
    pub due_date: Option<String>,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub balance: f64,
}

/// Map a raw invoice into the normalized shape.
///
/// The invoice number is required; a record without one is a malformed
/// upstream payload, not a crash. Unparseable dates become `None` so date
/// filtering keeps the invoice.
pub fn normalize_invoice(raw: &RawInvoice) -> Result<NormalizedInvoice, TallybridgeError> {
    let number = raw
        .invoice_number
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| TallybridgeError::validation("invoice record is missing invoice_number"))?;

    let status = raw
        .status
        .as_deref()
        .map(InvoiceStatus::parse)
        .unwrap_or(InvoiceStatus::Unknown);

    let currency = raw.currency_code.clone().unwrap_or_default();
    let date = raw.date.as_deref().and_then(parse_invoice_date);

    Ok(NormalizedInvoice {
        number,
        status,
        currency,
        date,
    })
}

/// Parse an upstream `YYYY-MM-DD` date, returning `None` when malformed.
pub fn parse_invoice_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Server-side filter parameters for an invoice listing.
///
/// Server-side filtering is a latency optimization only; callers must still
/// re-filter client-side.
#[derive(Debug, Clone, Default)]
pub struct InvoiceQuery {
    pub currency_code: Option<String>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub status: Option<String>,
}

/// Client for the accounting service's invoice endpoints.
pub struct BooksClient {
    gateway: ApiGateway,
    api_base: String,
    organization_id: Option<String>,
}

impl BooksClient {
    pub fn new(gateway: ApiGateway, organization_id: Option<String>) -> Self {
        Self {
            gateway,
            api_base: DEFAULT_API_BASE.to_string(),
            organization_id,
        }
    }

    /// Point the client at a different API host (tests, regional hosts).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    pub fn has_organization_id(&self) -> bool {
        self.organization_id.is_some()
    }

    fn organization_id(&self) -> Result<&str, TallybridgeError> {
        self.organization_id
            .as_deref()
            .ok_or_else(|| TallybridgeError::config("accounting organization id is not configured"))
    }

    /// List invoices, passing the query's filters through as upstream
    /// parameters when present.
    pub async fn list_invoices(
        &self,
        query: &InvoiceQuery,
    ) -> Result<Vec<RawInvoice>, TallybridgeError> {
        let org = self.organization_id()?;
        let mut request = UpstreamRequest::get(format!("{}/books/v3/invoices", self.api_base))
            .with_timeout(INVOICE_CALL_TIMEOUT)
            .with_query("organization_id", org);

        if let Some(currency) = query.currency_code.as_deref().filter(|c| !c.is_empty()) {
            request = request.with_query("currency_code", currency);
        }
        if let Some(start) = query.date_start {
            request = request.with_query("date_start", start.format("%Y-%m-%d").to_string());
        }
        if let Some(end) = query.date_end {
            request = request.with_query("date_end", end.format("%Y-%m-%d").to_string());
        }
        if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty() && *s != "all") {
            request = request.with_query("status", status);
        }

        let payload = self.gateway.send(request).await?;
        let invoices = payload
            .get("invoices")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));

        serde_json::from_value(invoices)
            .map_err(|e| TallybridgeError::validation(format!("malformed invoices payload: {}", e)))
    }

    /// Fetch a single invoice by its upstream ID.
    pub async fn get_invoice(&self, invoice_id: &str) -> Result<RawInvoice, TallybridgeError> {
        let org = self.organization_id()?;
        let request =
            UpstreamRequest::get(format!("{}/books/v3/invoices/{}", self.api_base, invoice_id))
                .with_timeout(INVOICE_CALL_TIMEOUT)
                .with_query("organization_id", org);

        let payload = self.gateway.send(request).await?;
        let invoice = payload.get("invoice").cloned().ok_or_else(|| {
            TallybridgeError::validation("invoice payload is missing the invoice object")
        })?;

        serde_json::from_value(invoice)
            .map_err(|e| TallybridgeError::validation(format!("malformed invoice payload: {}", e)))
    }

    /// List the organizations the credential can see.
    ///
    /// Returned raw; this exists to help an operator find the organization
    /// id to configure.
    pub async fn list_organizations(&self) -> Result<Value, TallybridgeError> {
        let request = UpstreamRequest::get(format!("{}/books/v3/organizations", self.api_base))
            .with_timeout(INVOICE_CALL_TIMEOUT);
        Ok(self.gateway.send(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(number: &str, status: &str, currency: &str, date: &str) -> RawInvoice {
        RawInvoice {
            invoice_number: Some(number.to_string()),
            status: Some(status.to_string()),
            currency_code: Some(currency.to_string()),
            date: Some(date.to_string()),
            ..RawInvoice::default()
        }
    }

    #[test]
    fn test_normalize_invoice() {
        let invoice = normalize_invoice(&raw("INV-001", "sent", "KES", "2024-03-05")).unwrap();
        assert_eq!(invoice.number, "INV-001");
        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert_eq!(invoice.currency, "KES");
        assert_eq!(invoice.date, NaiveDate::from_ymd_opt(2024, 3, 5));
    }

    #[test]
    fn test_normalize_invoice_missing_number() {
        let result = normalize_invoice(&RawInvoice::default());
        assert!(matches!(result, Err(TallybridgeError::Validation { .. })));

        let empty = RawInvoice {
            invoice_number: Some(String::new()),
            ..RawInvoice::default()
        };
        assert!(matches!(
            normalize_invoice(&empty),
            Err(TallybridgeError::Validation { .. })
        ));
    }

    #[test]
    fn test_normalize_invoice_bad_date_kept_as_none() {
        let invoice = normalize_invoice(&raw("INV-002", "paid", "USD", "05/03/2024")).unwrap();
        assert!(invoice.date.is_none());
    }

    #[test]
    fn test_normalize_invoice_unknown_status() {
        let invoice = normalize_invoice(&raw("INV-003", "partially_paid", "USD", "2024-01-01"))
            .unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Unknown);
    }

    #[test]
    fn test_raw_invoice_deserializes_sparse_payload() {
        let invoice: RawInvoice =
            serde_json::from_str(r#"{"invoice_number": "INV-9", "total": 120.5}"#).unwrap();
        assert_eq!(invoice.invoice_number.as_deref(), Some("INV-9"));
        assert_eq!(invoice.total, 120.5);
        assert_eq!(invoice.balance, 0.0);
        assert!(invoice.status.is_none());
    }
}
