//! Domain model types for Tallybridge.
//!
//! This module defines the core types used throughout the crate:
//! - [`ServiceId`] - Identifier for an upstream service
//! - [`ServiceCredential`] - OAuth refresh-token credentials for one upstream
//! - [`InvoiceStatus`] / [`NormalizedInvoice`] - Normalized accounting data
//! - [`ReconcileFilter`] / [`ReconciliationResult`] - Reconciliation I/O

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::secret::Secret;

/// Identifier for an upstream service (e.g., "accounting-primary", "storage").
///
/// Service IDs should be lowercase and use hyphens for multi-word names.
/// Each ID owns exactly one entry in the token store; gateways never share
/// tokens across services even when credentials target the same
/// authorization server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(String);

impl ServiceId {
    /// Create a new service ID.
    ///
    /// The ID is normalized to lowercase.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().to_lowercase())
    }

    /// Get the service ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ServiceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Refresh-token credentials for one upstream service.
///
/// Loaded once at startup and read-only to the gateway afterwards.
#[derive(Debug, Clone)]
pub struct ServiceCredential {
    /// OAuth client ID.
    pub client_id: String,

    /// OAuth client secret.
    pub client_secret: Secret,

    /// Long-lived refresh token used to mint access tokens.
    pub refresh_token: Secret,

    /// Registered redirect URI (unused by the refresh grant, kept for parity
    /// with the console configuration).
    pub redirect_uri: Option<String>,

    /// Organization the credential is scoped to, when the upstream requires
    /// one.
    pub organization_id: Option<String>,
}

impl ServiceCredential {
    /// Create a credential from the three required fields.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<Secret>,
        refresh_token: impl Into<Secret>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            redirect_uri: None,
            organization_id: None,
        }
    }

    /// Set the redirect URI.
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Set the organization ID.
    pub fn with_organization_id(mut self, id: impl Into<String>) -> Self {
        self.organization_id = Some(id.into());
        self
    }
}

/// Lifecycle state of an accounting invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Sent,
    Unpaid,
    Overdue,
    Paid,
    Cancelled,
    Unknown,
}

impl InvoiceStatus {
    /// Map a raw upstream status string into the enum.
    ///
    /// Anything the upstream reports that we do not model maps to `Unknown`
    /// rather than failing the whole listing.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "sent" => Self::Sent,
            "unpaid" => Self::Unpaid,
            "overdue" => Self::Overdue,
            "paid" => Self::Paid,
            "cancelled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    /// Get the status as a string for display and serialization keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Unpaid => "unpaid",
            Self::Overdue => "overdue",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An accounting invoice reduced to the fields reconciliation needs.
///
/// Derived from raw upstream JSON; exists only for the duration of one
/// reconciliation call.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedInvoice {
    /// Invoice number as reported by the accounting service.
    pub number: String,

    /// Normalized lifecycle status.
    pub status: InvoiceStatus,

    /// Currency code (empty when the upstream omitted it).
    pub currency: String,

    /// Invoice date. `None` when absent or unparseable; such invoices are
    /// kept by date filtering, not dropped.
    pub date: Option<NaiveDate>,
}

/// Caller-supplied filter for one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReconcileFilter {
    /// Currency selector, in whatever spelling the caller used
    /// (normalized internally).
    pub currency: Option<String>,

    /// Requested status buckets ("paid", "overdue", "unpaid"). Empty keeps
    /// every invoice that passed currency/date filtering.
    pub statuses: Vec<String>,

    /// Recipient for the optional HTML report email.
    pub email: Option<String>,

    /// Inclusive lower date bound.
    pub date_from: Option<NaiveDate>,

    /// Inclusive upper date bound.
    pub date_to: Option<NaiveDate>,
}

impl ReconcileFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_statuses(mut self, statuses: Vec<String>) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_date_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }
}

/// Outcome of one reconciliation run. Immutable once returned.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    /// Normalized currency code the run filtered on (empty for all).
    pub currency: String,

    /// Status buckets the run filtered on.
    pub statuses: Vec<String>,

    /// Invoices that survived filtering on the accounting side.
    pub books_count: usize,

    /// Candidate invoice numbers extracted from storage filenames.
    pub file_count: usize,

    /// Accounting invoice numbers also present in storage.
    pub matched: usize,

    /// Accounting invoice numbers absent from storage.
    pub missing: usize,

    /// The full missing list, in accounting iteration order. Never truncated
    /// here; only the rendered report caps it.
    pub missing_list: Vec<String>,

    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,

    /// Whether the report email was handed off successfully. Delivery
    /// failure never fails the run.
    pub email_sent: bool,
}
