//! # Tallybridge Core
//!
//! Token lifecycle management, a resilient outbound API gateway, and invoice
//! reconciliation between an accounting upstream and a file-storage
//! upstream.
//!
//! This crate provides:
//! - A per-service in-memory bearer token cache with transparent refresh
//! - The gateway protocol: get valid token, call, on 401 refresh once and
//!   retry, classify the result
//! - Upstream clients for the accounting and storage services
//! - The reconciler that diffs accounting invoice numbers against storage
//!   filenames, plus report rendering and best-effort mail delivery
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tallybridge_core::{
//!     ApiGateway, BooksClient, DriveClient, InvoiceReconciler,
//!     ReconcileFilter, ServiceCredential, ServiceId, TokenStore,
//! };
//!
//! async fn reconcile() -> Result<(), tallybridge_core::TallybridgeError> {
//!     let store = Arc::new(TokenStore::new());
//!     let token_url = "https://accounts.example.com/oauth/v2/token";
//!
//!     let books = BooksClient::new(
//!         ApiGateway::new(
//!             ServiceId::new("accounting-secondary"),
//!             ServiceCredential::new("id", "secret", "refresh"),
//!             token_url,
//!             store.clone(),
//!         ),
//!         Some("842000".to_string()),
//!     );
//!     let drive = DriveClient::new(
//!         ApiGateway::new(
//!             ServiceId::new("storage"),
//!             ServiceCredential::new("id", "secret", "refresh"),
//!             token_url,
//!             store,
//!         ),
//!         "folder-id",
//!     );
//!
//!     let result = InvoiceReconciler::new(books, drive)
//!         .check_invoices(&ReconcileFilter::new().with_currency("ksh"))
//!         .await?;
//!     println!("missing: {}", result.missing);
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod books;
pub mod drive;
pub mod error;
pub mod gateway;
pub mod jobcard;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod report;
pub mod secret;
pub mod token;

// Re-export commonly used types at crate root
pub use model::{
    InvoiceStatus,
    NormalizedInvoice,
    ReconcileFilter,
    ReconciliationResult,
    ServiceCredential,
    ServiceId,
};

pub use secret::Secret;

pub use token::{CachedToken, TokenStore, EXPIRY_MARGIN_SECS};

pub use gateway::{ApiGateway, GatewayError, TokenAcquirer, UpstreamRequest};

pub use books::{BooksClient, InvoiceQuery, RawInvoice};

pub use drive::{DriveClient, FileEntry};

pub use reconcile::{InvoiceReconciler, normalize_currency, parse_filter_date};

pub use notify::{MailError, Mailer, SmtpConfig, SmtpMailer};

pub use error::TallybridgeError;
