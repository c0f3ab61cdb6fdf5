//! Tallybridge CLI
//!
//! Command-line interface for the invoice backend: reconciliation between
//! the accounting and storage services, invoice listing, analytics, and job
//! cards.
//!
//! # Usage
//!
//! ```bash
//! # Reconcile unpaid KES invoices against the scanned-files folder
//! tallybridge check-invoices --currency ksh --status unpaid
//!
//! # Same, mailing the report
//! tallybridge check-invoices --status unpaid --email finance@example.com
//!
//! # Analytics overview
//! tallybridge analytics
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use tallybridge_core::{
    analytics, jobcard, parse_filter_date, ApiGateway, BooksClient, DriveClient,
    InvoiceReconciler, InvoiceQuery, ReconcileFilter, ServiceId, SmtpMailer, TokenStore,
};

mod config;

use config::{AppConfig, CredentialConfig};

#[derive(Parser)]
#[command(name = "tallybridge")]
#[command(about = "Invoice reconciliation between accounting and file storage")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile accounting invoices against scanned files in storage
    CheckInvoices {
        /// Currency filter (e.g. ksh, usd, KES)
        #[arg(long)]
        currency: Option<String>,

        /// Status bucket to include (paid, unpaid, overdue); repeatable
        #[arg(long)]
        status: Vec<String>,

        /// Email the report to this address
        #[arg(long)]
        email: Option<String>,

        /// Earliest invoice date (YYYY-MM-DD)
        #[arg(long)]
        date_from: Option<String>,

        /// Latest invoice date (YYYY-MM-DD)
        #[arg(long)]
        date_to: Option<String>,
    },

    /// List invoices from the accounting service
    Invoices {
        /// Status filter passed to the upstream (e.g. sent, paid, overdue)
        #[arg(long)]
        status: Option<String>,
    },

    /// Fetch a single invoice by ID
    Invoice {
        /// Accounting-side invoice ID
        id: String,
    },

    /// List organizations visible to the accounting credential
    Organizations,

    /// Revenue and status overview across all invoices
    Analytics,

    /// Invoices awaiting payment that fall due soon
    UpcomingDue {
        /// Horizon in days from today
        #[arg(long, default_value_t = 7)]
        days: i64,
    },

    /// Open a job card against an invoice
    JobCard {
        /// Accounting-side invoice ID
        invoice_id: String,

        /// Applicant email address
        #[arg(long)]
        email: String,

        /// Selected line items as a JSON array
        /// (e.g. '[{"name":"Repair","rate":1500,"quantity":2}]')
        #[arg(long, default_value = "[]")]
        items: String,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Report token validity and configuration health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::CheckInvoices {
            currency,
            status,
            email,
            date_from,
            date_to,
        } => check_invoices(&config, currency, status, email, date_from, date_to).await,
        Commands::Invoices { status } => list_invoices(&config, status).await,
        Commands::Invoice { id } => get_invoice(&config, &id).await,
        Commands::Organizations => list_organizations(&config).await,
        Commands::Analytics => analytics_overview(&config).await,
        Commands::UpcomingDue { days } => upcoming_due(&config, days).await,
        Commands::JobCard {
            invoice_id,
            email,
            items,
            notes,
        } => open_job_card(&config, invoice_id, email, &items, notes).await,
        Commands::Health => health(&config).await,
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

fn books_client(
    credential: &CredentialConfig,
    service: &str,
    store: Arc<TokenStore>,
) -> BooksClient {
    let gateway = ApiGateway::new(
        ServiceId::new(service),
        credential.to_credential(),
        credential.token_url.clone(),
        store,
    );
    BooksClient::new(gateway, credential.organization_id.clone())
        .with_api_base(credential.api_base.clone())
}

fn drive_client(config: &AppConfig, store: Arc<TokenStore>) -> DriveClient {
    let storage = &config.storage;
    let gateway = ApiGateway::new(
        ServiceId::new("storage"),
        storage.credential.to_credential(),
        storage.credential.token_url.clone(),
        store,
    );
    DriveClient::new(gateway, storage.scanned_folder_id.clone())
        .with_api_base(storage.credential.api_base.clone())
}

fn parse_date_arg(raw: Option<String>) -> Result<Option<NaiveDate>> {
    match raw {
        Some(raw) => Ok(Some(parse_filter_date(&raw)?)),
        None => Ok(None),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn check_invoices(
    config: &AppConfig,
    currency: Option<String>,
    statuses: Vec<String>,
    email: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
) -> Result<()> {
    let store = Arc::new(TokenStore::new());
    let books = books_client(
        config.reconcile_accounting(),
        "accounting-secondary",
        store.clone(),
    );
    let drive = drive_client(config, store);

    let mut reconciler = InvoiceReconciler::new(books, drive);
    if let Some(mail) = &config.mail {
        reconciler = reconciler.with_mailer(Arc::new(SmtpMailer::new(mail.clone())));
    }

    let mut filter = ReconcileFilter::new()
        .with_statuses(statuses)
        .with_date_range(parse_date_arg(date_from)?, parse_date_arg(date_to)?);
    if let Some(currency) = currency {
        filter = filter.with_currency(currency);
    }
    if let Some(email) = email {
        filter = filter.with_email(email);
    }

    let result = reconciler.check_invoices(&filter).await?;
    print_json(&result)
}

async fn list_invoices(config: &AppConfig, status: Option<String>) -> Result<()> {
    let books = books_client(&config.accounting, "accounting", Arc::new(TokenStore::new()));
    let query = InvoiceQuery {
        status,
        ..Default::default()
    };
    let invoices = books.list_invoices(&query).await?;
    info!("Fetched {} invoices", invoices.len());
    print_json(&invoices)
}

async fn get_invoice(config: &AppConfig, id: &str) -> Result<()> {
    let books = books_client(&config.accounting, "accounting", Arc::new(TokenStore::new()));
    let invoice = books.get_invoice(id).await?;
    print_json(&invoice)
}

async fn list_organizations(config: &AppConfig) -> Result<()> {
    let books = books_client(&config.accounting, "accounting", Arc::new(TokenStore::new()));
    let organizations = books.list_organizations().await?;
    print_json(&organizations)
}

async fn analytics_overview(config: &AppConfig) -> Result<()> {
    let books = books_client(&config.accounting, "accounting", Arc::new(TokenStore::new()));
    let invoices = books.list_invoices(&InvoiceQuery::default()).await?;
    let overview = analytics::overview(&invoices);
    print_json(&overview)
}

async fn upcoming_due(config: &AppConfig, days: i64) -> Result<()> {
    let books = books_client(&config.accounting, "accounting", Arc::new(TokenStore::new()));
    let invoices = books.list_invoices(&InvoiceQuery::default()).await?;
    let upcoming = analytics::upcoming_due(&invoices, Utc::now().date_naive(), days);
    print_json(&upcoming)
}

async fn open_job_card(
    config: &AppConfig,
    invoice_id: String,
    email: String,
    items: &str,
    notes: Option<String>,
) -> Result<()> {
    let selected_items =
        serde_json::from_str(items).context("Failed to parse --items as a JSON array")?;
    let application = jobcard::JobCardApplication {
        email,
        invoice_id,
        selected_items,
        notes,
    };

    let books = books_client(&config.accounting, "accounting", Arc::new(TokenStore::new()));
    let card = jobcard::apply(&books, application).await?;
    print_json(&card)
}

async fn health(config: &AppConfig) -> Result<()> {
    let snapshot = health_snapshot(config).await;
    print_json(&snapshot)
}

/// Attempt a token exchange for one credential and report whether it held.
async fn credential_token_valid(
    credential: &CredentialConfig,
    service: &str,
    store: Arc<TokenStore>,
) -> bool {
    let gateway = ApiGateway::new(
        ServiceId::new(service),
        credential.to_credential(),
        credential.token_url.clone(),
        store,
    );
    match gateway.verify_token().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Token check failed for {}: {}", service, e);
            false
        }
    }
}

/// Health snapshot: a live token exchange per configured credential plus
/// configuration completeness.
async fn health_snapshot(config: &AppConfig) -> serde_json::Value {
    let store = Arc::new(TokenStore::new());

    let accounting_ok =
        credential_token_valid(&config.accounting, "accounting", store.clone()).await;
    let secondary_ok = match &config.accounting_secondary {
        Some(credential) => {
            Some(credential_token_valid(credential, "accounting-secondary", store.clone()).await)
        }
        None => None,
    };
    let storage_ok =
        credential_token_valid(&config.storage.credential, "storage", store).await;

    let all_ok = accounting_ok && storage_ok && secondary_ok.unwrap_or(true);
    serde_json::json!({
        "status": if all_ok { "ok" } else { "degraded" },
        "timestamp": Utc::now().to_rfc3339(),
        "accounting_token_valid": accounting_ok,
        "accounting_secondary_token_valid": secondary_ok,
        "storage_token_valid": storage_ok,
        "storage_folder_configured": !config.storage.scanned_folder_id.is_empty(),
        "mail_configured": config.mail.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_with_token_url(url: &str) -> AppConfig {
        toml::from_str(&format!(
            r#"
            [accounting]
            client_id = "id"
            client_secret = "secret"
            refresh_token = "refresh"
            token_url = "{url}"

            [storage]
            client_id = "id"
            client_secret = "secret"
            refresh_token = "refresh"
            token_url = "{url}"
            scanned_folder_id = "folder-1"
            "#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_health_snapshot_reports_token_validity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;

        let config = config_with_token_url(&format!("{}/token", server.uri()));
        let snapshot = health_snapshot(&config).await;

        assert_eq!(snapshot["status"], "ok");
        assert_eq!(snapshot["accounting_token_valid"], true);
        assert_eq!(snapshot["storage_token_valid"], true);
        // No secondary credential configured.
        assert!(snapshot["accounting_secondary_token_valid"].is_null());
        assert_eq!(snapshot["storage_folder_configured"], true);
        assert_eq!(snapshot["mail_configured"], false);
        assert!(snapshot["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_health_snapshot_degraded_on_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
            })))
            .mount(&server)
            .await;

        let config = config_with_token_url(&format!("{}/token", server.uri()));
        let snapshot = health_snapshot(&config).await;

        assert_eq!(snapshot["status"], "degraded");
        assert_eq!(snapshot["accounting_token_valid"], false);
        assert_eq!(snapshot["storage_token_valid"], false);
    }
}
