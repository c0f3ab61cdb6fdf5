//! End-to-end reconciliation tests against mocked upstreams.
//!
//! Both upstream services (accounting and storage) are served by one mock
//! server with distinct paths; each gateway still acquires its own token.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tallybridge_core::{
    ApiGateway, BooksClient, DriveClient, InvoiceReconciler, MailError, Mailer, ReconcileFilter,
    ServiceCredential, ServiceId, TallybridgeError, TokenStore,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct RecordingMailer {
    sent: Mutex<Vec<(Vec<String>, String, String)>>,
}

impl RecordingMailer {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_email(
        &self,
        recipients: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<(), MailError> {
        self.sent.lock().unwrap().push((
            recipients.to_vec(),
            subject.to_string(),
            html_body.to_string(),
        ));
        Ok(())
    }
}

struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send_email(&self, _: &[String], _: &str, _: &str) -> Result<(), MailError> {
        Err(MailError::Delivery {
            message: "smtp unreachable".to_string(),
        })
    }
}

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "test-token",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

async fn mount_invoices(server: &MockServer, invoices: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/books/v3/invoices"))
        .and(query_param("organization_id", "842000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 0,
            "message": "success",
            "invoices": invoices,
        })))
        .mount(server)
        .await;
}

async fn mount_folder(server: &MockServer, file_names: &[(&str, bool)]) {
    Mock::given(method("GET"))
        .and(path("/workdrive/api/v1/files/folder-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "relationships": {
                    "files": {
                        "links": {
                            "related": format!("{}/folder-1/files", server.uri()),
                        }
                    }
                }
            }
        })))
        .mount(server)
        .await;

    let entries: Vec<serde_json::Value> = file_names
        .iter()
        .map(|(name, is_folder)| {
            serde_json::json!({"attributes": {"name": name, "is_folder": is_folder}})
        })
        .collect();

    Mock::given(method("GET"))
        .and(path("/folder-1/files"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": entries})),
        )
        .mount(server)
        .await;
}

fn reconciler(server: &MockServer, organization_id: Option<&str>) -> InvoiceReconciler {
    let store = Arc::new(TokenStore::new());
    let token_url = format!("{}/oauth/v2/token", server.uri());

    let books = BooksClient::new(
        ApiGateway::new(
            ServiceId::new("accounting-secondary"),
            ServiceCredential::new("books-id", "books-secret", "books-refresh"),
            token_url.clone(),
            store.clone(),
        ),
        organization_id.map(str::to_string),
    )
    .with_api_base(server.uri());

    let drive = DriveClient::new(
        ApiGateway::new(
            ServiceId::new("storage"),
            ServiceCredential::new("drive-id", "drive-secret", "drive-refresh"),
            token_url,
            store,
        ),
        "folder-1",
    )
    .with_api_base(server.uri());

    InvoiceReconciler::new(books, drive)
}

fn invoice(number: &str, status: &str, currency: &str, date: &str) -> serde_json::Value {
    serde_json::json!({
        "invoice_number": number,
        "status": status,
        "currency_code": currency,
        "date": date,
    })
}

#[tokio::test]
async fn test_matched_and_missing_sets() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    mount_invoices(
        &server,
        serde_json::json!([
            invoice("INV-A", "sent", "KES", "2024-01-01"),
            invoice("INV-B", "paid", "KES", "2024-01-02"),
            invoice("INV-C", "overdue", "KES", "2024-01-03"),
        ]),
    )
    .await;
    mount_folder(
        &server,
        &[
            ("INV-A.pdf", false),
            ("scans", true),
            ("INV-C.pdf", false),
            ("receipt_2024.txt", false),
        ],
    )
    .await;

    let result = reconciler(&server, Some("842000"))
        .check_invoices(&ReconcileFilter::new())
        .await
        .unwrap();

    assert_eq!(result.books_count, 3);
    assert_eq!(result.file_count, 2);
    assert_eq!(result.matched, 2);
    assert_eq!(result.missing, 1);
    assert_eq!(result.missing_list, vec!["INV-B".to_string()]);
    assert!(!result.email_sent);
}

#[tokio::test]
async fn test_status_filter_unpaid_selects_sent_and_unpaid() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    mount_invoices(
        &server,
        serde_json::json!([
            invoice("INV-1", "paid", "KES", "2024-01-01"),
            invoice("INV-2", "sent", "KES", "2024-01-02"),
            invoice("INV-3", "overdue", "KES", "2024-01-03"),
            invoice("INV-4", "unpaid", "KES", "2024-01-04"),
        ]),
    )
    .await;
    mount_folder(&server, &[("INV-2.pdf", false)]).await;

    let filter = ReconcileFilter::new().with_statuses(vec!["unpaid".to_string()]);
    let result = reconciler(&server, Some("842000"))
        .check_invoices(&filter)
        .await
        .unwrap();

    assert_eq!(result.books_count, 2);
    assert_eq!(result.matched, 1);
    assert_eq!(result.missing_list, vec!["INV-4".to_string()]);
}

#[tokio::test]
async fn test_currency_filter_normalizes_and_refilters() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    // The upstream ignores our currency_code parameter and returns a mixed
    // listing; the client-side filter must still apply.
    mount_invoices(
        &server,
        serde_json::json!([
            invoice("INV-KES", "sent", "KES", "2024-01-01"),
            invoice("INV-USD", "sent", "USD", "2024-01-02"),
        ]),
    )
    .await;
    mount_folder(&server, &[("INV-KES.pdf", false)]).await;

    let filter = ReconcileFilter::new().with_currency("ksh");
    let result = reconciler(&server, Some("842000"))
        .check_invoices(&filter)
        .await
        .unwrap();

    assert_eq!(result.currency, "KES");
    assert_eq!(result.books_count, 1);
    assert_eq!(result.matched, 1);
    assert_eq!(result.missing, 0);
}

#[tokio::test]
async fn test_date_filter_keeps_unparseable_dates() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    mount_invoices(
        &server,
        serde_json::json!([
            invoice("INV-IN", "sent", "KES", "2024-06-15"),
            invoice("INV-OUT", "sent", "KES", "2024-01-15"),
            invoice("INV-ODD", "sent", "KES", "15/06/2024"),
        ]),
    )
    .await;
    mount_folder(&server, &[("none.pdf", false)]).await;

    let filter = ReconcileFilter::new().with_date_range(
        chrono::NaiveDate::from_ymd_opt(2024, 6, 1),
        chrono::NaiveDate::from_ymd_opt(2024, 6, 30),
    );
    let result = reconciler(&server, Some("842000"))
        .check_invoices(&filter)
        .await
        .unwrap();

    // INV-OUT is dropped; INV-ODD's date is unparseable and therefore kept.
    assert_eq!(result.books_count, 2);
    assert_eq!(
        result.missing_list,
        vec!["INV-IN".to_string(), "INV-ODD".to_string()]
    );
}

#[tokio::test]
async fn test_missing_organization_id_is_config_error() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;

    let result = reconciler(&server, None)
        .check_invoices(&ReconcileFilter::new())
        .await;

    assert!(matches!(result, Err(TallybridgeError::Config { .. })));
}

#[tokio::test]
async fn test_report_email_sent_with_recipient_and_files() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    mount_invoices(
        &server,
        serde_json::json!([
            invoice("INV-A", "sent", "KES", "2024-01-01"),
            invoice("INV-B", "sent", "KES", "2024-01-02"),
        ]),
    )
    .await;
    mount_folder(&server, &[("INV-A.pdf", false)]).await;

    let mailer = Arc::new(RecordingMailer::new());
    let filter = ReconcileFilter::new().with_email("finance@example.com");
    let result = reconciler(&server, Some("842000"))
        .with_mailer(mailer.clone())
        .check_invoices(&filter)
        .await
        .unwrap();

    assert!(result.email_sent);
    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (recipients, subject, body) = &sent[0];
    assert_eq!(recipients, &vec!["finance@example.com".to_string()]);
    assert!(subject.contains("Tallybridge"));
    assert!(body.contains("INV-B"));
}

#[tokio::test]
async fn test_no_email_when_storage_listing_empty() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    mount_invoices(
        &server,
        serde_json::json!([invoice("INV-A", "sent", "KES", "2024-01-01")]),
    )
    .await;
    // A folder document without a related link means no files.
    Mock::given(method("GET"))
        .and(path("/workdrive/api/v1/files/folder-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"relationships": {}}
        })))
        .mount(&server)
        .await;

    let mailer = Arc::new(RecordingMailer::new());
    let filter = ReconcileFilter::new().with_email("finance@example.com");
    let result = reconciler(&server, Some("842000"))
        .with_mailer(mailer.clone())
        .check_invoices(&filter)
        .await
        .unwrap();

    assert_eq!(result.file_count, 0);
    assert!(!result.email_sent);
    assert!(mailer.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_mail_failure_does_not_fail_the_call() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    mount_invoices(
        &server,
        serde_json::json!([invoice("INV-A", "sent", "KES", "2024-01-01")]),
    )
    .await;
    mount_folder(&server, &[("INV-A.pdf", false)]).await;

    let filter = ReconcileFilter::new().with_email("finance@example.com");
    let result = reconciler(&server, Some("842000"))
        .with_mailer(Arc::new(FailingMailer))
        .check_invoices(&filter)
        .await
        .unwrap();

    assert!(!result.email_sent);
    assert_eq!(result.matched, 1);
}

#[tokio::test]
async fn test_idempotent_for_unchanged_upstreams() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    mount_invoices(
        &server,
        serde_json::json!([
            invoice("INV-A", "sent", "KES", "2024-01-01"),
            invoice("INV-B", "paid", "KES", "2024-01-02"),
        ]),
    )
    .await;
    mount_folder(&server, &[("INV-A.pdf", false)]).await;

    let reconciler = reconciler(&server, Some("842000"));
    let first = reconciler.check_invoices(&ReconcileFilter::new()).await.unwrap();
    let second = reconciler.check_invoices(&ReconcileFilter::new()).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn test_upstream_failure_identifies_service() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    mount_invoices(&server, serde_json::json!([])).await;

    // Storage folder endpoint fails; the error must name the storage
    // service, not the accounting one.
    Mock::given(method("GET"))
        .and(path("/workdrive/api/v1/files/folder-1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let result = reconciler(&server, Some("842000"))
        .check_invoices(&ReconcileFilter::new())
        .await;

    match result {
        Err(TallybridgeError::Gateway(e)) => {
            assert!(e.to_string().contains("storage"));
            assert!(e.to_string().contains("503"));
        }
        other => panic!("expected gateway error, got {:?}", other.map(|_| ())),
    }
}
