//! Job-card applications built from accounting invoices.
//!
//! A job card is a work-order record tied to one invoice. Persistence of job
//! cards lives outside this crate; here we fetch the invoice through the
//! gateway and shape the application into a card.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::books::{BooksClient, RawInvoice};
use crate::error::TallybridgeError;

/// A caller's request to open a job card against an invoice.
#[derive(Debug, Clone, Deserialize)]
pub struct JobCardApplication {
    pub email: String,
    pub invoice_id: String,
    pub selected_items: Vec<SelectedItem>,
    pub notes: Option<String>,
}

/// One invoice line item the applicant selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedItem {
    pub name: Option<String>,
    #[serde(default)]
    pub rate: f64,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
}

fn default_quantity() -> f64 {
    1.0
}

/// A shaped job card, ready for the persistence layer.
#[derive(Debug, Clone, Serialize)]
pub struct JobCard {
    pub job_card_id: String,
    pub email: String,
    pub invoice_id: String,
    pub invoice_number: Option<String>,
    pub customer_name: Option<String>,
    pub selected_items: Vec<SelectedItem>,
    pub notes: Option<String>,
    pub total_selected_amount: f64,
    pub created_at: DateTime<Utc>,
    pub status: String,
}

/// Shape an application and its invoice into a job card.
pub fn build_job_card(
    application: JobCardApplication,
    invoice: &RawInvoice,
    created_at: DateTime<Utc>,
) -> JobCard {
    let total_selected_amount = application
        .selected_items
        .iter()
        .map(|item| item.rate * item.quantity)
        .sum();

    JobCard {
        job_card_id: format!(
            "JC-{}-{}",
            application.invoice_id,
            created_at.format("%Y%m%d%H%M%S")
        ),
        email: application.email,
        invoice_id: application.invoice_id,
        invoice_number: invoice.invoice_number.clone(),
        customer_name: invoice.customer_name.clone(),
        selected_items: application.selected_items,
        notes: application.notes,
        total_selected_amount,
        created_at,
        status: "pending".to_string(),
    }
}

/// Fetch the invoice behind an application and build the job card.
pub async fn apply(
    books: &BooksClient,
    application: JobCardApplication,
) -> Result<JobCard, TallybridgeError> {
    tracing::info!(
        "Processing job card application for invoice {}",
        application.invoice_id
    );
    let invoice = books.get_invoice(&application.invoice_id).await?;
    let card = build_job_card(application, &invoice, Utc::now());
    tracing::info!("Job card created: {}", card.job_card_id);
    Ok(card)
}
