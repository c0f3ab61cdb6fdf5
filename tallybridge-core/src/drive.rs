//! Storage (WorkDrive) upstream client.
//!
//! Fetches the configured folder's file listing through the gateway and
//! extracts candidate invoice numbers from filenames.

use serde_json::Value;
use std::time::Duration;

use crate::error::TallybridgeError;
use crate::gateway::{ApiGateway, UpstreamRequest};

/// Default API host for the storage service.
pub const DEFAULT_API_BASE: &str = "https://www.zohoapis.com";

/// JSON:API media type the storage service speaks.
const JSON_API_ACCEPT: &str = "application/vnd.api+json";

const DRIVE_CALL_TIMEOUT: Duration = Duration::from_secs(20);

/// One entry in a folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub is_folder: bool,
}

/// Client for the storage service's folder endpoints.
pub struct DriveClient {
    gateway: ApiGateway,
    api_base: String,
    folder_id: String,
}

impl DriveClient {
    pub fn new(gateway: ApiGateway, folder_id: impl Into<String>) -> Self {
        Self {
            gateway,
            api_base: DEFAULT_API_BASE.to_string(),
            folder_id: folder_id.into(),
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

    /// List the files in the configured folder.
    ///
    /// The folder document points at its file listing through
    /// `data.relationships.files.links.related`; a folder without that link
    /// simply has no files.
    pub async fn list_folder_files(&self) -> Result<Vec<FileEntry>, TallybridgeError> {
        let folder_request = UpstreamRequest::get(format!(
            "{}/workdrive/api/v1/files/{}",
            self.api_base, self.folder_id
        ))
        .with_accept(JSON_API_ACCEPT)
        .with_timeout(DRIVE_CALL_TIMEOUT);

        let folder = self.gateway.send(folder_request).await?;

        let related = folder
            .pointer("/data/relationships/files/links/related")
            .and_then(Value::as_str);
        let Some(related) = related else {
            return Ok(Vec::new());
        };

        let files_request = UpstreamRequest::get(related)
            .with_accept(JSON_API_ACCEPT)
            .with_timeout(DRIVE_CALL_TIMEOUT);
        let listing = self.gateway.send(files_request).await?;

        let mut entries = Vec::new();
        if let Some(items) = listing.get("data").and_then(Value::as_array) {
            for item in items {
                let attributes = item.get("attributes");
                let name = attributes
                    .and_then(|a| a.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let is_folder = attributes
                    .and_then(|a| a.get("is_folder"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                entries.push(FileEntry {
                    name: name.to_string(),
                    is_folder,
                });
            }
        }
        tracing::debug!("Folder {} listed {} entries", self.folder_id, entries.len());
        Ok(entries)
    }

    /// Candidate invoice numbers extracted from the folder's non-folder
    /// filenames.
    pub async fn invoice_numbers(&self) -> Result<Vec<String>, TallybridgeError> {
        let numbers = self
            .list_folder_files()
            .await?
            .into_iter()
            .filter(|entry| !entry.is_folder)
            .filter_map(|entry| extract_invoice_number(&entry.name))
            .collect();
        Ok(numbers)
    }
}

/// Extract a candidate invoice number from a filename.
///
/// Finds the first case-insensitive "INV" and takes the text up to the next
/// "." (or end of string), trimmed. The search uppercases but the extracted
/// substring keeps the original casing, so comparisons downstream stay
/// case-sensitive.
pub fn extract_invoice_number(name: &str) -> Option<String> {
    let upper = name.to_ascii_uppercase();
    let start = upper.find("INV")?;
    let end = name[start..]
        .find('.')
        .map(|i| start + i)
        .unwrap_or(name.len());
    let number = name[start..end].trim();
    if number.is_empty() {
        None
    } else {
        Some(number.to_string())
    }
}
