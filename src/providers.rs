//! Capabilities the core consumes. HTTP-backed implementations live in
//! `services` and `db_storage`; tests provide in-process fakes.

use crate::errors::{AppError, ProviderError};
use crate::models::{BusinessRecord, Lead, LeadStatus};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::time::Duration;

/// General web search.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Result URLs in rank order, at most `max_results`.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, ProviderError>;
}

/// A fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Raw page access.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchedPage, ProviderError>;

    /// Header-only request following redirects; returns the final status.
    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, ProviderError>;
}

/// A structured business directory searchable by name.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    /// Short identifier used for logging and pacing.
    fn name(&self) -> &str;

    /// Host serving the directory; its URLs are skipped in web search results.
    fn host(&self) -> &str;

    /// Result-page markup for `name` (optionally narrowed by `locale`).
    async fn lookup(&self, name: &str, locale: &str) -> Result<String, ProviderError>;
}

/// External text-generation model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// A provider of candidate business records (place search, company registry).
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Candidate records as of `today`, already stripped of businesses the
    /// provider itself lists with a website.
    async fn fetch_records(&self, today: NaiveDate) -> Result<Vec<BusinessRecord>, ProviderError>;
}

/// Persistent lead store used as the dedup key-value service.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Ids of every lead the store has ever accepted.
    async fn existing_ids(&self) -> Result<HashSet<String>, AppError>;

    /// Inserts new leads and refreshes pipeline-owned fields of existing ones.
    /// Never changes `status` or `notes`, and never touches a lead whose
    /// status is terminal. Returns the number of rows written.
    async fn upsert(&self, leads: &[Lead]) -> Result<usize, AppError>;

    /// Highest-scoring leads first, optionally filtered by status.
    async fn list(&self, status: Option<LeadStatus>, limit: i64) -> Result<Vec<Lead>, AppError>;

    /// Human review update. Returns `NotFound` for unknown ids.
    async fn set_status(
        &self,
        id: &str,
        status: LeadStatus,
        notes: Option<&str>,
    ) -> Result<(), AppError>;
}
