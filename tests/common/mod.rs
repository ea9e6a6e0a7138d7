//! In-process fakes for the pipeline's collaborators.
//! Shared by the integration test binaries; not every binary uses every fake.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_lead_finder::cascade::{
    ContactCascade, ContactTier, DirectoryTier, LlmPageStrategy, LlmSettings, PageStrategy,
    RegexPageStrategy, WebSearchSettings, WebSearchTier,
};
use rust_lead_finder::errors::{AppError, ProviderError};
use rust_lead_finder::extraction::CandidateExtractor;
use rust_lead_finder::matcher::IdentityMatcher;
use rust_lead_finder::models::{
    BusinessIdentity, BusinessRecord, Lead, LeadSource, LeadStatus,
};
use rust_lead_finder::pacing::Pacer;
use rust_lead_finder::pipeline::{LeadPipeline, PipelineSettings};
use rust_lead_finder::providers::{
    DirectoryProvider, FetchedPage, LeadStore, PageFetcher, RecordSource, SearchProvider,
    TextGenerator,
};
use rust_lead_finder::retry::RetryPolicy;
use rust_lead_finder::rules::CatalogRules;
use rust_lead_finder::scoring::LeadScorer;
use rust_lead_finder::verifier::{VerifierSettings, WebsiteVerifier};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
}

// ============ Search ============

/// Returns the same ranked URLs for every query, or fails every query.
#[derive(Default)]
pub struct FakeSearch {
    results: Vec<String>,
    fail: bool,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn returning(urls: &[&str]) -> Self {
        Self {
            results: urls.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(ProviderError::TransientNetwork("search down".to_string()));
        }
        Ok(self.results.iter().take(max_results).cloned().collect())
    }
}

// ============ Pages ============

/// Serves canned pages and HEAD statuses; everything else is a network error.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, FetchedPage>,
    heads: HashMap<String, u16>,
    fetched: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchedPage {
                status: 200,
                body: body.to_string(),
            },
        );
        self
    }

    pub fn with_head(mut self, url: &str, status: u16) -> Self {
        self.heads.insert(url.to_string(), status);
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<FetchedPage, ProviderError> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ProviderError::TransientNetwork(format!("no route to {}", url)))
    }

    async fn head(&self, url: &str, _timeout: Duration) -> Result<u16, ProviderError> {
        self.heads
            .get(url)
            .copied()
            .ok_or_else(|| ProviderError::TransientNetwork(format!("no route to {}", url)))
    }
}

// ============ Directories ============

/// Directory returning fixed markup for every name, or failing.
pub struct FakeDirectory {
    host: String,
    markup: Option<String>,
    lookups: AtomicUsize,
}

impl FakeDirectory {
    pub fn with_markup(host: &str, markup: &str) -> Self {
        Self {
            host: host.to_string(),
            markup: Some(markup.to_string()),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn failing(host: &str) -> Self {
        Self {
            host: host.to_string(),
            markup: None,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryProvider for FakeDirectory {
    fn name(&self) -> &str {
        &self.host
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn lookup(&self, _name: &str, _locale: &str) -> Result<String, ProviderError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.markup
            .clone()
            .ok_or_else(|| ProviderError::Unavailable(format!("{} returned 503", self.host)))
    }
}

// ============ Text generation ============

pub enum Reply {
    Text(&'static str),
    RateLimited,
}

/// Answers every prompt the same way and counts calls.
pub struct FakeGenerator {
    reply: Reply,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn answering(text: &'static str) -> Self {
        Self {
            reply: Reply::Text(text),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn rate_limited() -> Self {
        Self {
            reply: Reply::RateLimited,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.reply {
            Reply::Text(text) => Ok(text.to_string()),
            Reply::RateLimited => Err(ProviderError::RateLimited),
        }
    }
}

// ============ Record sources ============

pub struct FakeRecords(pub Vec<BusinessRecord>);

#[async_trait]
impl RecordSource for FakeRecords {
    async fn fetch_records(&self, _today: NaiveDate) -> Result<Vec<BusinessRecord>, ProviderError> {
        Ok(self.0.clone())
    }
}

// ============ Lead store ============

/// In-memory lead store with the same write rules as the Postgres one.
#[derive(Default)]
pub struct MemoryStore {
    leads: Mutex<HashMap<String, Lead>>,
    pub fail_reads: bool,
    pub fail_writes: bool,
    upserts: AtomicUsize,
}

impl MemoryStore {
    pub fn with_ids(ids: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut leads = store.leads.lock().unwrap();
            for id in ids {
                leads.insert(id.to_string(), lead(id, 50, 0));
            }
        }
        store
    }

    pub fn unreadable() -> Self {
        Self {
            fail_reads: true,
            ..Default::default()
        }
    }

    pub fn unwritable() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn get(&self, id: &str) -> Option<Lead> {
        self.leads.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.leads.lock().unwrap().len()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn existing_ids(&self) -> Result<HashSet<String>, AppError> {
        if self.fail_reads {
            return Err(AppError::StoreUnavailable("connection refused".to_string()));
        }
        Ok(self.leads.lock().unwrap().keys().cloned().collect())
    }

    async fn upsert(&self, leads: &[Lead]) -> Result<usize, AppError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(AppError::StoreUnavailable("connection reset".to_string()));
        }
        let mut stored = self.leads.lock().unwrap();
        let mut written = 0;
        for lead in leads {
            match stored.get_mut(&lead.id) {
                Some(existing) if existing.status.is_terminal() => {}
                Some(existing) => {
                    let status = existing.status;
                    let notes = std::mem::take(&mut existing.notes);
                    let email = lead.email.clone().or_else(|| existing.email.take());
                    *existing = Lead {
                        status,
                        notes,
                        email,
                        ..lead.clone()
                    };
                    written += 1;
                }
                None => {
                    stored.insert(
                        lead.id.clone(),
                        Lead {
                            status: LeadStatus::Pending,
                            ..lead.clone()
                        },
                    );
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    async fn list(&self, status: Option<LeadStatus>, limit: i64) -> Result<Vec<Lead>, AppError> {
        let stored = self.leads.lock().unwrap();
        let mut leads: Vec<Lead> = stored
            .values()
            .filter(|l| status.map_or(true, |s| l.status == s))
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.potential_score.cmp(&a.potential_score));
        leads.truncate(limit.max(0) as usize);
        Ok(leads)
    }

    async fn set_status(
        &self,
        id: &str,
        status: LeadStatus,
        notes: Option<&str>,
    ) -> Result<(), AppError> {
        let mut stored = self.leads.lock().unwrap();
        let lead = stored
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;
        lead.status = status;
        if let Some(notes) = notes {
            lead.notes = notes.to_string();
        }
        Ok(())
    }
}

// ============ Builders ============

pub fn lead(id: &str, score: u8, reviews: u32) -> Lead {
    Lead {
        id: id.to_string(),
        name: format!("Firma {}", id),
        address: "Torget 1, 1383 ASKER".to_string(),
        rating: 0.0,
        user_rating_count: reviews,
        industry: "Annet".to_string(),
        phone: "+4741234567".to_string(),
        email: None,
        locale: "ASKER".to_string(),
        has_website: false,
        potential_score: score,
        info: String::new(),
        source: LeadSource::Registry,
        status: LeadStatus::Pending,
        notes: String::new(),
    }
}

pub fn registry_record(id: &str, name: &str, locale: &str) -> BusinessRecord {
    let mut record = BusinessRecord::new(
        id,
        BusinessIdentity::new(name, locale),
        LeadSource::Registry,
    );
    record.phone = Some("+4741234567".to_string());
    record.industry = "Annet".to_string();
    record
}

/// Collaborators for one pipeline; fakes are kept so tests can inspect them.
pub struct Collaborators {
    pub search: Option<Arc<FakeSearch>>,
    pub fetcher: Arc<FakeFetcher>,
    pub directories: Vec<Arc<dyn DirectoryProvider>>,
    pub generator: Option<Arc<FakeGenerator>>,
    pub skip_hosts: Vec<String>,
}

impl Collaborators {
    pub fn offline() -> Self {
        Self {
            search: None,
            fetcher: Arc::new(FakeFetcher::new()),
            directories: Vec::new(),
            generator: None,
            skip_hosts: vec!["gulesider.no".to_string()],
        }
    }

    pub fn verifier(&self) -> WebsiteVerifier {
        WebsiteVerifier::new(
            self.search
                .clone()
                .map(|s| s as Arc<dyn SearchProvider>),
            self.fetcher.clone(),
            CatalogRules::norwegian(),
            VerifierSettings::default(),
            Arc::new(Pacer::disabled()),
        )
    }

    pub fn cascade(&self, llm_attempts: u32) -> ContactCascade {
        let pacer = Arc::new(Pacer::disabled());
        let extractor = Arc::new(CandidateExtractor::default());
        let matcher = Arc::new(IdentityMatcher::new(CatalogRules::norwegian()));

        let mut strategies: Vec<Box<dyn PageStrategy>> = vec![Box::new(RegexPageStrategy::new(
            extractor.clone(),
            matcher.clone(),
        ))];
        if let Some(generator) = self.generator.clone() {
            strategies.push(Box::new(LlmPageStrategy::new(
                generator,
                RetryPolicy::immediate(llm_attempts),
                extractor.clone(),
                matcher.clone(),
                LlmSettings::default(),
                pacer.clone(),
            )));
        }

        let tiers: Vec<Box<dyn ContactTier>> = vec![
            Box::new(DirectoryTier::new(
                self.directories.clone(),
                extractor,
                matcher,
                pacer.clone(),
            )),
            Box::new(WebSearchTier::new(
                self.search
                    .clone()
                    .map(|s| s as Arc<dyn SearchProvider>),
                self.fetcher.clone(),
                strategies,
                self.skip_hosts.clone(),
                WebSearchSettings::default(),
                pacer,
            )),
        ];
        ContactCascade::new(tiers, Duration::ZERO)
    }

    pub fn pipeline(
        &self,
        store: Option<Arc<dyn LeadStore>>,
        settings: PipelineSettings,
    ) -> LeadPipeline {
        LeadPipeline::new(
            self.verifier(),
            self.cascade(3),
            LeadScorer::default(),
            store,
            settings,
        )
    }
}

/// No delays, scored as of [`today`].
pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        identity_delay: Duration::ZERO,
        as_of: Some(today()),
        ..PipelineSettings::default()
    }
}

/// A page whose visible text is long enough for the model tier.
pub fn contact_page(extra: &str) -> String {
    format!(
        "<html><head><title>Kontakt</title><script>var x = 1;</script></head><body>\
         <h1>Velkommen</h1><p>Vi er et lokalt firma med lang erfaring i Asker og Bærum. \
         Ta gjerne kontakt med oss for et uforpliktende tilbud på ditt neste prosjekt.</p>\
         <p>{}</p></body></html>",
        extra
    )
}
