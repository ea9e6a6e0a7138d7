//! Batch orchestration: dedup gate, website verification, contact cascade,
//! scoring, ranking and persistence.
//!
//! A batch is processed by a single worker, one record at a time. Failures
//! of any one record or collaborator never halt the batch; a missing store
//! only aborts the run when persistence is required.

use crate::cascade::{
    ContactCascade, ContactTier, DirectoryTier, LlmPageStrategy, LlmSettings, PageStrategy,
    RegexPageStrategy, WebSearchSettings, WebSearchTier,
};
use crate::config::Config;
use crate::errors::AppError;
use crate::extraction::CandidateExtractor;
use crate::matcher::IdentityMatcher;
use crate::models::{BlacklistSet, BusinessRecord, Lead, LeadStatus};
use crate::pacing::Pacer;
use crate::providers::{DirectoryProvider, LeadStore, PageFetcher, SearchProvider, TextGenerator};
use crate::retry::RetryPolicy;
use crate::rules::{CatalogRules, ScoringWeights};
use crate::scoring::{rank, LeadScorer, ScoreSignals};
use crate::services::{
    build_http_client, GeminiService, GoogleSearchService, HttpDirectory, HttpPageFetcher,
};
use crate::verifier::{VerifierSettings, WebsiteVerifier};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Ranked output is truncated to this many leads.
    pub output_limit: usize,
    /// Minimum delay between two identities.
    pub identity_delay: Duration,
    pub verify_websites: bool,
    pub enrich_emails: bool,
    /// A missing store aborts the run before any external call.
    pub require_store: bool,
    /// Stop processing new identities once this much time has passed.
    pub run_timeout: Option<Duration>,
    /// Reference date for recency scoring; today when unset.
    pub as_of: Option<NaiveDate>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            output_limit: 20,
            identity_delay: Duration::from_millis(1500),
            verify_websites: true,
            enrich_emails: true,
            require_store: false,
            run_timeout: None,
            as_of: None,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub received: usize,
    pub skipped_known: usize,
    pub with_website: usize,
    pub processed: usize,
    pub emails_found: usize,
    pub persisted: usize,
    /// Run stopped early on timeout or interrupt.
    pub interrupted: bool,
    /// Store could not be read or written.
    pub store_degraded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub leads: Vec<Lead>,
    pub stats: BatchStats,
}

pub struct LeadPipeline {
    verifier: WebsiteVerifier,
    cascade: ContactCascade,
    scorer: LeadScorer,
    store: Option<Arc<dyn LeadStore>>,
    settings: PipelineSettings,
}

impl LeadPipeline {
    pub fn new(
        verifier: WebsiteVerifier,
        cascade: ContactCascade,
        scorer: LeadScorer,
        store: Option<Arc<dyn LeadStore>>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            verifier,
            cascade,
            scorer,
            store,
            settings,
        }
    }

    /// Wires the HTTP collaborators configured in `config`. Missing
    /// credentials disable the dependent tier instead of failing.
    pub fn from_config(config: &Config, store: Option<Arc<dyn LeadStore>>) -> Result<Self, AppError> {
        let client = build_http_client().map_err(|e| AppError::InternalError(e.to_string()))?;
        let pacer = Arc::new(Pacer::new(config.request_pacing()));
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new(client.clone()));

        let search: Option<Arc<dyn SearchProvider>> =
            match (config.search_api_key.clone(), config.search_cx.clone()) {
                (Some(key), Some(cx)) => {
                    let service = GoogleSearchService::new(client.clone(), key, cx);
                    Some(Arc::new(service) as Arc<dyn SearchProvider>)
                }
                _ => {
                    tracing::warn!(
                        "Web search not configured; website checks rely on domain probes only"
                    );
                    None
                }
            };

        let generator: Option<Arc<dyn TextGenerator>> = match config.gemini_api_key.clone() {
            Some(key) => {
                let service = GeminiService::new(client, key, config.gemini_model.clone());
                Some(Arc::new(service) as Arc<dyn TextGenerator>)
            }
            None => {
                tracing::warn!("GEMINI_API_KEY not set; LLM extraction tier disabled");
                None
            }
        };

        let catalog = CatalogRules::norwegian();
        let extractor = Arc::new(CandidateExtractor::default());
        let matcher = Arc::new(IdentityMatcher::new(catalog.clone()));

        let directories = HttpDirectory::norwegian(fetcher.clone());
        let mut skip_hosts: Vec<String> = directories
            .iter()
            .map(|d: &Arc<dyn DirectoryProvider>| d.host().to_string())
            .collect();
        skip_hosts.push("gulesider.no".to_string());

        let mut strategies: Vec<Box<dyn PageStrategy>> = vec![Box::new(RegexPageStrategy::new(
            extractor.clone(),
            matcher.clone(),
        ))];
        if let Some(generator) = generator {
            strategies.push(Box::new(LlmPageStrategy::new(
                generator,
                RetryPolicy::text_generation(),
                extractor.clone(),
                matcher.clone(),
                LlmSettings::default(),
                pacer.clone(),
            )));
        }

        let tiers: Vec<Box<dyn ContactTier>> = vec![
            Box::new(DirectoryTier::new(
                directories,
                extractor,
                matcher,
                pacer.clone(),
            )),
            Box::new(WebSearchTier::new(
                search.clone(),
                fetcher.clone(),
                strategies,
                skip_hosts,
                WebSearchSettings::default(),
                pacer.clone(),
            )),
        ];
        let cascade = ContactCascade::new(tiers, config.request_pacing());

        let verifier = WebsiteVerifier::new(
            search,
            fetcher,
            catalog,
            VerifierSettings::default(),
            pacer,
        );

        let settings = PipelineSettings {
            output_limit: config.output_limit,
            identity_delay: config.identity_delay(),
            require_store: config.require_store,
            run_timeout: config.run_timeout(),
            ..PipelineSettings::default()
        };

        tracing::info!("✓ Pipeline ready with tiers {:?}", cascade.tier_names());
        Ok(Self::new(
            verifier,
            cascade,
            LeadScorer::new(ScoringWeights::norwegian()),
            store,
            settings,
        ))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Fails with `ConfigurationMissing` when persistence is required but no
    /// store is configured. Callers check this before sourcing records.
    pub fn ensure_store(&self) -> Result<(), AppError> {
        if self.settings.require_store && self.store.is_none() {
            return Err(AppError::ConfigurationMissing(
                "Lead store required but DATABASE_URL is not configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Processes `records` to completion and returns the ranked leads.
    pub async fn run_batch(&self, records: Vec<BusinessRecord>) -> Result<Vec<Lead>, AppError> {
        let (_keep_open, cancel) = watch::channel(false);
        Ok(self.run(records, cancel).await?.leads)
    }

    /// Processes `records` until done, the run timeout elapses or `cancel`
    /// turns `true`. Partial results are still ranked, returned and stored.
    pub async fn run(
        &self,
        records: Vec<BusinessRecord>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<BatchReport, AppError> {
        self.ensure_store()?;

        let started = Instant::now();
        let deadline = self.settings.run_timeout.map(|timeout| started + timeout);
        let today = self
            .settings
            .as_of
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let mut stats = BatchStats {
            received: records.len(),
            ..Default::default()
        };

        let mut blacklist = self.load_blacklist(&mut stats).await;
        tracing::info!(
            "=== Lead batch: {} records, {} known ids ===",
            records.len(),
            blacklist.len()
        );

        let mut leads = Vec::new();
        let mut first = true;
        for record in records {
            if !blacklist.insert(record.id.clone()) {
                tracing::debug!("Skipping known lead {} ({})", record.id, record.identity.name);
                stats.skipped_known += 1;
                continue;
            }

            if !first && !self.pause_between_identities(&mut cancel).await {
                stats.interrupted = true;
            }
            if stats.interrupted || is_cancelled(&cancel) || past(deadline) {
                tracing::warn!("Batch interrupted; keeping {} processed leads", leads.len());
                stats.interrupted = true;
                break;
            }
            first = false;

            stats.processed += 1;
            if let Some(lead) = self.process(record, today, &mut stats).await {
                leads.push(lead);
            }
        }

        let ranked = rank(leads, self.settings.output_limit);
        self.persist(&ranked, &mut stats).await;

        tracing::info!(
            "✓ Batch done in {:?}: {} leads ({} known, {} with website, {} emails found, {} stored)",
            started.elapsed(),
            ranked.len(),
            stats.skipped_known,
            stats.with_website,
            stats.emails_found,
            stats.persisted
        );
        Ok(BatchReport {
            leads: ranked,
            stats,
        })
    }

    async fn load_blacklist(&self, stats: &mut BatchStats) -> BlacklistSet {
        let Some(store) = self.store.as_ref() else {
            return BlacklistSet::new();
        };
        match store.existing_ids().await {
            Ok(ids) => BlacklistSet::from(ids),
            Err(e) => {
                if e.is_store_failure() {
                    tracing::warn!("Lead store unreachable, running without dedup: {}", e);
                } else {
                    tracing::error!("Reading known lead ids failed, running without dedup: {}", e);
                }
                stats.store_degraded = true;
                BlacklistSet::new()
            }
        }
    }

    /// Sleeps the identity delay; `false` when cancelled while waiting.
    async fn pause_between_identities(&self, cancel: &mut watch::Receiver<bool>) -> bool {
        if self.settings.identity_delay.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.settings.identity_delay) => true,
            changed = cancel.changed() => match changed {
                Ok(()) => !*cancel.borrow(),
                // Sender gone: nobody can cancel any more, finish the delay.
                Err(_) => {
                    tokio::time::sleep(self.settings.identity_delay).await;
                    true
                }
            },
        }
    }

    async fn process(
        &self,
        record: BusinessRecord,
        today: NaiveDate,
        stats: &mut BatchStats,
    ) -> Option<Lead> {
        let identity = &record.identity;

        if self.settings.verify_websites && !self.verifier.has_no_website(identity).await {
            stats.with_website += 1;
            return None;
        }

        let email = match record.known_email() {
            Some(known) => Some(known.to_lowercase()),
            None if self.settings.enrich_emails => {
                let found = self.cascade.discover(identity).await;
                if found.is_some() {
                    stats.emails_found += 1;
                }
                found.map(|candidate| candidate.raw_value)
            }
            None => None,
        };

        let signals = ScoreSignals {
            has_phone: record.has_phone(),
            has_email: email.is_some(),
            locale: identity.locale.clone(),
            registration_date: identity.registration_date,
            industry_code: identity.industry_code.clone(),
            rating: record.rating,
            review_count: record.review_count,
            has_website: false,
        };
        let potential_score = self.scorer.score(record.source, &signals, today);

        Some(Lead {
            id: record.id,
            name: identity.name.clone(),
            address: record.address,
            rating: record.rating.unwrap_or(0.0),
            user_rating_count: record.review_count.unwrap_or(0),
            industry: record.industry,
            phone: record.phone.unwrap_or_default(),
            email,
            locale: identity.locale.clone(),
            has_website: false,
            potential_score,
            info: record.info,
            source: record.source,
            status: LeadStatus::Pending,
            notes: record.notes,
        })
    }

    async fn persist(&self, leads: &[Lead], stats: &mut BatchStats) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if stats.store_degraded {
            tracing::warn!("Skipping persistence: lead store was unavailable at batch start");
            return;
        }
        if leads.is_empty() {
            return;
        }
        match store.upsert(leads).await {
            Ok(written) => stats.persisted = written,
            Err(e) => {
                tracing::warn!("Failed to persist {} leads: {}", leads.len(), e);
                stats.store_degraded = true;
            }
        }
    }
}

/// Keeps leads whose id is neither in `known` nor repeated earlier in
/// `leads`, recording the kept ids in `known`. Returns the kept leads and the
/// number skipped.
pub fn filter_new(leads: Vec<Lead>, known: &mut BlacklistSet) -> (Vec<Lead>, usize) {
    let total = leads.len();
    let fresh: Vec<Lead> = leads
        .into_iter()
        .filter(|lead| !lead.id.trim().is_empty() && known.insert(lead.id.clone()))
        .collect();
    let skipped = total - fresh.len();
    (fresh, skipped)
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow()
}

fn past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}
