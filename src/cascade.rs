/// Contact discovery cascade.
///
/// An ordered list of tiers, cheapest and most reliable first:
/// 1. Directory: `mailto:` links on structured directory result pages
/// 2. Web: search results fetched page by page; on each page a regex pass,
///    then (only if the regex pass found nothing) an LLM pass
///
/// The first tier that yields an accepted email ends the cascade. Every
/// external failure is contained in the tier that hit it.
use crate::errors::ProviderError;
use crate::extraction::{first_email_in, page_text, CandidateExtractor};
use crate::matcher::IdentityMatcher;
use crate::models::{BusinessIdentity, ContactCandidate, SourceTier};
use crate::pacing::{host_of, Pacer};
use crate::providers::{DirectoryProvider, PageFetcher, SearchProvider, TextGenerator};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One discovery strategy in the cascade.
#[async_trait]
pub trait ContactTier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, identity: &BusinessIdentity) -> Option<ContactCandidate>;
}

/// Runs tiers in order and stops at the first accepted email.
pub struct ContactCascade {
    tiers: Vec<Box<dyn ContactTier>>,
    tier_delay: Duration,
}

impl ContactCascade {
    pub fn new(tiers: Vec<Box<dyn ContactTier>>, tier_delay: Duration) -> Self {
        Self { tiers, tier_delay }
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    pub async fn discover(&self, identity: &BusinessIdentity) -> Option<ContactCandidate> {
        for (index, tier) in self.tiers.iter().enumerate() {
            if index > 0 && !self.tier_delay.is_zero() {
                tokio::time::sleep(self.tier_delay).await;
            }

            tracing::debug!("Cascade tier '{}' for '{}'", tier.name(), identity.name);
            if let Some(found) = tier.attempt(identity).await {
                tracing::info!(
                    "Found email {} for '{}' via {} tier",
                    found.raw_value,
                    identity.name,
                    found.source_tier
                );
                return Some(found);
            }
        }

        tracing::info!("No email found for '{}'", identity.name);
        None
    }
}

// ============ Tier 1: directories ============

pub struct DirectoryTier {
    directories: Vec<Arc<dyn DirectoryProvider>>,
    extractor: Arc<CandidateExtractor>,
    matcher: Arc<IdentityMatcher>,
    pacer: Arc<Pacer>,
}

impl DirectoryTier {
    pub fn new(
        directories: Vec<Arc<dyn DirectoryProvider>>,
        extractor: Arc<CandidateExtractor>,
        matcher: Arc<IdentityMatcher>,
        pacer: Arc<Pacer>,
    ) -> Self {
        Self {
            directories,
            extractor,
            matcher,
            pacer,
        }
    }
}

#[async_trait]
impl ContactTier for DirectoryTier {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn attempt(&self, identity: &BusinessIdentity) -> Option<ContactCandidate> {
        for directory in &self.directories {
            self.pacer.wait(directory.host()).await;

            let markup = match directory.lookup(&identity.name, &identity.locale).await {
                Ok(markup) => markup,
                Err(e) => {
                    tracing::warn!(
                        "Directory {} lookup failed for '{}': {}",
                        directory.name(),
                        identity.name,
                        e
                    );
                    continue;
                }
            };

            let candidates: Vec<ContactCandidate> = self
                .extractor
                .extract_from_markup(&markup)
                .into_iter()
                .map(|email| ContactCandidate::new(email, SourceTier::Directory))
                .collect();
            tracing::debug!(
                "Directory {} returned {} candidate(s) for '{}'",
                directory.name(),
                candidates.len(),
                identity.name
            );

            if let Some(best) = self.matcher.choose_best(&candidates, identity) {
                return Some(best);
            }
        }
        None
    }
}

// ============ Tiers 2 and 3: web search + page strategies ============

/// Extraction strategy applied to one fetched page.
#[async_trait]
pub trait PageStrategy: Send + Sync {
    fn tier(&self) -> SourceTier;

    async fn extract(
        &self,
        identity: &BusinessIdentity,
        url: &str,
        html: &str,
    ) -> Option<ContactCandidate>;
}

#[derive(Debug, Clone)]
pub struct WebSearchSettings {
    pub max_results: usize,
    /// Appended to `"name" locale` to bias results toward contact pages.
    pub contact_keywords: String,
    pub page_timeout: Duration,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            max_results: 5,
            contact_keywords: "epost kontakt".to_string(),
            page_timeout: Duration::from_secs(10),
        }
    }
}

pub struct WebSearchTier {
    search: Option<Arc<dyn SearchProvider>>,
    fetcher: Arc<dyn PageFetcher>,
    strategies: Vec<Box<dyn PageStrategy>>,
    /// Hosts already covered by the directory tier.
    skip_hosts: Vec<String>,
    settings: WebSearchSettings,
    pacer: Arc<Pacer>,
}

impl WebSearchTier {
    pub fn new(
        search: Option<Arc<dyn SearchProvider>>,
        fetcher: Arc<dyn PageFetcher>,
        strategies: Vec<Box<dyn PageStrategy>>,
        skip_hosts: Vec<String>,
        settings: WebSearchSettings,
        pacer: Arc<Pacer>,
    ) -> Self {
        Self {
            search,
            fetcher,
            strategies,
            skip_hosts,
            settings,
            pacer,
        }
    }

    pub fn query_for(&self, identity: &BusinessIdentity) -> String {
        format!(
            "\"{}\" {} {}",
            identity.name, identity.locale, self.settings.contact_keywords
        )
        .trim()
        .to_string()
    }

    fn is_skipped(&self, host: &str) -> bool {
        self.skip_hosts
            .iter()
            .any(|skip| host == skip || host.ends_with(&format!(".{}", skip)))
    }
}

#[async_trait]
impl ContactTier for WebSearchTier {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn attempt(&self, identity: &BusinessIdentity) -> Option<ContactCandidate> {
        let Some(search) = self.search.as_ref() else {
            tracing::debug!("Web tier skipped: no search provider configured");
            return None;
        };

        let query = self.query_for(identity);
        self.pacer.wait("search").await;
        let urls = match search.search(&query, self.settings.max_results).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!("Web search failed for '{}': {}", identity.name, e);
                return None;
            }
        };

        for url in urls {
            let Some(host) = host_of(&url) else {
                continue;
            };
            if self.is_skipped(&host) {
                tracing::debug!("Skipping directory result {}", url);
                continue;
            }

            self.pacer.wait(&host).await;
            let page = match self.fetcher.get(&url, self.settings.page_timeout).await {
                Ok(page) if page.is_success() => page,
                Ok(page) => {
                    tracing::debug!("Page {} returned {}", url, page.status);
                    continue;
                }
                Err(e) => {
                    tracing::debug!("Fetching {} failed: {}", url, e);
                    continue;
                }
            };

            for strategy in &self.strategies {
                if let Some(found) = strategy.extract(identity, &url, &page.body).await {
                    tracing::debug!("{:?} strategy matched on {}", strategy.tier(), url);
                    return Some(found);
                }
            }
        }
        None
    }
}

/// Tier 2: regex extraction with the full identity matcher.
pub struct RegexPageStrategy {
    extractor: Arc<CandidateExtractor>,
    matcher: Arc<IdentityMatcher>,
}

impl RegexPageStrategy {
    pub fn new(extractor: Arc<CandidateExtractor>, matcher: Arc<IdentityMatcher>) -> Self {
        Self { extractor, matcher }
    }
}

#[async_trait]
impl PageStrategy for RegexPageStrategy {
    fn tier(&self) -> SourceTier {
        SourceTier::WebRegex
    }

    async fn extract(
        &self,
        identity: &BusinessIdentity,
        url: &str,
        html: &str,
    ) -> Option<ContactCandidate> {
        let candidates: Vec<ContactCandidate> = self
            .extractor
            .extract(html)
            .into_iter()
            .map(|email| ContactCandidate::from_url(email, SourceTier::WebRegex, url))
            .collect();
        self.matcher.choose_best(&candidates, identity)
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Upper bound on page text sent to the model, in characters.
    pub max_page_chars: usize,
    /// Pages with less visible text than this are not worth a call.
    pub min_page_chars: usize,
    /// The model's explicit "no answer" reply.
    pub none_sentinel: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            max_page_chars: 8000,
            min_page_chars: 100,
            none_sentinel: "NONE".to_string(),
        }
    }
}

/// Tier 3: the model does the disambiguation; its answer is only checked for
/// structure and domain safety.
pub struct LlmPageStrategy {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    extractor: Arc<CandidateExtractor>,
    matcher: Arc<IdentityMatcher>,
    settings: LlmSettings,
    pacer: Arc<Pacer>,
}

impl LlmPageStrategy {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        retry: RetryPolicy,
        extractor: Arc<CandidateExtractor>,
        matcher: Arc<IdentityMatcher>,
        settings: LlmSettings,
        pacer: Arc<Pacer>,
    ) -> Self {
        Self {
            generator,
            retry,
            extractor,
            matcher,
            settings,
            pacer,
        }
    }

    pub fn prompt_for(&self, identity: &BusinessIdentity, text: &str) -> String {
        format!(
            "Find the email address of the business \"{name}\" in the text below.\n\
             IMPORTANT: Answer ONLY with the email address of THIS business.\n\
             If you are unsure, or if the email belongs to another business or to a \
             directory service, answer \"{none}\".\n\
             Answer with the email address only, no other text.\n\n\
             TEXT:\n{text}",
            name = identity.name,
            none = self.settings.none_sentinel,
            text = text,
        )
    }

    fn accept_answer(&self, answer: &str) -> Option<String> {
        let answer = answer.trim();
        if answer.is_empty() || answer.eq_ignore_ascii_case(&self.settings.none_sentinel) {
            return None;
        }
        let email = first_email_in(answer)?;
        if !self.extractor.is_structurally_valid(&email) {
            tracing::debug!("Model answer {} failed structural validation", email);
            return None;
        }
        if !self.matcher.is_domain_safe(&email) {
            tracing::debug!("Model answer {} is on a catalog domain", email);
            return None;
        }
        Some(email)
    }
}

#[async_trait]
impl PageStrategy for LlmPageStrategy {
    fn tier(&self) -> SourceTier {
        SourceTier::WebLlm
    }

    async fn extract(
        &self,
        identity: &BusinessIdentity,
        url: &str,
        html: &str,
    ) -> Option<ContactCandidate> {
        let text = page_text(html);
        if text.chars().count() < self.settings.min_page_chars {
            return None;
        }
        let bounded: String = text.chars().take(self.settings.max_page_chars).collect();
        let prompt = self.prompt_for(identity, &bounded);

        let answer = self
            .retry
            .run(
                || async {
                    self.pacer.wait("llm").await;
                    self.generator.complete(&prompt).await
                },
                ProviderError::is_retryable,
            )
            .await;

        match answer {
            Ok(answer) => self
                .accept_answer(&answer)
                .map(|email| ContactCandidate::from_url(email, SourceTier::WebLlm, url)),
            Err(e) => {
                tracing::warn!("Text generation gave no result for '{}': {}", identity.name, e);
                None
            }
        }
    }
}
