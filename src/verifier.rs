/// Website-presence verification.
///
/// A business only qualifies as a lead when it has no website of its own.
/// Evidence comes from two places: web search result hosts, then direct
/// guesses at `<name>.no` / `<name>.com`.
use crate::models::BusinessIdentity;
use crate::normalize::normalize;
use crate::pacing::{host_of, Pacer};
use crate::providers::{PageFetcher, SearchProvider};
use crate::rules::CatalogRules;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct VerifierSettings {
    pub max_results: usize,
    /// Suffixes appended to the name token for direct probing.
    pub probe_tlds: Vec<String>,
    pub probe_timeout: Duration,
    /// Longest name token that is still probed (a DNS label is at most 63).
    pub max_probe_label_len: usize,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            max_results: 5,
            probe_tlds: vec![".no".to_string(), ".com".to_string()],
            probe_timeout: Duration::from_secs(5),
            max_probe_label_len: 63,
        }
    }
}

pub struct WebsiteVerifier {
    search: Option<Arc<dyn SearchProvider>>,
    fetcher: Arc<dyn PageFetcher>,
    catalog: CatalogRules,
    settings: VerifierSettings,
    pacer: Arc<Pacer>,
}

impl WebsiteVerifier {
    pub fn new(
        search: Option<Arc<dyn SearchProvider>>,
        fetcher: Arc<dyn PageFetcher>,
        catalog: CatalogRules,
        settings: VerifierSettings,
        pacer: Arc<Pacer>,
    ) -> Self {
        Self {
            search,
            fetcher,
            catalog,
            settings,
            pacer,
        }
    }

    /// `true` when no evidence of an own website was found.
    pub async fn has_no_website(&self, identity: &BusinessIdentity) -> bool {
        if let Some(url) = self.website_in_search(identity).await {
            tracing::info!("Found website for '{}' via search: {}", identity.name, url);
            return false;
        }
        if let Some(url) = self.website_by_probe(identity).await {
            tracing::info!("Domain guess hit for '{}': {}", identity.name, url);
            return false;
        }
        true
    }

    /// First search result whose host is not a catalog and contains the
    /// normalized business name.
    async fn website_in_search(&self, identity: &BusinessIdentity) -> Option<String> {
        let search = self.search.as_ref()?;
        let name_token = identity.name_token();
        if name_token.is_empty() {
            return None;
        }

        let query = format!("\"{}\" {}", identity.name, identity.locale);
        self.pacer.wait("search").await;
        let urls = match search.search(query.trim(), self.settings.max_results).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::warn!("Search failed for '{}': {}", identity.name, e);
                return None;
            }
        };

        urls.into_iter().find(|url| {
            host_of(url).is_some_and(|host| {
                !self.catalog.is_catalog_host(&host) && normalize(&host).contains(&name_token)
            })
        })
    }

    /// Candidate URLs for direct probing; empty for unusable name tokens.
    pub fn probe_urls(&self, identity: &BusinessIdentity) -> Vec<String> {
        let slug = identity.name_token();
        if slug.is_empty() || slug.len() > self.settings.max_probe_label_len {
            return Vec::new();
        }
        self.settings
            .probe_tlds
            .iter()
            .map(|tld| format!("https://www.{}{}", slug, tld))
            .collect()
    }

    async fn website_by_probe(&self, identity: &BusinessIdentity) -> Option<String> {
        for url in self.probe_urls(identity) {
            if let Some(host) = host_of(&url) {
                self.pacer.wait(&host).await;
            }
            match self.fetcher.head(&url, self.settings.probe_timeout).await {
                Ok(status) if status < 400 => return Some(url),
                Ok(status) => tracing::debug!("Probe {} answered {}", url, status),
                Err(e) => tracing::debug!("Probe {} failed: {}", url, e),
            }
        }
        None
    }
}
