//! HTTP-backed collaborators: web search, page fetching, business
//! directories, text generation and the two lead sources.

use crate::circuit_breaker::{create_search_circuit_breaker, SearchCircuitBreaker};
use crate::config::Config;
use crate::errors::ProviderError;
use crate::models::{BusinessRecord, LeadSource};
use crate::providers::{
    DirectoryProvider, FetchedPage, PageFetcher, RecordSource, SearchProvider, TextGenerator,
};
use crate::sources::{
    entity_to_record, place_to_record, BrregPage, PlacesSearchResponse, PLACE_QUERIES,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use failsafe::CircuitBreaker;
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Shared reqwest client with a browser user agent. Redirects are followed.
pub fn build_http_client() -> Result<Client, ProviderError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| {
            ProviderError::ConfigurationMissing(format!("Failed to create HTTP client: {}", e))
        })
}

/// Maps a non-success status to the provider error taxonomy.
fn status_error(service: &str, status: StatusCode) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited
    } else if status.is_server_error() {
        ProviderError::TransientNetwork(format!("{} returned {}", service, status))
    } else {
        ProviderError::Unavailable(format!("{} returned {}", service, status))
    }
}

// ============ Web search ============

#[derive(Debug, Deserialize)]
struct CustomSearchResponse {
    #[serde(default)]
    items: Vec<CustomSearchItem>,
}

#[derive(Debug, Deserialize)]
struct CustomSearchItem {
    link: String,
}

/// Google Custom Search JSON API, guarded by a circuit breaker.
pub struct GoogleSearchService {
    client: Client,
    base_url: String,
    api_key: String,
    cx: String,
    breaker: SearchCircuitBreaker,
}

impl GoogleSearchService {
    pub const DEFAULT_BASE_URL: &'static str = "https://www.googleapis.com/customsearch/v1";
    /// The API refuses `num` above 10.
    const MAX_PAGE_SIZE: usize = 10;

    pub fn new(client: Client, api_key: String, cx: String) -> Self {
        Self::with_base_url(client, Self::DEFAULT_BASE_URL.to_string(), api_key, cx)
    }

    pub fn with_base_url(client: Client, base_url: String, api_key: String, cx: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            cx,
            breaker: create_search_circuit_breaker(),
        }
    }

    async fn request(&self, query: &str, max_results: usize) -> Result<Vec<String>, ProviderError> {
        let num = max_results.clamp(1, Self::MAX_PAGE_SIZE).to_string();
        let url = reqwest::Url::parse_with_params(
            &self.base_url,
            &[
                ("key", self.api_key.as_str()),
                ("cx", self.cx.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ],
        )
        .map_err(|e| ProviderError::ConfigurationMissing(format!("Bad search URL: {}", e)))?;

        // Redact key from logs to prevent credential exposure
        tracing::debug!("Search: q={} num={} key=[REDACTED]", query, num);

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error("Search API", response.status()));
        }

        let body: CustomSearchResponse = response.json().await?;
        Ok(body
            .items
            .into_iter()
            .map(|item| item.link)
            .take(max_results)
            .collect())
    }
}

#[async_trait]
impl SearchProvider for GoogleSearchService {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, ProviderError> {
        if !self.breaker.is_call_permitted() {
            tracing::warn!("Search circuit open, skipping query: {}", query);
            return Err(ProviderError::Unavailable(
                "Search circuit breaker open".to_string(),
            ));
        }

        let outcome = self.request(query, max_results).await;
        let succeeded = outcome.is_ok();
        let _ = self
            .breaker
            .call(|| if succeeded { Ok(()) } else { Err(()) });
        outcome
    }
}

// ============ Page fetching ============

/// reqwest-backed page access with a short-lived cache for successful GETs.
#[derive(Clone)]
pub struct HttpPageFetcher {
    client: Client,
    cache: Cache<String, FetchedPage>,
}

impl HttpPageFetcher {
    pub fn new(client: Client) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(600))
            .max_capacity(500)
            .build();
        Self { client, cache }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchedPage, ProviderError> {
        if let Some(cached) = self.cache.get(url).await {
            tracing::debug!("Page cache hit: {}", url);
            return Ok(cached);
        }

        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        let page = FetchedPage { status, body };

        if page.is_success() {
            self.cache.insert(url.to_string(), page.clone()).await;
        }
        Ok(page)
    }

    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, ProviderError> {
        let response = self.client.head(url).timeout(timeout).send().await?;
        Ok(response.status().as_u16())
    }
}

// ============ Business directories ============

/// A directory searched through a plain query-string URL.
pub struct HttpDirectory {
    name: String,
    host: String,
    search_url: String,
    query_param: String,
    extra_params: Vec<(String, String)>,
    /// Whether the locale is appended to the queried name.
    with_locale: bool,
    fetcher: Arc<dyn PageFetcher>,
    timeout: Duration,
}

impl HttpDirectory {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        search_url: impl Into<String>,
        query_param: impl Into<String>,
        with_locale: bool,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            search_url: search_url.into(),
            query_param: query_param.into(),
            extra_params: Vec::new(),
            with_locale,
            fetcher,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((key.into(), value.into()));
        self
    }

    /// proff.no company search, by name only.
    pub fn proff(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self::new(
            "proff",
            "proff.no",
            "https://www.proff.no/bransjesøk",
            "q",
            false,
            fetcher,
        )
    }

    /// 1881.no business search, by name and locale.
    pub fn nummer_1881(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self::new("1881", "1881.no", "https://www.1881.no/", "query", true, fetcher)
            .with_param("type", "business")
    }

    /// Default Norwegian directory set, in lookup order.
    pub fn norwegian(fetcher: Arc<dyn PageFetcher>) -> Vec<Arc<dyn DirectoryProvider>> {
        vec![
            Arc::new(Self::proff(fetcher.clone())),
            Arc::new(Self::nummer_1881(fetcher)),
        ]
    }

    pub fn lookup_url(&self, name: &str, locale: &str) -> Result<String, ProviderError> {
        let query = if self.with_locale && !locale.trim().is_empty() {
            format!("{} {}", name.trim(), locale.trim())
        } else {
            name.trim().to_string()
        };
        let mut params = vec![(self.query_param.clone(), query)];
        params.extend(self.extra_params.iter().cloned());

        reqwest::Url::parse_with_params(&self.search_url, &params)
            .map(|url| url.to_string())
            .map_err(|e| {
                ProviderError::ConfigurationMissing(format!(
                    "Bad {} search URL: {}",
                    self.name, e
                ))
            })
    }
}

#[async_trait]
impl DirectoryProvider for HttpDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn lookup(&self, name: &str, locale: &str) -> Result<String, ProviderError> {
        let url = self.lookup_url(name, locale)?;
        tracing::debug!("Directory {} lookup: {}", self.name, url);

        let page = self.fetcher.get(&url, self.timeout).await?;
        if !page.is_success() {
            let status = StatusCode::from_u16(page.status).unwrap_or(StatusCode::BAD_GATEWAY);
            return Err(status_error(&self.name, status));
        }
        Ok(page.body)
    }
}

// ============ Text generation ============

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

/// Gemini `generateContent`.
pub struct GeminiService {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiService {
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self::with_base_url(client, Self::DEFAULT_BASE_URL.to_string(), api_key, model)
    }

    pub fn with_base_url(client: Client, base_url: String, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url,
            model,
            api_key,
            timeout: Duration::from_secs(15),
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiService {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::debug!("Gemini returned {}: {}", status, error_text);
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                ProviderError::RateLimited
            } else {
                ProviderError::Unavailable(format!("Gemini returned {}", status))
            });
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            ProviderError::Malformed(format!("Failed to parse Gemini response: {}", e))
        })?;

        Ok(body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text.trim().to_string())
            .unwrap_or_default())
    }
}

// ============ Lead sources ============

#[derive(Debug, Clone)]
pub struct PlacesSettings {
    /// Municipality appended to each query and used as the lead locale.
    pub locale: String,
    pub center: (f64, f64),
    pub queries: Vec<String>,
    /// Stop once this many candidate records are collected.
    pub target_results: usize,
    pub initial_radius: f64,
    pub max_radius: f64,
    pub radius_growth: f64,
    pub max_pages: usize,
    pub page_size: usize,
}

impl Default for PlacesSettings {
    fn default() -> Self {
        Self {
            locale: "Asker".to_string(),
            center: (59.9130155, 10.5583176),
            queries: PLACE_QUERIES.iter().map(|q| q.to_string()).collect(),
            target_results: 40,
            initial_radius: 5000.0,
            max_radius: 50000.0,
            radius_growth: 2.0,
            max_pages: 10,
            page_size: 20,
        }
    }
}

/// Google Places text search.
pub struct PlacesService {
    client: Client,
    base_url: String,
    api_key: String,
    settings: PlacesSettings,
}

impl PlacesService {
    pub const DEFAULT_BASE_URL: &'static str = "https://places.googleapis.com/v1/places:searchText";
    const FIELD_MASK: &'static str = "places.displayName,places.formattedAddress,\
         places.rating,places.userRatingCount,places.types,places.nationalPhoneNumber,\
         places.websiteUri,places.id,places.editorialSummary,places.reviews,\
         places.primaryTypeDisplayName,nextPageToken";

    pub fn new(client: Client, api_key: String, settings: PlacesSettings) -> Self {
        Self::with_base_url(client, Self::DEFAULT_BASE_URL.to_string(), api_key, settings)
    }

    pub fn with_base_url(
        client: Client,
        base_url: String,
        api_key: String,
        settings: PlacesSettings,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            settings,
        }
    }

    async fn search_page(
        &self,
        query: &str,
        radius: f64,
        page_token: Option<&str>,
    ) -> Result<PlacesSearchResponse, ProviderError> {
        let (latitude, longitude) = self.settings.center;
        let mut body = json!({
            "textQuery": format!("{} {}", query, self.settings.locale),
            "maxResultCount": self.settings.page_size,
            "locationBias": {
                "circle": {
                    "center": { "latitude": latitude, "longitude": longitude },
                    "radius": radius,
                }
            },
        });
        if let Some(token) = page_token {
            body["pageToken"] = json!(token);
        }

        let response = self
            .client
            .post(&self.base_url)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", Self::FIELD_MASK)
            .timeout(Duration::from_secs(15))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error("Places API", response.status()));
        }
        Ok(response.json().await?)
    }

    /// Candidate records without a listed website. The search radius grows
    /// until `target_results` is reached or `max_radius` is exceeded.
    pub async fn search_all(&self) -> Result<Vec<BusinessRecord>, ProviderError> {
        let target = self.settings.target_results;
        let mut records = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut radius = self.settings.initial_radius;
        let mut any_success = false;
        let mut last_error = None;

        while records.len() < target && radius <= self.settings.max_radius {
            tracing::info!("Places search with radius {}m", radius);

            for query in &self.settings.queries {
                if records.len() >= target {
                    break;
                }

                let mut page_token: Option<String> = None;
                let mut page_count = 0;
                while records.len() < target && page_count < self.settings.max_pages {
                    let page = match self.search_page(query, radius, page_token.as_deref()).await {
                        Ok(page) => page,
                        Err(e) => {
                            tracing::warn!("Places query '{}' failed: {}", query, e);
                            last_error = Some(e);
                            break;
                        }
                    };
                    any_success = true;
                    page_count += 1;

                    for (index, place) in page.places.iter().enumerate() {
                        let fallback_id =
                            format!("goog-{}-{}-{}-{}", radius, query, page_count, index);
                        let Some(record) =
                            place_to_record(place, &self.settings.locale, &fallback_id)
                        else {
                            continue;
                        };
                        if seen_ids.insert(record.id.clone()) {
                            records.push(record);
                        }
                    }

                    match page.next_page_token {
                        Some(token) if !token.is_empty() => page_token = Some(token),
                        _ => break,
                    }
                }
            }

            if records.len() < target {
                radius *= self.settings.radius_growth;
            }
        }

        if !any_success {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        tracing::info!("✓ Found {} Places candidates without website", records.len());
        Ok(records)
    }
}

#[async_trait]
impl RecordSource for PlacesService {
    async fn fetch_records(&self, _today: NaiveDate) -> Result<Vec<BusinessRecord>, ProviderError> {
        self.search_all().await
    }
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// (municipality number, municipality name) pairs.
    pub municipalities: Vec<(String, String)>,
    /// Only entities registered within this many days.
    pub lookback_days: i64,
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            municipalities: vec![
                ("3203".to_string(), "ASKER".to_string()),
                ("3024".to_string(), "BÆRUM".to_string()),
            ],
            lookback_days: 180,
            page_size: 100,
            max_pages: 100,
        }
    }
}

/// Brønnøysund entity registry (open API, no credentials).
pub struct BrregService {
    client: Client,
    base_url: String,
    settings: RegistrySettings,
}

impl BrregService {
    pub const DEFAULT_BASE_URL: &'static str = "https://data.brreg.no/enhetsregisteret/api/enheter";

    pub fn new(client: Client, settings: RegistrySettings) -> Self {
        Self::with_base_url(client, Self::DEFAULT_BASE_URL.to_string(), settings)
    }

    pub fn with_base_url(client: Client, base_url: String, settings: RegistrySettings) -> Self {
        Self {
            client,
            base_url,
            settings,
        }
    }

    async fn fetch_page(
        &self,
        municipality: &str,
        from_date: &str,
        page: u32,
    ) -> Result<BrregPage, ProviderError> {
        let size = self.settings.page_size.to_string();
        let page = page.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("kommunenummer", municipality),
                ("fraRegistreringsdatoEnhetsregisteret", from_date),
                ("size", size.as_str()),
                ("page", page.as_str()),
            ])
            .timeout(Duration::from_secs(15))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error("Brreg API", response.status()));
        }
        Ok(response.json().await?)
    }

    /// Recently registered entities with contact data and no homepage.
    pub async fn fetch_recent(&self, today: NaiveDate) -> Result<Vec<BusinessRecord>, ProviderError> {
        let from_date = (today - chrono::Duration::days(self.settings.lookback_days))
            .format("%Y-%m-%d")
            .to_string();
        let mut records = Vec::new();
        let mut any_success = false;
        let mut last_error = None;

        for (number, name) in &self.settings.municipalities {
            let mut page = 0;
            let mut fetched = 0;
            let qualified_before = records.len();

            while page < self.settings.max_pages {
                let body = match self.fetch_page(number, &from_date, page).await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!("Brreg page {} for {} failed: {}", page, name, e);
                        last_error = Some(e);
                        break;
                    }
                };
                any_success = true;

                let total_pages = body.total_pages();
                let entities = body.entities();
                if entities.is_empty() {
                    break;
                }
                fetched += entities.len();
                records.extend(entities.iter().filter_map(|e| entity_to_record(e, name)));

                page += 1;
                if page >= total_pages {
                    break;
                }
            }

            tracing::info!(
                "✓ {} ({}): fetched {} entities, {} qualified",
                name,
                number,
                fetched,
                records.len() - qualified_before
            );
        }

        if !any_success {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl RecordSource for BrregService {
    async fn fetch_records(&self, today: NaiveDate) -> Result<Vec<BusinessRecord>, ProviderError> {
        self.fetch_recent(today).await
    }
}

/// Record sources configured in `config`, keyed by lead source.
pub struct LeadSources {
    places: Option<Arc<dyn RecordSource>>,
    registry: Arc<dyn RecordSource>,
}

impl LeadSources {
    pub fn new(places: Option<Arc<dyn RecordSource>>, registry: Arc<dyn RecordSource>) -> Self {
        Self { places, registry }
    }

    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let client = build_http_client()?;
        let places = config.places_api_key.clone().map(|key| {
            let settings = PlacesSettings {
                locale: config.lead_locale.clone(),
                target_results: config.output_limit * 2,
                ..PlacesSettings::default()
            };
            Arc::new(PlacesService::new(client.clone(), key, settings)) as Arc<dyn RecordSource>
        });
        if places.is_none() {
            tracing::warn!("GOOGLE_PLACES_API_KEY not set; Places sourcing disabled");
        }
        let registry = Arc::new(BrregService::new(client, RegistrySettings::default()));
        Ok(Self::new(places, registry))
    }

    pub fn get(&self, source: LeadSource) -> Result<Arc<dyn RecordSource>, ProviderError> {
        match source {
            LeadSource::PlacesApi => self.places.clone().ok_or_else(|| {
                ProviderError::ConfigurationMissing("GOOGLE_PLACES_API_KEY".to_string())
            }),
            LeadSource::Registry => Ok(self.registry.clone()),
        }
    }
}
