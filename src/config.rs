use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Lead store. Without it the pipeline runs without dedup or persistence.
    pub database_url: Option<String>,
    pub port: u16,
    pub places_api_key: Option<String>,
    pub search_api_key: Option<String>,
    pub search_cx: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// Municipality leads are sourced for.
    pub lead_locale: String,
    pub output_limit: usize,
    pub identity_delay_ms: u64,
    pub request_pacing_ms: u64,
    /// Abort before any external call when no store is configured.
    pub require_store: bool,
    pub run_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 3000,
            places_api_key: None,
            search_api_key: None,
            search_cx: None,
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            lead_locale: "Asker".to_string(),
            output_limit: 20,
            identity_delay_ms: 1500,
            request_pacing_ms: 1000,
            require_store: false,
            run_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            database_url: optional_var("DATABASE_URL")
                .or_else(|| optional_var("DB_URL"))
                .map(validate_database_url)
                .transpose()?,
            port: optional_var("PORT")
                .map(|port| {
                    port.parse::<u16>()
                        .ok()
                        .filter(|p| *p > 0)
                        .ok_or_else(|| {
                            anyhow::anyhow!("PORT must be a valid number between 1-65535")
                        })
                })
                .transpose()?
                .unwrap_or(defaults.port),
            places_api_key: optional_var("GOOGLE_PLACES_API_KEY"),
            search_api_key: optional_var("GOOGLE_SEARCH_API_KEY"),
            search_cx: optional_var("GOOGLE_SEARCH_CX"),
            gemini_api_key: optional_var("GEMINI_API_KEY"),
            gemini_model: optional_var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            lead_locale: optional_var("LEAD_LOCALE").unwrap_or(defaults.lead_locale),
            output_limit: parse_var("LEAD_OUTPUT_LIMIT", defaults.output_limit)
                .and_then(|limit| {
                    if limit == 0 || limit > 1000 {
                        anyhow::bail!("LEAD_OUTPUT_LIMIT must be between 1 and 1000");
                    }
                    Ok(limit)
                })?,
            identity_delay_ms: parse_var("IDENTITY_DELAY_MS", defaults.identity_delay_ms)?,
            request_pacing_ms: parse_var("REQUEST_PACING_MS", defaults.request_pacing_ms)?,
            require_store: parse_var("REQUIRE_STORE", defaults.require_store)?,
            run_timeout_secs: optional_var("RUN_TIMEOUT_SECS")
                .map(|secs| {
                    secs.parse::<u64>()
                        .map_err(|_| anyhow::anyhow!("RUN_TIMEOUT_SECS must be a number of seconds"))
                })
                .transpose()?,
        };

        if config.search_api_key.is_some() != config.search_cx.is_some() {
            anyhow::bail!("GOOGLE_SEARCH_API_KEY and GOOGLE_SEARCH_CX must be set together");
        }
        if config.require_store && config.database_url.is_none() {
            anyhow::bail!("REQUIRE_STORE is set but DATABASE_URL is missing");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        if let Some(ref url) = config.database_url {
            tracing::debug!("Database URL: {}...", url_prefix(url));
        } else {
            tracing::warn!("DATABASE_URL not set; leads will not be deduplicated or stored");
        }
        tracing::debug!("Lead locale: {}", config.lead_locale);
        tracing::debug!("Output limit: {}", config.output_limit);
        tracing::debug!(
            "Pacing: {}ms per host, {}ms between identities",
            config.request_pacing_ms,
            config.identity_delay_ms
        );
        tracing::debug!(
            "Providers: places={} search={} gemini={} ({})",
            config.places_api_key.is_some(),
            config.search_api_key.is_some(),
            config.gemini_api_key.is_some(),
            config.gemini_model
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn identity_delay(&self) -> Duration {
        Duration::from_millis(self.identity_delay_ms)
    }

    pub fn request_pacing(&self) -> Duration {
        Duration::from_millis(self.request_pacing_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

/// Set and non-blank environment variable.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match optional_var(name) {
        Some(value) => value
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", name, value)),
        None => Ok(default),
    }
}

/// First 20 characters of a URL, for logging without credentials.
fn url_prefix(url: &str) -> String {
    url.chars().take(20).collect()
}

fn validate_database_url(url: String) -> anyhow::Result<String> {
    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
    }
    Ok(url)
}
