use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Errors surfaced by the lead API and the batch entry points.
#[derive(Debug)]
pub enum AppError {
    /// The store answered, but the query failed.
    DatabaseError(sqlx::Error),
    NotFound(String),
    BadRequest(String),
    /// A required capability (credential, endpoint, store) is not configured.
    ConfigurationMissing(String),
    /// The lead store could not be reached.
    StoreUnavailable(String),
    InternalError(String),
    /// Error with a context chain.
    WithContext {
        source: Box<AppError>,
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ConfigurationMissing(msg) => write!(f, "Configuration missing: {}", msg),
            AppError::StoreUnavailable(msg) => write!(f, "Lead store unavailable: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// True when the store could not be reached at all, as opposed to a
    /// failed query against a reachable store.
    pub fn is_store_failure(&self) -> bool {
        match self {
            AppError::StoreUnavailable(_) => true,
            AppError::WithContext { source, .. } => source.is_store_failure(),
            _ => false,
        }
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ConfigurationMissing(msg) => {
                tracing::error!("Configuration missing: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }
            AppError::StoreUnavailable(msg) => {
                tracing::error!("Lead store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Lead store unavailable".to_string(),
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::WithContext { source, context } => {
                tracing::error!("{} -> {}", context, source);
                source.status_and_message()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();
        (status, Json(json!({ "error": error_message }))).into_response()
    }
}

/// Connection-level sqlx failures mean the store is unreachable; everything
/// else is a query error.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::StoreUnavailable(err.to_string())
            }
            other => AppError::DatabaseError(other),
        }
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(AppError::from).context(context)
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(AppError::from).with_context(f)
    }
}

/// Failures reported by external collaborators (search, page fetch, directory,
/// text generation).
///
/// None of these is fatal to a batch: callers downgrade every variant to
/// "no result" after whatever retrying their policy allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Timeout or connection failure.
    TransientNetwork(String),
    /// The provider answered 429 / quota exceeded.
    RateLimited,
    /// Any other non-success answer, or an open circuit.
    Unavailable(String),
    /// The provider answered with an unexpected shape.
    Malformed(String),
    /// The capability has no credentials or endpoint configured.
    ConfigurationMissing(String),
}

impl ProviderError {
    /// Failures worth another attempt after a backoff delay.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::TransientNetwork(_)
        )
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::TransientNetwork(msg) => write!(f, "Transient network error: {}", msg),
            ProviderError::RateLimited => write!(f, "Rate limited by provider"),
            ProviderError::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            ProviderError::Malformed(msg) => write!(f, "Malformed provider response: {}", msg),
            ProviderError::ConfigurationMissing(msg) => {
                write!(f, "Provider not configured: {}", msg)
            }
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else if err.status().map(|s| s.as_u16()) == Some(429) {
            ProviderError::RateLimited
        } else if err.is_status() {
            ProviderError::Unavailable(err.to_string())
        } else {
            // timeouts, connect and body errors
            ProviderError::TransientNetwork(err.to_string())
        }
    }
}
