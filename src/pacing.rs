use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::time::Duration;

/// Per-host politeness delay for outbound calls.
///
/// Backed by a keyed GCRA limiter with a burst of one, so consecutive calls
/// to the same host are at least `min_interval` apart while different hosts
/// never wait on each other.
pub struct Pacer {
    limiter: Option<DefaultKeyedRateLimiter<String>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        // A zero period yields no quota: pacing is off
        let limiter = Quota::with_period(min_interval).map(RateLimiter::keyed);
        Self { limiter }
    }

    /// No pacing at all.
    pub fn disabled() -> Self {
        Self { limiter: None }
    }

    pub async fn wait(&self, host: &str) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        if limiter.check_key(&host.to_string()).is_err() {
            tracing::debug!("Pacing {}", host);
            limiter.until_key_ready(&host.to_string()).await;
        }
    }
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer")
            .field("enabled", &self.limiter.is_some())
            .finish()
    }
}

/// Host component of a URL, lower-cased, without a leading `www.`.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}
