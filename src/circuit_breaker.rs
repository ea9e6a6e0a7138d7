use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Breaker type guarding web search calls.
pub type SearchCircuitBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Breaker around the web search API.
///
/// Both the website verifier and the web tier of the contact cascade query
/// search once per identity. When the API is down or out of quota, five
/// consecutive failures open the breaker and every further identity gets an
/// immediate `Unavailable` instead of waiting out a timeout. Recovery is
/// probed after 10s, backing off to 60s.
pub fn create_search_circuit_breaker() -> SearchCircuitBreaker {
    let backoff_strategy = backoff::exponential(Duration::from_secs(10), Duration::from_secs(60));
    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
