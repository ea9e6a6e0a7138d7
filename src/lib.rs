//! Lead finder library.
//!
//! Discovers small businesses without a web presence, verifies that they
//! really have no website, enriches them with a contact email through a
//! cascade of directories, web search and an LLM extractor, scores and ranks
//! them, and deduplicates them against a Postgres lead store.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Matching, discovery, verification and scoring.
//! - `integrations`: External service clients and the lead store.
//! - `cascade`: Contact discovery tiers and their orchestration.
//! - `circuit_breaker`: Circuit breaker for web search.
//! - `config`: Configuration management.
//! - `db`: Database connection and schema setup.
//! - `db_storage`: Postgres lead store.
//! - `errors`: Error handling types.
//! - `extraction`: Candidate email extraction from text and markup.
//! - `handlers`: HTTP request handlers.
//! - `matcher`: Identity matching of candidate emails.
//! - `models`: Core data models.
//! - `normalize`: Business name normalization.
//! - `pacing`: Per-host request pacing.
//! - `pipeline`: Batch orchestration.
//! - `providers`: Capability traits for external collaborators.
//! - `retry`: Retry with exponential backoff.
//! - `rules`: Injected rule sets with Norwegian defaults.
//! - `scoring`: Potential scoring and ranking.
//! - `services`: HTTP-backed collaborators (search, pages, directories, Gemini, Places, Brreg).
//! - `sources`: Provider payloads and their conversion into records.
//! - `verifier`: Website-presence verification.

pub mod api;
pub mod core;
pub mod integrations;

// Re-export primary modules for shared use in tests and binaries
pub mod cascade;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod extraction;
pub mod handlers;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod pacing;
pub mod pipeline;
pub mod providers;
pub mod retry;
pub mod rules;
pub mod scoring;
pub mod services;
pub mod sources;
pub mod verifier;

pub use extraction::is_structurally_valid;
pub use normalize::normalize;
pub use scoring::rank;
