use crate::normalize::normalize;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

// ============ Matching Inputs ============

/// The (name, locale) pair used to reason about which contact data belongs to
/// a business. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessIdentity {
    /// Registered or display name of the business.
    pub name: String,
    /// Municipality or area the business operates in (e.g. "Asker").
    pub locale: String,
    /// Date the business entered the company registry, when known.
    pub registration_date: Option<NaiveDate>,
    /// Industry classification code (NACE), when known.
    pub industry_code: Option<String>,
}

impl BusinessIdentity {
    pub fn new(name: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locale: locale.into(),
            registration_date: None,
            industry_code: None,
        }
    }

    pub fn with_registration_date(mut self, date: NaiveDate) -> Self {
        self.registration_date = Some(date);
        self
    }

    pub fn with_industry_code(mut self, code: impl Into<String>) -> Self {
        self.industry_code = Some(code.into());
        self
    }

    /// Normalized name token used by every matching step.
    pub fn name_token(&self) -> String {
        normalize(&self.name)
    }
}

/// Discovery strategy that produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Directory,
    WebRegex,
    #[serde(rename = "web_llm")]
    WebLlm,
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceTier::Directory => "directory",
            SourceTier::WebRegex => "web_regex",
            SourceTier::WebLlm => "web_llm",
        };
        f.write_str(label)
    }
}

/// An unverified email extracted from a source, not yet attributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactCandidate {
    pub raw_value: String,
    pub source_tier: SourceTier,
    pub origin_url: Option<String>,
}

impl ContactCandidate {
    pub fn new(raw_value: impl Into<String>, source_tier: SourceTier) -> Self {
        Self {
            raw_value: raw_value.into(),
            source_tier,
            origin_url: None,
        }
    }

    pub fn from_url(raw_value: impl Into<String>, source_tier: SourceTier, url: &str) -> Self {
        Self {
            raw_value: raw_value.into(),
            source_tier,
            origin_url: Some(url.to_string()),
        }
    }

    /// Local part (before the last `@`).
    pub fn local_part(&self) -> &str {
        self.raw_value
            .rsplit_once('@')
            .map(|(local, _)| local)
            .unwrap_or("")
    }

    /// Lower-cased domain (after the last `@`).
    pub fn domain(&self) -> String {
        self.raw_value
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_lowercase())
            .unwrap_or_default()
    }
}

// ============ Leads ============

/// Provider the lead was sourced from. Files written before registry
/// sourcing existed carry no source and are Places leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LeadSource {
    #[default]
    #[serde(rename = "google_places")]
    PlacesApi,
    #[serde(rename = "brreg")]
    Registry,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::PlacesApi => "google_places",
            LeadSource::Registry => "brreg",
        }
    }
}

impl FromStr for LeadSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google_places" | "places" => Ok(LeadSource::PlacesApi),
            "brreg" | "registry" => Ok(LeadSource::Registry),
            other => Err(format!("Unknown lead source '{}'", other)),
        }
    }
}

/// Review state of a lead. Owned by the human reviewers; the pipeline only
/// ever writes `Pending` for brand new leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    NoAnswer,
    CallLater,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Pending => "pending",
            LeadStatus::Accepted => "accepted",
            LeadStatus::Rejected => "rejected",
            LeadStatus::NoAnswer => "no_answer",
            LeadStatus::CallLater => "call_later",
        }
    }

    /// Terminal statuses must never be overwritten by the automated pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LeadStatus::Accepted | LeadStatus::Rejected)
    }

    /// Lenient parse for values read back from the store.
    pub fn parse_or_pending(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or(LeadStatus::Pending)
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(LeadStatus::Pending),
            "accepted" => Ok(LeadStatus::Accepted),
            "rejected" => Ok(LeadStatus::Rejected),
            "no_answer" => Ok(LeadStatus::NoAnswer),
            "call_later" => Ok(LeadStatus::CallLater),
            other => Err(format!("Unknown lead status '{}'", other)),
        }
    }
}

/// The persisted/output unit. `id` is the natural key across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    /// Provider-assigned identifier (place id or organisation number).
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub user_rating_count: u32,
    pub industry: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Municipality the lead was sourced for.
    #[serde(default)]
    pub locale: String,
    pub has_website: bool,
    /// Bounded potential score in [0, 100].
    pub potential_score: u8,
    pub info: String,
    #[serde(default)]
    pub source: LeadSource,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub notes: String,
}

/// A business record as delivered by a lead source, before verification,
/// enrichment and scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct BusinessRecord {
    pub id: String,
    pub identity: BusinessIdentity,
    pub address: String,
    pub industry: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub source: LeadSource,
    pub info: String,
    pub notes: String,
}

impl BusinessRecord {
    pub fn new(id: impl Into<String>, identity: BusinessIdentity, source: LeadSource) -> Self {
        Self {
            id: id.into(),
            identity,
            address: String::new(),
            industry: String::new(),
            phone: None,
            email: None,
            rating: None,
            review_count: None,
            source,
            info: String::new(),
            notes: String::new(),
        }
    }

    pub fn has_phone(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    pub fn known_email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}

// ============ Deduplication ============

/// Ids already known to the lead store. Only grows during a run.
#[derive(Debug, Clone, Default)]
pub struct BlacklistSet {
    ids: HashSet<String>,
}

impl BlacklistSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Records an id; returns `false` if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl From<HashSet<String>> for BlacklistSet {
    fn from(ids: HashSet<String>) -> Self {
        Self { ids }
    }
}

impl FromIterator<String> for BlacklistSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
