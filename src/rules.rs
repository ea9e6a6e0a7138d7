//! Injected rule sets: catalog/webmail domain lists, extraction filters and
//! scoring weights.
//!
//! Every component that needs one of these receives it through its
//! constructor, so tests (or another market) can substitute their own lists.
//! The `norwegian()` constructors hold the defaults for the Asker/Bærum market.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Domains that can never be a business's own website or contact domain, and
/// the webmail domains that many unrelated businesses share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRules {
    /// Directory, social, registry and site-builder hosts.
    pub catalog_domains: HashSet<String>,
    /// Generic mailbox providers. Listed here as well as (possibly) in
    /// `catalog_domains`; membership here always wins.
    pub webmail_domains: HashSet<String>,
    /// Minimum shared length (exclusive lower bound is 3) for a
    /// domain-label/name-token substring match.
    pub min_domain_match_len: usize,
    /// Minimum normalized local-part length for a webmail local-part match.
    pub min_local_part_len: usize,
}

impl CatalogRules {
    pub fn norwegian() -> Self {
        Self {
            catalog_domains: set(&[
                // directories
                "gulesider.no",
                "proff.no",
                "1881.no",
                "purehelp.no",
                "brreg.no",
                "finn.no",
                "yelp.com",
                "tripadvisor.com",
                "tripadvisor.no",
                // social
                "facebook.com",
                "instagram.com",
                "linkedin.com",
                "twitter.com",
                "x.com",
                "youtube.com",
                // platforms and site builders
                "google.com",
                "google.no",
                "wixpress.com",
                "squarespace.com",
                "wordpress.com",
                "microsoft.com",
                "sentry.io",
                // registrars
                "domene.no",
                "domeneshop.no",
                "registrator.no",
                // placeholders
                "example.com",
                "example.no",
                "test.com",
                // webmail, allowed back in through `webmail_domains`
                "outlook.com",
                "hotmail.com",
                "gmail.com",
                "yahoo.com",
                "icloud.com",
                "online.no",
                "live.com",
                "live.no",
            ]),
            webmail_domains: set(&[
                "outlook.com",
                "hotmail.com",
                "gmail.com",
                "yahoo.com",
                "icloud.com",
                "online.no",
                "live.com",
                "live.no",
                "vikenfiber.no",
                "altibox.no",
                "getmail.no",
                "c2i.net",
            ]),
            min_domain_match_len: 4,
            min_local_part_len: 4,
        }
    }

    pub fn is_webmail(&self, domain: &str) -> bool {
        self.webmail_domains.contains(&domain.to_lowercase())
    }

    /// True when `host` equals a catalog domain or is a subdomain of one.
    pub fn is_catalog_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_lowercase();
        self.catalog_domains
            .iter()
            .any(|catalog| host == *catalog || host.ends_with(&format!(".{}", catalog)))
    }
}

impl Default for CatalogRules {
    fn default() -> Self {
        Self::norwegian()
    }
}

/// Purely structural filters applied to extracted email strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRules {
    /// Local-part prefixes of machine mailboxes.
    pub ignored_prefixes: Vec<String>,
    /// Suffixes of image file names that the email regex picks up from
    /// `name@2x.png`-style asset paths.
    pub image_extensions: Vec<String>,
}

impl ExtractionRules {
    pub fn norwegian() -> Self {
        Self {
            ignored_prefixes: [
                "noreply",
                "no-reply",
                "donotreply",
                "do-not-reply",
                "mailer-daemon",
                "postmaster",
                "hostmaster",
                "abuse",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            image_extensions: [".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self::norwegian()
    }
}

/// One registration-age bucket: registered at most `max_age_days` ago earns `bonus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyTier {
    pub max_age_days: i64,
    pub bonus: u32,
}

/// Weights for both scoring modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    // registry mode
    pub contact_bonus: u32,
    pub email_bonus: u32,
    /// Keyed by lower-cased locale name.
    pub locale_bonus: HashMap<String, u32>,
    /// Checked in order; the first matching bucket wins.
    pub recency_tiers: Vec<RecencyTier>,
    pub industry_bonus: u32,
    pub relevant_industry_codes: HashSet<String>,

    // ratings mode
    pub rating_weight: f64,
    pub review_weight: f64,
    pub review_cap: f64,
    pub no_website_bonus: u32,
}

impl ScoringWeights {
    pub fn norwegian() -> Self {
        let mut locale_bonus = HashMap::new();
        locale_bonus.insert("asker".to_string(), 20);
        locale_bonus.insert("bærum".to_string(), 15);

        Self {
            contact_bonus: 40,
            email_bonus: 20,
            locale_bonus,
            recency_tiers: vec![
                RecencyTier {
                    max_age_days: 30,
                    bonus: 10,
                },
                RecencyTier {
                    max_age_days: 90,
                    bonus: 7,
                },
                RecencyTier {
                    max_age_days: 180,
                    bonus: 5,
                },
            ],
            industry_bonus: 10,
            relevant_industry_codes: set(&[
                "96.021", "96.022", // hairdressing
                "43.220", // plumbing
                "43.210", // electrical
                "43.341", // painting
                "41.200", "43.110", "43.120", "43.310", "43.320", "43.910", "43.990", // building trades
                "45.200", "45.201", // car repair and care
                "47.761", // florist
                "10.710", // bakery
                "56.101", "56.102", "56.210", // restaurant, cafe, catering
                "81.210", "81.220", // cleaning
                "86.230", "86.211", "86.212", "86.909", // dental, medical, physio
                "74.201", "74.202", // photography
                "96.011", "96.012", // laundry
                "96.040", "96.090", // personal services
            ]),
            rating_weight: 50.0,
            review_weight: 15.0,
            review_cap: 30.0,
            no_website_bonus: 20,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::norwegian()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_host_matches_subdomains() {
        let rules = CatalogRules::norwegian();
        assert!(rules.is_catalog_host("gulesider.no"));
        assert!(rules.is_catalog_host("kart.gulesider.no"));
        assert!(rules.is_catalog_host("WWW.Facebook.com"));
        assert!(!rules.is_catalog_host("notgulesider.no"));
        assert!(!rules.is_catalog_host("askerbil.no"));
    }

    #[test]
    fn test_webmail_is_also_catalog_but_allowlisted() {
        let rules = CatalogRules::norwegian();
        assert!(rules.is_catalog_host("gmail.com"));
        assert!(rules.is_webmail("Gmail.com"));
        assert!(!rules.is_webmail("proff.no"));
    }
}
