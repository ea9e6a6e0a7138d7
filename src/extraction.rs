/// Candidate email extraction from page text and directory markup.
///
/// Everything here is a pure transform over supplied text: no identity
/// knowledge, no I/O.
use crate::rules::ExtractionRules;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}")
            .expect("email pattern is a valid regex")
    })
}

/// Finds the first email-looking token in free text (used on LLM answers).
pub fn first_email_in(text: &str) -> Option<String> {
    email_regex()
        .find(text)
        .map(|m| clean_candidate(m.as_str()))
}

fn clean_candidate(raw: &str) -> String {
    raw.trim().trim_matches('.').to_lowercase()
}

/// Structural email validation plus candidate extraction.
#[derive(Debug, Clone, Default)]
pub struct CandidateExtractor {
    rules: ExtractionRules,
}

impl CandidateExtractor {
    pub fn new(rules: ExtractionRules) -> Self {
        Self { rules }
    }

    /// Rejects strings that cannot be a human-read business mailbox:
    /// - length outside [5, 254]
    /// - consecutive dots
    /// - missing local or domain part
    /// - top-level domain shorter than 2 characters
    /// - image file names (`logo@2x.png`)
    /// - machine mailboxes (`noreply@`, `mailer-daemon@`, ...)
    pub fn is_structurally_valid(&self, email: &str) -> bool {
        if email.len() < 5 || email.len() > 254 {
            return false;
        }
        if email.contains("..") {
            return false;
        }

        let Some((local, domain)) = email.rsplit_once('@') else {
            return false;
        };
        if local.is_empty() || domain.is_empty() {
            return false;
        }

        let tld = domain.rsplit('.').next().unwrap_or("");
        if tld.chars().count() < 2 {
            return false;
        }

        let lowered = email.to_lowercase();
        if self
            .rules
            .image_extensions
            .iter()
            .any(|ext| lowered.ends_with(ext.as_str()))
        {
            return false;
        }

        let local_lower = local.to_lowercase();
        if self
            .rules
            .ignored_prefixes
            .iter()
            .any(|prefix| local_lower.starts_with(prefix.as_str()))
        {
            return false;
        }

        true
    }

    /// Regex extraction over raw page content. Returns valid candidates,
    /// lower-cased and de-duplicated, in first-seen order.
    pub fn extract(&self, content: &str) -> Vec<String> {
        self.collect_valid(email_regex().find_iter(content).map(|m| m.as_str()))
    }

    /// Extraction restricted to `mailto:` links in HTML markup, the only
    /// contact data directory result pages expose reliably.
    pub fn extract_from_markup(&self, markup: &str) -> Vec<String> {
        let document = Html::parse_document(markup);
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        let hrefs: Vec<String> = document
            .select(&selector)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(mailto_address)
            .collect();

        self.collect_valid(hrefs.iter().map(String::as_str))
    }

    fn collect_valid<'a>(&self, raw: impl Iterator<Item = &'a str>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut valid = Vec::new();
        for candidate in raw {
            let email = clean_candidate(candidate);
            if !seen.insert(email.clone()) {
                continue;
            }
            if self.is_structurally_valid(&email) {
                valid.push(email);
            }
        }
        valid
    }
}

/// `mailto:Post@Firma.no?subject=Hei` -> `Post@Firma.no`
fn mailto_address(href: &str) -> Option<String> {
    let trimmed = href.trim();
    let scheme = trimmed.get(..7)?;
    if !scheme.eq_ignore_ascii_case("mailto:") {
        return None;
    }
    let address = trimmed[7..].split('?').next().unwrap_or("").trim();
    if address.is_empty() {
        None
    } else {
        Some(address.replace("%40", "@"))
    }
}

/// Visible text of an HTML page, whitespace-collapsed. Script and style
/// bodies are dropped.
pub fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let skipped: HashSet<_> = Selector::parse("script, style, noscript")
        .map(|sel| document.select(&sel).map(|el| el.id()).collect())
        .unwrap_or_default();

    let mut words: Vec<&str> = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let inside_skipped = node.ancestors().any(|a| skipped.contains(&a.id()));
        if inside_skipped {
            continue;
        }
        words.extend(text.split_whitespace());
    }
    words.join(" ")
}

/// Shorthand for [`CandidateExtractor::is_structurally_valid`] with the default rules.
pub fn is_structurally_valid(email: &str) -> bool {
    CandidateExtractor::default().is_structurally_valid(email)
}
