/// Identity matching: is this email really this business's?
///
/// Precision over recall. Every rule below errs toward "no match": a lead
/// without an email costs a phone call, a lead with someone else's email
/// costs credibility.
use crate::models::{BusinessIdentity, ContactCandidate};
use crate::normalize::normalize;
use crate::rules::CatalogRules;

/// Which rule accepted a candidate. Ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchStrength {
    /// Webmail mailbox whose local part matches the business name.
    LocalPart,
    /// The email's own domain matches the business name.
    Domain,
}

#[derive(Debug, Clone, Default)]
pub struct IdentityMatcher {
    rules: CatalogRules,
}

impl IdentityMatcher {
    pub fn new(rules: CatalogRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &CatalogRules {
        &self.rules
    }

    /// Rule 1 only: the domain is not a catalog/platform domain, unless it is
    /// a webmail domain. Catalog domains can never belong to the target
    /// business, whatever the local part says.
    pub fn is_domain_safe(&self, email: &str) -> bool {
        let Some((_, domain)) = email.rsplit_once('@') else {
            return false;
        };
        let domain = domain.to_lowercase();
        !self.rules.is_catalog_host(&domain) || self.rules.is_webmail(&domain)
    }

    /// Applies rules 1-3 in order and reports the rule that accepted the
    /// candidate, or `None`.
    pub fn match_strength(
        &self,
        candidate: &ContactCandidate,
        identity: &BusinessIdentity,
    ) -> Option<MatchStrength> {
        if !self.is_domain_safe(&candidate.raw_value) {
            tracing::debug!(
                "Rejected catalog-domain candidate {} for '{}'",
                candidate.raw_value,
                identity.name
            );
            return None;
        }

        let name_token = identity.name_token();
        if name_token.is_empty() {
            return None;
        }

        let domain = candidate.domain();
        if self.rules.is_webmail(&domain) {
            let local = normalize(candidate.local_part());
            if local.len() >= self.rules.min_local_part_len && overlaps(&local, &name_token) {
                return Some(MatchStrength::LocalPart);
            }
            return None;
        }

        let label = normalize(first_label(&domain));
        if label.is_empty() || !overlaps(&label, &name_token) {
            return None;
        }
        // the shared substring is the shorter of the two tokens
        let shared = label.len().min(name_token.len());
        if shared >= self.rules.min_domain_match_len {
            Some(MatchStrength::Domain)
        } else {
            None
        }
    }

    pub fn is_plausible_owner(
        &self,
        candidate: &ContactCandidate,
        identity: &BusinessIdentity,
    ) -> bool {
        self.match_strength(candidate, identity).is_some()
    }

    /// Picks the strongest plausible candidate. A domain match beats any
    /// local-part match; within the same strength the earliest candidate wins.
    pub fn choose_best(
        &self,
        candidates: &[ContactCandidate],
        identity: &BusinessIdentity,
    ) -> Option<ContactCandidate> {
        let mut best: Option<(MatchStrength, &ContactCandidate)> = None;
        for candidate in candidates {
            let Some(strength) = self.match_strength(candidate, identity) else {
                continue;
            };
            if best.map_or(true, |(current, _)| strength > current) {
                best = Some((strength, candidate));
            }
            if strength == MatchStrength::Domain {
                break;
            }
        }
        best.map(|(_, candidate)| candidate.clone())
    }
}

/// `www.askerbil.no` -> `askerbil`
fn first_label(domain: &str) -> &str {
    let domain = domain.strip_prefix("www.").unwrap_or(domain);
    domain.split('.').next().unwrap_or("")
}

fn overlaps(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceTier;

    fn candidate(email: &str) -> ContactCandidate {
        ContactCandidate::new(email, SourceTier::WebRegex)
    }

    fn asker_bil() -> BusinessIdentity {
        BusinessIdentity::new("Asker Bilverksted", "Asker")
    }

    #[test]
    fn test_domain_match_either_direction() {
        let matcher = IdentityMatcher::default();
        let identity = asker_bil();
        assert!(matcher.is_plausible_owner(&candidate("post@askerbilverksted.no"), &identity));
        // domain label inside the name
        assert!(matcher.is_plausible_owner(&candidate("post@askerbil.no"), &identity));
        // name inside the domain label
        assert!(matcher.is_plausible_owner(&candidate("post@askerbilverkstedas.no"), &identity));
    }

    #[test]
    fn test_short_domain_labels_rejected() {
        let matcher = IdentityMatcher::default();
        // "ask" is inside the name token but too short to be evidence
        assert!(!matcher.is_plausible_owner(&candidate("post@ask.no"), &asker_bil()));
        assert!(!matcher.is_plausible_owner(&candidate("post@bil.no"), &asker_bil()));
    }

    #[test]
    fn test_webmail_needs_local_part_match() {
        let matcher = IdentityMatcher::default();
        let identity = asker_bil();
        assert!(matcher.is_plausible_owner(&candidate("askerbilverksted@gmail.com"), &identity));
        assert!(matcher.is_plausible_owner(&candidate("askerbil@online.no"), &identity));
        assert!(!matcher.is_plausible_owner(&candidate("ola.nordmann@gmail.com"), &identity));
        // local part shorter than 4 after normalization
        assert!(!matcher.is_plausible_owner(&candidate("a.b@gmail.com"), &identity));
    }

    #[test]
    fn test_catalog_domain_never_matches() {
        let matcher = IdentityMatcher::default();
        let identity = BusinessIdentity::new("Gulesider", "Asker");
        assert!(!matcher.is_plausible_owner(&candidate("gulesider@gulesider.no"), &identity));
        assert!(!matcher.is_domain_safe("info@kart.gulesider.no"));
        assert!(matcher.is_domain_safe("someone@gmail.com"));
    }

    #[test]
    fn test_domain_match_preferred_over_local_part() {
        let matcher = IdentityMatcher::default();
        let candidates = vec![
            candidate("askerbilverksted@gmail.com"),
            candidate("post@askerbilverksted.no"),
        ];
        let best = matcher.choose_best(&candidates, &asker_bil()).unwrap();
        assert_eq!(best.raw_value, "post@askerbilverksted.no");
    }

    #[test]
    fn test_empty_name_matches_nothing() {
        let matcher = IdentityMatcher::default();
        let identity = BusinessIdentity::new("&&", "Asker");
        assert!(!matcher.is_plausible_owner(&candidate("post@askerbil.no"), &identity));
    }
}
