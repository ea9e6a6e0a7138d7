/// Property-based tests using proptest
/// Invariants of validation, normalization, scoring, ranking and matching
mod common;

use chrono::NaiveDate;
use common::lead;
use proptest::prelude::*;
use rust_lead_finder::core::matching::IdentityMatcher;
use rust_lead_finder::models::{BusinessIdentity, ContactCandidate, LeadSource, SourceTier};
use rust_lead_finder::core::scoring::{LeadScorer, ScoreSignals, MAX_SCORE};
use rust_lead_finder::{is_structurally_valid, normalize, rank};

// Property: structural validation is total
proptest! {
    #[test]
    fn structural_validation_never_panics(email in "\\PC*") {
        let _ = is_structurally_valid(&email);
    }

    #[test]
    fn consecutive_dots_are_rejected(
        a in "[a-z]{1,8}",
        b in "[a-z]{1,8}",
        domain in "[a-z]{2,10}"
    ) {
        let email = format!("{}..{}@{}.no", a, b, domain);
        prop_assert!(!is_structurally_valid(&email));
    }

    #[test]
    fn image_file_names_are_rejected(
        local in "[a-z]{1,8}",
        scale in "[1-3]x",
        ext in prop::sample::select(vec!["png", "jpg", "jpeg", "gif", "svg", "webp"])
    ) {
        let email = format!("{}@{}.{}", local, scale, ext);
        prop_assert!(!is_structurally_valid(&email));
    }

    #[test]
    fn plain_business_addresses_are_accepted(
        local in "(post|kontakt|firmapost|info)",
        domain in "[a-z]{3,12}",
        tld in "(no|com|net)"
    ) {
        let email = format!("{}@{}.{}", local, domain, tld);
        prop_assert!(is_structurally_valid(&email));
    }
}

// Property: name tokens are canonical
proptest! {
    #[test]
    fn normalize_is_idempotent(name in "\\PC*") {
        let once = normalize(&name);
        prop_assert_eq!(normalize(&once), once.clone());
        prop_assert!(once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}

// Property: scores stay in bounds whatever the inputs
proptest! {
    #[test]
    fn ratings_score_is_bounded(
        rating in any::<f64>(),
        reviews in any::<u32>(),
        has_website in any::<bool>()
    ) {
        let signals = ScoreSignals {
            rating: Some(rating),
            review_count: Some(reviews),
            has_website,
            ..Default::default()
        };
        let score = LeadScorer::default().ratings_score(&signals);
        prop_assert!(score <= MAX_SCORE);
    }

    #[test]
    fn registry_score_is_bounded(
        has_phone in any::<bool>(),
        has_email in any::<bool>(),
        locale in prop::sample::select(vec!["Asker", "Bærum", "ASKER", "BÆRUM", "Oslo", ""]),
        age_days in -400i64..4000,
        code in prop::sample::select(vec!["45.200", "96.021", "01.110", ""])
    ) {
        let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        let signals = ScoreSignals {
            has_phone,
            has_email,
            locale: locale.to_string(),
            registration_date: Some(today - chrono::Duration::days(age_days)),
            industry_code: Some(code.to_string()),
            ..Default::default()
        };
        let score = LeadScorer::default().score(LeadSource::Registry, &signals, today);
        prop_assert!(score <= MAX_SCORE);
    }
}

// Property: ranking is ordered, stable and truncated
proptest! {
    #[test]
    fn rank_is_ordered_and_stable(
        entries in prop::collection::vec((0u8..=100, 0u32..5), 0..60),
        limit in 0usize..40
    ) {
        let leads: Vec<_> = entries
            .iter()
            .enumerate()
            .map(|(i, (score, reviews))| lead(&format!("{:03}", i), *score, *reviews))
            .collect();
        let total = leads.len();

        let ranked = rank(leads, limit);
        prop_assert_eq!(ranked.len(), total.min(limit));
        for pair in ranked.windows(2) {
            let a = (pair[0].potential_score, pair[0].user_rating_count);
            let b = (pair[1].potential_score, pair[1].user_rating_count);
            prop_assert!(a >= b);
            if a == b {
                prop_assert!(pair[0].id < pair[1].id);
            }
        }
    }
}

// Property: attribution is deterministic and never picks a catalog address
proptest! {
    #[test]
    fn choose_best_is_deterministic_and_safe(
        name in "[A-Za-z ]{1,20}",
        locals in prop::collection::vec("[a-z]{1,12}", 1..6),
        domains in prop::collection::vec(
            prop::sample::select(vec![
                "gmail.com", "proff.no", "gulesider.no", "firma.no", "askerbil.no", "online.no",
            ]),
            1..6
        )
    ) {
        let matcher = IdentityMatcher::default();
        let identity = BusinessIdentity::new(name, "Asker");
        let candidates: Vec<ContactCandidate> = locals
            .iter()
            .zip(domains.iter().cycle())
            .map(|(local, domain)| {
                ContactCandidate::new(format!("{}@{}", local, domain), SourceTier::WebRegex)
            })
            .collect();

        let first = matcher.choose_best(&candidates, &identity);
        let second = matcher.choose_best(&candidates, &identity);
        prop_assert_eq!(&first, &second);
        if let Some(best) = first {
            prop_assert!(candidates.contains(&best));
            prop_assert!(matcher.is_domain_safe(&best.raw_value));
            prop_assert!(!best.raw_value.ends_with("@proff.no"));
            prop_assert!(!best.raw_value.ends_with("@gulesider.no"));
        }
    }
}
