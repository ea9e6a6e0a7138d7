/// Potential scoring and ranking.
///
/// Two canonical formulas, one per source type. Registry leads carry contact
/// and registration signals, Places leads carry consumer ratings; the two
/// signal sets are never mixed for one lead.
use crate::models::{Lead, LeadSource};
use crate::rules::ScoringWeights;
use chrono::NaiveDate;

pub const MAX_SCORE: u8 = 100;

/// Everything a score may depend on.
#[derive(Debug, Clone, Default)]
pub struct ScoreSignals {
    pub has_phone: bool,
    pub has_email: bool,
    pub locale: String,
    pub registration_date: Option<NaiveDate>,
    pub industry_code: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub has_website: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LeadScorer {
    weights: ScoringWeights,
}

impl LeadScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Canonical score for a lead from `source`, evaluated as of `today`.
    pub fn score(&self, source: LeadSource, signals: &ScoreSignals, today: NaiveDate) -> u8 {
        match source {
            LeadSource::Registry => self.registry_score(signals, today),
            LeadSource::PlacesApi => self.ratings_score(signals),
        }
    }

    /// Additive registry score: contact, email, locale, recency, industry.
    pub fn registry_score(&self, signals: &ScoreSignals, today: NaiveDate) -> u8 {
        let w = &self.weights;
        let mut score: u32 = 0;

        if signals.has_phone || signals.has_email {
            score = score.saturating_add(w.contact_bonus);
        }
        if signals.has_email {
            score = score.saturating_add(w.email_bonus);
        }

        let locale = signals.locale.trim().to_lowercase();
        if let Some(bonus) = w.locale_bonus.get(&locale) {
            score = score.saturating_add(*bonus);
        }

        if let Some(registered) = signals.registration_date {
            let age_days = (today - registered).num_days();
            if age_days >= 0 {
                if let Some(tier) = w
                    .recency_tiers
                    .iter()
                    .find(|tier| age_days <= tier.max_age_days)
                {
                    score = score.saturating_add(tier.bonus);
                }
            }
        }

        if signals
            .industry_code
            .as_ref()
            .is_some_and(|code| w.relevant_industry_codes.contains(code.trim()))
        {
            score = score.saturating_add(w.industry_bonus);
        }

        clamp(score as f64)
    }

    /// Ratings score: normalized stars, log-dampened review volume and a
    /// bonus for having no website.
    pub fn ratings_score(&self, signals: &ScoreSignals) -> u8 {
        let w = &self.weights;

        let rating = signals.rating.unwrap_or(0.0);
        let rating = if rating.is_finite() {
            rating.clamp(0.0, 5.0)
        } else {
            0.0
        };
        let rating_score = rating / 5.0 * w.rating_weight;

        let reviews = signals.review_count.unwrap_or(0) as f64;
        let review_score = (w.review_weight * (1.0 + reviews).log10()).min(w.review_cap);

        let website_bonus = if signals.has_website {
            0.0
        } else {
            w.no_website_bonus as f64
        };

        clamp(rating_score + review_score + website_bonus)
    }
}

fn clamp(raw: f64) -> u8 {
    if !raw.is_finite() || raw <= 0.0 {
        return 0;
    }
    raw.round().min(MAX_SCORE as f64) as u8
}

/// Stable ranking: score descending, then review count descending; leads
/// equal on both keep their input order. Truncated to `limit`.
pub fn rank(mut leads: Vec<Lead>, limit: usize) -> Vec<Lead> {
    leads.sort_by(|a, b| {
        b.potential_score
            .cmp(&a.potential_score)
            .then(b.user_rating_count.cmp(&a.user_rating_count))
    });
    leads.truncate(limit);
    leads
}
