//! Canonical name tokens for comparing business names with domains and
//! email local parts.

/// Lowercases `name` and strips every character outside `[a-z0-9]`.
///
/// Total and idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("Asker Bilverksted AS"), "askerbilverkstedas");
        assert_eq!(normalize("Rør & Varme 24/7"), "rrvarme247");
        assert_eq!(normalize("askerbil.no"), "askerbilno");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("---"), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        let once = normalize("Bærum Frisør & Hudpleie");
        assert_eq!(normalize(&once), once);
    }
}
