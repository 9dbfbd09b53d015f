//! Trigram Similarity Module
//! In-process twin of PostgreSQL's pg_trgm, used by the in-memory store so
//! search ranks the same way with or without a database.
//!
//! - Words are maximal runs of alphanumeric characters, lowercased
//! - Each word is padded with two leading spaces and one trailing space
//! - Trigrams are all 3-character windows, deduplicated
//! - similarity = |A ∩ B| / |A ∪ B|

use std::collections::HashSet;

use crate::models::Listing;
use crate::utils::constants::TRIGRAM_SIMILARITY_THRESHOLD;

/// Set of trigrams for a piece of text
pub fn trigrams(text: &str) -> HashSet<String> {
    let mut set = HashSet::new();

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.to_lowercase().chars())
            .chain(std::iter::once(' '))
            .collect();

        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }

    set
}

/// pg_trgm `similarity(a, b)`
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);

    if ta.is_empty() && tb.is_empty() {
        return 0.0;
    }

    let shared = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - shared;

    shared as f64 / union as f64
}

/// Relevance of a listing for a free-text query, `None` when it does not match.
///
/// Matches on `title % query` or a case-insensitive substring hit in title,
/// brand or description. The score is always the title similarity.
pub fn score_listing(listing: &Listing, query: &str) -> Option<f64> {
    let score = similarity(&listing.title, query);
    if score >= TRIGRAM_SIMILARITY_THRESHOLD {
        return Some(score);
    }

    let needle = query.to_lowercase();
    let contains = |field: &str| field.to_lowercase().contains(&needle);

    if contains(&listing.title)
        || listing.brand.as_deref().map_or(false, contains)
        || contains(&listing.description)
    {
        Some(score)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, ListingStatus};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_trigrams_match_pg_trgm() {
        // SELECT show_trgm('cat') => {"  c"," ca","at ",cat}
        let t = trigrams("Cat");
        let expected: HashSet<String> = ["  c", " ca", "cat", "at "]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(t, expected);
    }

    #[test]
    fn test_trigrams_split_on_punctuation() {
        let t = trigrams("t-shirt");
        assert!(t.contains("  t"));
        assert!(t.contains("  s"));
        assert!(!t.iter().any(|g| g.contains('-')));
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("jacket", "jacket"), 1.0);
        assert_eq!(similarity("jacket", "xyz"), 0.0);
        let s = similarity("jacket", "jackets");
        assert!(s > 0.5 && s < 1.0, "got {}", s);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        assert_eq!(similarity("leather boots", "boots"), similarity("boots", "leather boots"));
    }

    #[test]
    fn test_score_listing() {
        let now = Utc::now();
        let listing = Listing {
            id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            title: "Vintage Denim Jacket".to_string(),
            description: "Barely worn, fits oversized".to_string(),
            price_cents: 4500,
            category: "jackets".to_string(),
            size: "L".to_string(),
            condition: Condition::LikeNew,
            brand: Some("Levi's".to_string()),
            image_keys: vec![],
            status: ListingStatus::Available,
            created_at: now,
            updated_at: now,
        };

        assert!(score_listing(&listing, "vintage denim jacket").is_some());
        // substring in brand / description still matches
        assert!(score_listing(&listing, "levi").is_some());
        assert!(score_listing(&listing, "oversized").is_some());
        assert!(score_listing(&listing, "sneakers").is_none());
    }
}
