//! Core memory type definitions.
//!
//! Defines [`Recommendation`] (the analysis verdict), [`MemoryRecord`] (one
//! stored analysis), and [`fingerprint`] (query normalization).

use serde::{Deserialize, Serialize};

/// Verdict attached to every analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Worth sourcing at the analyzed price point.
    Buy,
    /// Market is saturated or margins are too thin.
    Avoid,
    /// Signal is mixed — gather more data before committing.
    Research,
}

impl Recommendation {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Avoid => "avoid",
            Self::Research => "research",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Self::Buy),
            "avoid" => Ok(Self::Avoid),
            "research" => Ok(Self::Research),
            _ => Err(format!("unknown recommendation: {s}")),
        }
    }
}

/// One stored analysis, matching the `memories` table schema.
///
/// Long-term copies are immutable once written; the short-term tier may
/// overwrite its copy for the same fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    /// Normalized form of the query this analysis answered.
    pub fingerprint: String,
    pub product_title: String,
    pub price: f64,
    pub analysis: String,
    pub recommendation: Recommendation,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

impl MemoryRecord {
    /// Build a new record with a fresh id and timestamp.
    pub fn new(
        fingerprint: impl Into<String>,
        product_title: impl Into<String>,
        price: f64,
        analysis: impl Into<String>,
        recommendation: Recommendation,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            fingerprint: fingerprint.into(),
            product_title: product_title.into(),
            price,
            analysis: analysis.into(),
            recommendation,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Normalize a raw query into its memory lookup key.
///
/// Case-folds, strips punctuation (any non-alphanumeric becomes a word
/// boundary), and collapses whitespace. `"Wireless Earbuds, under $50!"` and
/// `"wireless earbuds under 50"` produce the same fingerprint.
pub fn fingerprint(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut pending_space = false;

    for c in query.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lc in c.to_lowercase() {
                out.push(lc);
            }
        } else {
            pending_space = true;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_case_folds_and_strips_punctuation() {
        assert_eq!(
            fingerprint("Wireless Earbuds, under $50!"),
            "wireless earbuds under 50"
        );
        assert_eq!(fingerprint("wireless earbuds under 50"), "wireless earbuds under 50");
    }

    #[test]
    fn fingerprint_collapses_whitespace() {
        assert_eq!(fingerprint("  yoga   mat \t premium "), "yoga mat premium");
    }

    #[test]
    fn fingerprint_of_empty_and_punctuation_only() {
        assert_eq!(fingerprint(""), "");
        assert_eq!(fingerprint("?!... --"), "");
    }

    #[test]
    fn recommendation_round_trips_through_str() {
        for rec in [Recommendation::Buy, Recommendation::Avoid, Recommendation::Research] {
            let parsed: Recommendation = rec.as_str().parse().unwrap();
            assert_eq!(parsed, rec);
        }
        assert!("maybe".parse::<Recommendation>().is_err());
    }

    #[test]
    fn new_record_gets_id_and_timestamp() {
        let rec = MemoryRecord::new("yoga mat", "Pro Yoga Mat", 29.99, "solid", Recommendation::Buy);
        assert!(!rec.id.is_empty());
        assert!(!rec.created_at.is_empty());
        let other = MemoryRecord::new("yoga mat", "Pro Yoga Mat", 29.99, "solid", Recommendation::Buy);
        assert_ne!(rec.id, other.id);
    }
}
