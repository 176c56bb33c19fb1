//! Tier-based access filters and the default exclusion of repealed laws.

use serde_json::{Value, json};

use zantara_vector::{FilterCond, SearchFilter};

/// Document access tier, most restricted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierLevel {
    S,
    A,
    B,
    C,
    D,
}

impl TierLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierLevel::S => "S",
            TierLevel::A => "A",
            TierLevel::B => "B",
            TierLevel::C => "C",
            TierLevel::D => "D",
        }
    }

    /// Access widens with user level (0..=3).
    pub fn allowed_for_level(user_level: u8) -> Vec<TierLevel> {
        match user_level {
            0 => vec![TierLevel::S],
            1 => vec![TierLevel::S, TierLevel::A],
            2 => vec![TierLevel::S, TierLevel::A, TierLevel::B, TierLevel::C],
            _ => vec![TierLevel::S, TierLevel::A, TierLevel::B, TierLevel::C, TierLevel::D],
        }
    }
}

const REPEALED: &str = "dicabut";

/// Combine a tier restriction with the default exclusion of repealed laws
/// (`status_vigensi = "dicabut"`).
///
/// If the caller already constrains `status_vigensi`, the repealed value is
/// scrubbed from inclusion lists; a request that asks for repealed laws
/// outright is dropped rather than honored.
pub fn build_search_filter(
    tier_filter: Option<SearchFilter>,
    exclude_repealed: bool,
) -> Option<SearchFilter> {
    let mut filters = tier_filter.unwrap_or_default();

    if exclude_repealed {
        match filters.remove("status_vigensi") {
            Some(FilterCond::In(values)) => {
                let allowed: Vec<Value> =
                    values.into_iter().filter(|v| v != &json!(REPEALED)).collect();
                if allowed.is_empty() {
                    filters.insert("status_vigensi".into(), FilterCond::Ne(json!(REPEALED)));
                } else {
                    filters.insert("status_vigensi".into(), FilterCond::In(allowed));
                }
            }
            Some(FilterCond::Eq(value)) => {
                if value == json!(REPEALED) {
                    // Explicit request for repealed laws: silently dropped,
                    // the exclusion takes precedence.
                    filters.insert("status_vigensi".into(), FilterCond::Ne(json!(REPEALED)));
                } else {
                    filters.insert("status_vigensi".into(), FilterCond::In(vec![value]));
                }
            }
            Some(other) => {
                filters.insert("status_vigensi".into(), other);
            }
            None => {
                filters.insert("status_vigensi".into(), FilterCond::Ne(json!(REPEALED)));
            }
        }
    }

    if filters.is_empty() { None } else { Some(filters) }
}

/// Tier inclusion filter for collections that carry tier metadata.
pub fn tier_filter_for(allowed: &[TierLevel]) -> Option<SearchFilter> {
    if allowed.is_empty() {
        return None;
    }
    let values: Vec<Value> = allowed.iter().map(|t| json!(t.as_str())).collect();
    let mut filter = SearchFilter::new();
    filter.insert("tier".into(), FilterCond::In(values));
    Some(filter)
}
