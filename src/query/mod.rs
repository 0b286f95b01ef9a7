//! Best-effort extraction of structured attributes from free-text queries.
//!
//! Extraction is pattern-based and never fails: attributes that cannot be
//! recognized stay `None` and retrieval falls back to the raw query text.

pub mod synthesis;

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Structured information extracted from a natural-language query.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryInfo {
    /// Age in years, when stated.
    pub age: Option<u32>,
    /// Normalized gender (`male`/`female`), when stated.
    pub gender: Option<String>,
    /// Medical procedure with its descriptor (e.g. "knee surgery"), when stated.
    pub procedure: Option<String>,
    /// Location name, when stated.
    pub location: Option<String>,
    /// Policy age converted to months, when stated.
    pub policy_duration_months: Option<u32>,
    /// Coarse policy category (`health`/`auto`/`home`), when inferable.
    pub policy_type: Option<String>,
    /// The query exactly as submitted.
    pub raw_query: String,
}

fn age_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d+)[-\s]*(?:years?[-\s]*old|y\.?o\.?|yrs?|years?)")
            .expect("age pattern compiles")
    })
}

fn gender_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(male|female|m|f|man|woman|boy|girl|gentleman|lady)\b")
            .expect("gender pattern compiles")
    })
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d+)[-\s]*(months?|years?|weeks?|days?|mo|yr|wk|d|w|m)(?:[-\s]+\w+){0,3}?[-\s]+polic(?:y|ies)")
            .expect("duration pattern compiles")
    })
}

fn location_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(?:in|at|near|around|from)\s+([A-Za-z][A-Za-z ]*)")
            .expect("location pattern compiles")
    })
}

fn procedure_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(surgery|operation|procedure|treatment|therapy|consultation|examination|test|scan|x[-\s]?ray|mri|ct|cat[\s-]?scan|ultrasound)\b")
            .expect("procedure pattern compiles")
    })
}

/// Extract structured attributes from a query string.
pub fn extract_query_info(query: &str) -> QueryInfo {
    let query = query.trim();
    if query.is_empty() {
        return QueryInfo::default();
    }

    QueryInfo {
        age: extract_age(query),
        gender: extract_gender(query),
        procedure: extract_procedure(query),
        location: extract_location(query),
        policy_duration_months: extract_policy_duration(query),
        policy_type: extract_policy_type(query),
        raw_query: query.to_string(),
    }
}

fn extract_age(text: &str) -> Option<u32> {
    age_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn extract_gender(text: &str) -> Option<String> {
    let matched = gender_pattern().captures(text)?.get(1)?.as_str();
    match matched.to_lowercase().as_str() {
        "m" | "male" | "man" | "boy" | "gentleman" => Some("male".to_string()),
        "f" | "female" | "woman" | "girl" | "lady" => Some("female".to_string()),
        _ => None,
    }
}

fn extract_policy_duration(text: &str) -> Option<u32> {
    let caps = duration_pattern().captures(text)?;
    let value: u32 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_lowercase();

    if unit.starts_with('y') {
        Some(value.saturating_mul(12))
    } else if unit.starts_with("mo") || unit == "m" {
        Some(value)
    } else if unit.starts_with('w') {
        Some(value / 4)
    } else {
        // days
        Some(value / 30)
    }
}

fn extract_location(text: &str) -> Option<String> {
    let raw = location_pattern().captures(text)?.get(1)?.as_str().trim();
    if raw.is_empty() {
        return None;
    }
    let titled = raw
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    Some(titled)
}

fn extract_procedure(text: &str) -> Option<String> {
    let matched = procedure_pattern().find(text)?;
    let name = matched.as_str().to_lowercase();

    // Pick up a single descriptive word directly before the procedure
    // (e.g. "knee" in "knee surgery"), skipping punctuation-bearing tokens.
    let descriptor = text[..matched.start()]
        .split_whitespace()
        .next_back()
        .filter(|word| word.chars().all(char::is_alphabetic));

    match descriptor {
        Some(word) => Some(format!("{} {name}", word.to_lowercase())),
        None => Some(name),
    }
}

fn extract_policy_type(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    if lowered.contains("health") || lowered.contains("medical") {
        Some("health".to_string())
    } else if lowered.contains("auto") || lowered.contains("car") {
        Some("auto".to_string())
    } else if lowered.contains("home") || lowered.contains("house") {
        Some("home".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_full_claim_query() {
        let info =
            extract_query_info("46-year-old male, knee surgery in Pune, 3-month-old insurance policy");
        assert_eq!(info.age, Some(46));
        assert_eq!(info.gender.as_deref(), Some("male"));
        assert_eq!(info.procedure.as_deref(), Some("knee surgery"));
        assert_eq!(info.location.as_deref(), Some("Pune"));
        assert_eq!(info.policy_duration_months, Some(3));
        assert_eq!(
            info.raw_query,
            "46-year-old male, knee surgery in Pune, 3-month-old insurance policy"
        );
    }

    #[test]
    fn age_accepts_spelled_out_forms() {
        assert_eq!(extract_query_info("patient is 30 years old").age, Some(30));
        assert_eq!(extract_query_info("62 yo with fracture").age, Some(62));
        assert_eq!(extract_query_info("55yrs, female").age, Some(55));
    }

    #[test]
    fn gender_normalizes_synonyms() {
        assert_eq!(
            extract_query_info("woman seeking treatment").gender.as_deref(),
            Some("female")
        );
        assert_eq!(
            extract_query_info("gentleman aged 70").gender.as_deref(),
            Some("male")
        );
        assert!(extract_query_info("surgery claim").gender.is_none());
    }

    #[test]
    fn duration_converts_units_to_months() {
        assert_eq!(
            extract_query_info("2-year-old policy").policy_duration_months,
            Some(24)
        );
        assert_eq!(
            extract_query_info("8 week old policy").policy_duration_months,
            Some(2)
        );
        assert_eq!(
            extract_query_info("90 day policy").policy_duration_months,
            Some(3)
        );
    }

    #[test]
    fn procedure_without_descriptor_is_bare() {
        assert_eq!(
            extract_query_info("surgery claim status").procedure.as_deref(),
            Some("surgery")
        );
        assert_eq!(
            extract_query_info("is an mri covered").procedure.as_deref(),
            Some("an mri")
        );
    }

    #[test]
    fn policy_type_inference() {
        assert_eq!(
            extract_query_info("health insurance claim").policy_type.as_deref(),
            Some("health")
        );
        assert_eq!(
            extract_query_info("car accident claim").policy_type.as_deref(),
            Some("auto")
        );
        assert!(extract_query_info("knee surgery claim").policy_type.is_none());
    }

    #[test]
    fn empty_query_degrades_to_defaults() {
        let info = extract_query_info("   ");
        assert_eq!(info, QueryInfo::default());
    }

    #[test]
    fn unstructured_query_keeps_raw_text_only() {
        let info = extract_query_info("what does the contract say about renewals");
        assert!(info.age.is_none());
        assert!(info.procedure.is_none());
        assert_eq!(info.raw_query, "what does the contract say about renewals");
    }
}
