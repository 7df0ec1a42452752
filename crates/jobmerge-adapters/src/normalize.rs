//! Field canonicalization shared by both source adapters.
//!
//! Every function here is total: malformed input degrades to an empty string
//! or an absent date instead of an error.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static DATE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})|(\d{4})\.(\d{2})\.(\d{2})").expect("valid date regex")
});

static BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[()\[\]{}]").expect("valid bracket regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Legal-entity abbreviations expanded to their registered form.
pub const LEGAL_ENTITY_ABBREVIATIONS: &[(&str, &str)] = &[("(주)", "주식회사"), ("㈜", "주식회사")];

/// Boilerplate phrases appended to company names by the listing sites.
/// Longest first so the shorter phrase never eats part of the longer one.
pub const BOILERPLATE_SUFFIXES: &[&str] = &["벤처기업부설연구소", "기업부설연구소"];

/// A date-shaped token in scan order. `None` when the digits do not form a
/// real calendar date (e.g. `2025-02-30`).
pub fn date_tokens(input: &str) -> Vec<Option<NaiveDate>> {
    DATE_TOKEN
        .captures_iter(input)
        .map(|caps| {
            let (y, m, d) = if caps.get(1).is_some() { (1, 2, 3) } else { (4, 5, 6) };
            let year = caps.get(y)?.as_str().parse::<i32>().ok()?;
            let month = caps.get(m)?.as_str().parse::<u32>().ok()?;
            let day = caps.get(d)?.as_str().parse::<u32>().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })
        .collect()
}

/// Deadline of a listing date field: always the last embedded date.
///
/// Handles `YYYY-MM-DD/YYYY-MM-DD`, a single `YYYY-MM-DD`, and one or two
/// concatenated `YYYY.MM.DD` tokens. Earlier tokens are registration dates.
pub fn extract_deadline(input: Option<&str>) -> Option<NaiveDate> {
    date_tokens(input?).into_iter().last().flatten()
}

/// Registration date embedded in a combined `start/end` field, if the field
/// carries two tokens.
pub fn extract_embedded_registration(input: Option<&str>) -> Option<NaiveDate> {
    let tokens = date_tokens(input?);
    if tokens.len() < 2 {
        return None;
    }
    tokens.into_iter().next().flatten()
}

/// First date in a single-date column such as `작성일` or `등록일`.
pub fn extract_first_date(input: Option<&str>) -> Option<NaiveDate> {
    date_tokens(input?).into_iter().next().flatten()
}

pub fn collapse_whitespace(input: &str) -> String {
    WHITESPACE.replace_all(input, " ").trim().to_string()
}

/// Canonical company name used for similarity scoring and job keys.
///
/// Idempotent: `canonical_company(Some(&canonical_company(x))) == canonical_company(x)`.
pub fn canonical_company(input: Option<&str>) -> String {
    let Some(raw) = input else {
        return String::new();
    };

    let mut name = raw.to_string();
    for (abbreviation, expanded) in LEGAL_ENTITY_ABBREVIATIONS {
        name = name.replace(abbreviation, &format!(" {expanded} "));
    }
    let mut name = BRACKETS.replace_all(&name, "").into_owned();

    // Replaced with a space so removal can never splice a new occurrence.
    for suffix in BOILERPLATE_SUFFIXES {
        name = name.replace(suffix, " ");
    }

    collapse_whitespace(&name)
}

pub fn canonical_title(input: Option<&str>) -> String {
    input.map(collapse_whitespace).unwrap_or_default()
}
