//! Per-field cleanup of raw cell text into typed values.
//!
//! Every rule degrades to `None` (or an empty string) instead of failing,
//! and every rule is idempotent: re-normalizing clean output changes
//! nothing.

use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;

use crate::extract::columns::{CanonicalField, FieldMapping};
use crate::models::{CandidateGrid, EntryRecord};

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("digits pattern"));
static DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("decimal pattern"));
static SEX_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"牡|牝|セ|騸|騙").expect("sex value pattern"));

/// First run of digits, or None.
pub fn first_digits(s: &str) -> Option<u32> {
    DIGITS_RE.find(s).and_then(|m| m.as_str().parse().ok())
}

/// Odds: strip the 倍 unit and grouping commas, parse as decimal.
pub fn parse_odds(s: &str) -> Option<f64> {
    let cleaned = s.replace('倍', "").replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Weight: first integer-or-decimal token.
pub fn parse_weight(s: &str) -> Option<f64> {
    DECIMAL_RE.find(s).and_then(|m| m.as_str().parse().ok())
}

/// Collapse internal whitespace runs to single spaces, trim the ends.
pub fn clean_name(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sex/age composites carry no meaningful whitespace at all.
pub fn clean_sex_age(s: &str) -> String {
    s.split_whitespace().collect()
}

/// Build typed records from a mapped grid. Rows without a horse name are
/// dropped; the result is ordered by popularity rank then entry number,
/// None keys last, stable.
pub fn records_from_grid(grid: &CandidateGrid, mapping: &FieldMapping) -> Vec<EntryRecord> {
    let mut records: Vec<EntryRecord> = grid
        .rows
        .iter()
        .filter_map(|row| record_from_row(row, mapping))
        .collect();
    sort_entries(&mut records);
    records
}

fn record_from_row(row: &[String], mapping: &FieldMapping) -> Option<EntryRecord> {
    let cell = |field: CanonicalField| -> &str {
        mapping
            .column(field)
            .and_then(|i| row.get(i))
            .map(String::as_str)
            .unwrap_or("")
    };

    let horse_name = clean_name(cell(CanonicalField::HorseName));
    if horse_name.is_empty() {
        return None;
    }

    let sex_age = if mapping.column(CanonicalField::SexAge).is_some() {
        let value = clean_sex_age(cell(CanonicalField::SexAge));
        (!value.is_empty()).then_some(value)
    } else if let Some((sex_col, age_col)) = mapping.sex_age_parts {
        synthesize_sex_age(
            row.get(sex_col).map(String::as_str).unwrap_or(""),
            row.get(age_col).map(String::as_str).unwrap_or(""),
        )
    } else {
        None
    };

    Some(EntryRecord {
        entry_number: first_digits(cell(CanonicalField::EntryNumber)),
        popularity_rank: first_digits(cell(CanonicalField::PopularityRank)),
        odds: parse_odds(cell(CanonicalField::Odds)),
        horse_name,
        sex_age,
        jockey_name: clean_name(cell(CanonicalField::JockeyName)),
        weight_carried: parse_weight(cell(CanonicalField::WeightCarried)),
    })
}

/// "牡" + "3歳" → "牡3". Either part may be absent.
fn synthesize_sex_age(sex: &str, age: &str) -> Option<String> {
    let sex = SEX_VALUE_RE.find(sex).map(|m| m.as_str()).unwrap_or("");
    let age = first_digits(age)
        .map(|n| n.to_string())
        .unwrap_or_default();
    let combined = format!("{}{}", sex, age);
    (!combined.is_empty()).then_some(combined)
}

/// Stable sort by (popularity_rank, entry_number), None keys after all
/// present keys.
pub fn sort_entries(entries: &mut [EntryRecord]) {
    entries.sort_by(|a, b| {
        nulls_last(a.popularity_rank, b.popularity_rank)
            .then_with(|| nulls_last(a.entry_number, b.entry_number))
    });
}

fn nulls_last(a: Option<u32>, b: Option<u32>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
