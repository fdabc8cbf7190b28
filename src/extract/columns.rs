//! Maps noisy raw column names onto canonical entry fields.
//!
//! Each canonical field has a primary pattern; a looser second pass fills
//! gaps only and never overrides an existing assignment. A grid is accepted
//! only when the variant's full quorum of fields is mapped. The mapping is
//! injective in both directions: a claimed column is never reused and a
//! field is never mapped twice.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::models::{CandidateGrid, Variant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    EntryNumber,
    PopularityRank,
    Odds,
    HorseName,
    JockeyName,
    WeightCarried,
    SexAge,
}

const BASIC_FIELDS: [CanonicalField; 6] = [
    CanonicalField::EntryNumber,
    CanonicalField::PopularityRank,
    CanonicalField::Odds,
    CanonicalField::HorseName,
    CanonicalField::JockeyName,
    CanonicalField::WeightCarried,
];

const EXTENDED_FIELDS: [CanonicalField; 7] = [
    CanonicalField::EntryNumber,
    CanonicalField::PopularityRank,
    CanonicalField::Odds,
    CanonicalField::HorseName,
    CanonicalField::JockeyName,
    CanonicalField::WeightCarried,
    CanonicalField::SexAge,
];

impl Variant {
    pub fn required_fields(self) -> &'static [CanonicalField] {
        match self {
            Variant::Basic => &BASIC_FIELDS,
            Variant::Extended => &EXTENDED_FIELDS,
        }
    }

    /// Minimum number of distinct mapped fields for a grid to qualify.
    pub fn quorum(self) -> usize {
        self.required_fields().len()
    }
}

// ── Patterns ──────────────────────────────────────────────────────────────────

static ENTRY_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"馬\s*番").expect("entry number pattern"));
static RANK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"人気").expect("rank pattern"));
static ODDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"オッズ|単勝").expect("odds pattern"));
static HORSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"馬\s*名|名前").expect("horse pattern"));
static JOCKEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"騎手|ジョッキー").expect("jockey pattern"));
static WEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"斤量|負担重量|負担重|重量").expect("weight pattern"));
static SEX_AGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"性\s*齢|性別?\s*年齢|年齢\s*[／/]\s*性別?").expect("sex/age pattern")
});

// Gap-filling substitutes, tried only for fields the primary pass missed
static FRAME_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"枠\s*番").expect("frame number pattern"));
static MARK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"印|予想印").expect("mark pattern"));
static ODDS_ALT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"単勝|勝率|オッズ").expect("odds substitute pattern"));

// Split sex/age columns, for tables without a combined one
static SEX_COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(性|性別)$").expect("sex column pattern"));
static AGE_COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(年齢|年令|age)$").expect("age column pattern"));

fn primary_pattern(field: CanonicalField) -> &'static Regex {
    match field {
        CanonicalField::EntryNumber => &ENTRY_NUMBER_RE,
        CanonicalField::PopularityRank => &RANK_RE,
        CanonicalField::Odds => &ODDS_RE,
        CanonicalField::HorseName => &HORSE_RE,
        CanonicalField::JockeyName => &JOCKEY_RE,
        CanonicalField::WeightCarried => &WEIGHT_RE,
        CanonicalField::SexAge => &SEX_AGE_RE,
    }
}

fn fallback_pattern(field: CanonicalField) -> Option<&'static Regex> {
    match field {
        CanonicalField::EntryNumber => Some(&FRAME_NUMBER_RE),
        CanonicalField::PopularityRank => Some(&MARK_RE),
        CanonicalField::Odds => Some(&ODDS_ALT_RE),
        CanonicalField::JockeyName => Some(&JOCKEY_RE),
        CanonicalField::WeightCarried => Some(&WEIGHT_RE),
        _ => None,
    }
}

// ── Mapping ───────────────────────────────────────────────────────────────────

/// Injective association from canonical fields to column indices.
#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
    slots: Vec<(CanonicalField, usize)>,
    /// Columns holding separate sex and age values, when sex/age had to be
    /// synthesized instead of read from one column.
    pub sex_age_parts: Option<(usize, usize)>,
    claimed: HashSet<usize>,
}

impl FieldMapping {
    pub fn column(&self, field: CanonicalField) -> Option<usize> {
        self.slots
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, col)| *col)
    }

    /// Number of distinct canonical fields this mapping covers.
    pub fn field_count(&self) -> usize {
        self.slots.len() + usize::from(self.sex_age_parts.is_some())
    }

    fn claim(&mut self, field: CanonicalField, col: usize) -> bool {
        if self.column(field).is_some() || self.claimed.contains(&col) {
            return false;
        }
        self.slots.push((field, col));
        self.claimed.insert(col);
        true
    }

    fn claim_sex_age_parts(&mut self, sex_col: usize, age_col: usize) -> bool {
        if self.sex_age_parts.is_some()
            || self.column(CanonicalField::SexAge).is_some()
            || self.claimed.contains(&sex_col)
            || self.claimed.contains(&age_col)
        {
            return false;
        }
        self.sex_age_parts = Some((sex_col, age_col));
        self.claimed.insert(sex_col);
        self.claimed.insert(age_col);
        true
    }

    fn is_unclaimed(&self, col: usize) -> bool {
        !self.claimed.contains(&col)
    }
}

/// Map a grid's columns onto the variant's canonical fields, or reject the
/// grid when the quorum cannot be met.
pub fn map_columns(grid: &CandidateGrid, variant: Variant) -> Option<FieldMapping> {
    let headers = &grid.headers;
    let mut mapping = FieldMapping::default();

    // Primary pass: first matching unclaimed column per field, fixed order
    for &field in variant.required_fields() {
        if let Some(col) = find_column(headers, primary_pattern(field), &mapping) {
            mapping.claim(field, col);
        }
    }

    // Same-table synthesis: split sex and age columns stand in for a
    // combined one
    if variant == Variant::Extended && mapping.column(CanonicalField::SexAge).is_none() {
        let sex_col = find_column(headers, &SEX_COLUMN_RE, &mapping);
        let age_col = find_column(headers, &AGE_COLUMN_RE, &mapping);
        if let (Some(sex_col), Some(age_col)) = (sex_col, age_col) {
            if sex_col != age_col {
                mapping.claim_sex_age_parts(sex_col, age_col);
            }
        }
    }

    // Secondary pass: fill remaining gaps with looser substitutes, never
    // overriding an existing assignment
    if mapping.field_count() < variant.quorum() {
        for &field in variant.required_fields() {
            if mapping.column(field).is_some() {
                continue;
            }
            if let Some(pattern) = fallback_pattern(field) {
                if let Some(col) = find_column(headers, pattern, &mapping) {
                    mapping.claim(field, col);
                }
            }
        }
    }

    if mapping.field_count() >= variant.quorum() {
        Some(mapping)
    } else {
        None
    }
}

fn find_column(headers: &[String], pattern: &Regex, mapping: &FieldMapping) -> Option<usize> {
    headers
        .iter()
        .enumerate()
        .find(|(i, name)| mapping.is_unclaimed(*i) && pattern.is_match(name))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateGrid;

    fn grid(headers: &[&str]) -> CandidateGrid {
        CandidateGrid {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: vec![],
        }
    }

    #[test]
    fn standard_entry_header_maps_fully() {
        let g = grid(&["枠番", "馬番", "人気", "単勝", "馬名", "騎手", "斤量"]);
        let m = map_columns(&g, Variant::Basic).unwrap();
        assert_eq!(m.column(CanonicalField::EntryNumber), Some(1));
        assert_eq!(m.column(CanonicalField::PopularityRank), Some(2));
        assert_eq!(m.column(CanonicalField::Odds), Some(3));
        assert_eq!(m.column(CanonicalField::HorseName), Some(4));
        assert_eq!(m.column(CanonicalField::JockeyName), Some(5));
        assert_eq!(m.column(CanonicalField::WeightCarried), Some(6));
    }

    #[test]
    fn mapping_is_injective() {
        let g = grid(&["枠番", "馬番", "人気", "単勝", "馬名", "騎手", "斤量"]);
        let m = map_columns(&g, Variant::Basic).unwrap();
        let cols: Vec<usize> = Variant::Basic
            .required_fields()
            .iter()
            .filter_map(|&f| m.column(f))
            .collect();
        let distinct: HashSet<usize> = cols.iter().copied().collect();
        assert_eq!(cols.len(), distinct.len());
    }

    #[test]
    fn frame_number_substitutes_when_no_entry_column() {
        let g = grid(&["枠番", "人気", "単勝", "馬名", "騎手", "斤量"]);
        let m = map_columns(&g, Variant::Basic).unwrap();
        assert_eq!(m.column(CanonicalField::EntryNumber), Some(0));
    }

    #[test]
    fn win_rate_fills_missing_odds_without_overriding() {
        let g = grid(&["馬番", "人気", "馬名", "騎手", "斤量", "勝率"]);
        let m = map_columns(&g, Variant::Basic).unwrap();
        assert_eq!(m.column(CanonicalField::Odds), Some(5));

        // A real odds column keeps priority over the substitute
        let g = grid(&["馬番", "人気", "オッズ", "馬名", "騎手", "斤量", "勝率"]);
        let m = map_columns(&g, Variant::Basic).unwrap();
        assert_eq!(m.column(CanonicalField::Odds), Some(2));
    }

    #[test]
    fn prediction_mark_substitutes_for_rank() {
        let g = grid(&["馬番", "予想印", "単勝", "馬名", "騎手", "斤量"]);
        let m = map_columns(&g, Variant::Basic).unwrap();
        assert_eq!(m.column(CanonicalField::PopularityRank), Some(1));
    }

    #[test]
    fn below_quorum_grid_is_rejected() {
        assert!(map_columns(&grid(&["馬番", "馬名", "騎手"]), Variant::Basic).is_none());
        // Six mapped fields are not enough for the extended variant
        assert!(map_columns(
            &grid(&["馬番", "人気", "単勝", "馬名", "騎手", "斤量"]),
            Variant::Extended
        )
        .is_none());
    }

    #[test]
    fn extended_variant_accepts_combined_sex_age_column() {
        let g = grid(&["馬番", "人気", "単勝", "馬名", "性齢", "騎手", "斤量"]);
        let m = map_columns(&g, Variant::Extended).unwrap();
        assert_eq!(m.column(CanonicalField::SexAge), Some(4));
        assert!(m.sex_age_parts.is_none());
    }

    #[test]
    fn extended_variant_synthesizes_from_split_columns() {
        let g = grid(&["馬番", "人気", "単勝", "馬名", "性別", "年齢", "騎手", "斤量"]);
        let m = map_columns(&g, Variant::Extended).unwrap();
        assert_eq!(m.column(CanonicalField::SexAge), None);
        assert_eq!(m.sex_age_parts, Some((4, 5)));
        assert_eq!(m.field_count(), 7);
    }

    #[test]
    fn one_column_never_serves_two_fields() {
        // 単勝人気 satisfies the rank pattern first; odds must then find its
        // own column or the grid fails quorum
        let g = grid(&["馬番", "単勝人気", "馬名", "騎手", "斤量"]);
        assert!(map_columns(&g, Variant::Basic).is_none());
    }
}
