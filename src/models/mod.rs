use serde::{Deserialize, Serialize};

// ── Raw document ──────────────────────────────────────────────────────────────

/// Decoded page text plus its source URL. Immutable once produced.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub url: String,
    pub text: String,
}

// ── Candidate grid ────────────────────────────────────────────────────────────

/// One table lifted out of a document: flattened header names plus body rows
/// of raw cell text. Many per document, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateGrid {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

// ── Entry record ──────────────────────────────────────────────────────────────

/// One normalized row of a race entry table.
///
/// Every field except `horse_name` degrades to `None`/empty on bad input;
/// rows without a horse name are dropped before they reach a sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryRecord {
    pub entry_number: Option<u32>,
    pub popularity_rank: Option<u32>,
    pub odds: Option<f64>,
    pub horse_name: String,
    pub sex_age: Option<String>,
    pub jockey_name: String,
    pub weight_carried: Option<f64>,
}

// ── Race metadata ─────────────────────────────────────────────────────────────

/// Header-level facts about one race. Every field is independently optional;
/// a partially populated record is still usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RaceMetadata {
    /// YYYYMMDD, validated as a real calendar date.
    pub race_date: Option<String>,
    pub race_name: String,
    pub venue: Option<String>,
    /// Normalized as "<digits>R", e.g. "11R".
    pub race_number: Option<String>,
    /// Course / start time / weather / going line, whitespace-collapsed.
    pub course_detail: Option<String>,
    /// Meeting / class line, whitespace-collapsed.
    pub class_detail: Option<String>,
}

impl RaceMetadata {
    /// Human-readable sheet title: "東京11R_天皇賞" when venue and race
    /// number are known, otherwise just the race name. `None` when even the
    /// name is missing; callers fall back to an identifier-based title.
    pub fn sheet_title(&self) -> Option<String> {
        if self.race_name.is_empty() {
            return None;
        }
        match (&self.venue, &self.race_number) {
            (Some(venue), Some(rnum)) => {
                Some(format!("{}{}_{}", venue, rnum, self.race_name))
            }
            _ => Some(self.race_name.clone()),
        }
    }
}

// ── Race card ─────────────────────────────────────────────────────────────────

/// The pipeline's unit of output: normalized entries plus metadata for one
/// race, ready to hand to a sheet sink.
#[derive(Debug, Clone)]
pub struct RaceCard {
    pub race_id: String,
    pub entries: Vec<EntryRecord>,
    pub meta: RaceMetadata,
}

impl RaceCard {
    pub fn sheet_title(&self) -> String {
        self.meta
            .sheet_title()
            .unwrap_or_else(|| format!("race_{}", self.race_id))
    }
}

// ── Page variant ──────────────────────────────────────────────────────────────

/// Which shape of entry page is being scraped. Selects the canonical field
/// set and quorum used by the column mapper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Plain entry list: entry number, popularity, odds, horse, jockey, weight.
    #[default]
    Basic,
    /// Entry list that also carries a sex/age column.
    Extended,
}
