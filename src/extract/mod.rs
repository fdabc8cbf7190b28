//! Document → typed rows: grid discovery, column mapping, normalization,
//! plus the independent race-metadata extractor.

pub mod columns;
pub mod grid;
pub mod metadata;
pub mod normalize;

use tracing::debug;

use crate::models::{EntryRecord, Variant};

/// Walk every candidate grid in document order; the first one whose columns
/// pass the variant's quorum is normalized and returned. `None` means the
/// caller should escalate to the next fetch tier.
pub fn extract_entries(html: &str, variant: Variant) -> Option<Vec<EntryRecord>> {
    for (index, grid) in grid::extract_grids(html).iter().enumerate() {
        let Some(mapping) = columns::map_columns(grid, variant) else {
            continue;
        };
        let records = normalize::records_from_grid(grid, &mapping);
        if records.is_empty() {
            debug!("table {} mapped but held no usable rows", index);
            continue;
        }
        return Some(records);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // The qualifying table is not the first one on the page.
    #[test]
    fn decoy_tables_are_passed_over() {
        let html = r#"
        <table>
            <tr><th>日付</th><th>レース</th></tr>
            <tr><td>10/26</td><td>天皇賞</td></tr>
        </table>
        <table>
            <tr><th>馬番</th><th>人気</th><th>単勝</th><th>馬名</th><th>騎手</th><th>斤量</th></tr>
            <tr><td>1</td><td>3</td><td>6.8</td><td>アアア</td><td>武豊</td><td>57.0</td></tr>
            <tr><td>2</td><td>1</td><td>2.1</td><td>イイイ</td><td>川田</td><td>56.0</td></tr>
        </table>"#;
        let entries = extract_entries(html, Variant::Basic).unwrap();
        assert_eq!(entries.len(), 2);
        // ordered by popularity, not page order
        assert_eq!(entries[0].horse_name, "イイイ");
    }

    #[test]
    fn mapped_but_empty_table_does_not_qualify() {
        let html = r#"
        <table>
            <tr><th>馬番</th><th>人気</th><th>単勝</th><th>馬名</th><th>騎手</th><th>斤量</th></tr>
        </table>"#;
        assert!(extract_entries(html, Variant::Basic).is_none());
    }

    #[test]
    fn quorum_gate_applies_per_variant() {
        let html = r#"
        <table>
            <tr><th>馬番</th><th>人気</th><th>単勝</th><th>馬名</th><th>騎手</th><th>斤量</th></tr>
            <tr><td>1</td><td>1</td><td>1.5</td><td>アアア</td><td>武豊</td><td>57.0</td></tr>
        </table>"#;
        assert!(extract_entries(html, Variant::Basic).is_some());
        assert!(extract_entries(html, Variant::Extended).is_none());
    }
}
