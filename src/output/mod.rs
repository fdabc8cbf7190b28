//! Persistence seam. The pipeline hands a title and typed rows to a
//! [`SheetSink`]; everything past that point (workbook styling, collision
//! suffixes) is the sink's problem. The bundled implementation writes one
//! CSV per race.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::EntryRecord;

pub trait SheetSink: Send + Sync {
    /// Persist one race's rows under a human-readable title. Returns the
    /// location written.
    fn write_sheet(&self, title: &str, entries: &[EntryRecord]) -> Result<PathBuf>;
}

pub struct CsvSink {
    out_dir: PathBuf,
}

impl CsvSink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

impl SheetSink for CsvSink {
    fn write_sheet(&self, title: &str, entries: &[EntryRecord]) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("Could not create dir {:?}", self.out_dir))?;

        let path = self.out_dir.join(format!("{}.csv", sanitize_title(title)));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Could not open {:?}", path))?;
        for entry in entries {
            writer.serialize(entry)?;
        }
        writer.flush()?;
        Ok(path)
    }
}

/// Sheet-title sanitation: drop characters that are illegal in workbook
/// sheet names and on filesystems, cap at 31 characters.
pub fn sanitize_title(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '\\' | '/' | '*' | '?' | ':' | '[' | ']' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "sheet".to_string()
    } else {
        cleaned.chars().take(31).collect()
    }
}

/// Keep a failed extraction's last document where a human can open it.
pub fn dump_failure_artifact(dir: &Path, race_id: &str, html: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Could not create dir {:?}", dir))?;
    let path = dir.join(format!("debug_{}.html", sanitize_title(race_id)));
    fs::write(&path, html).with_context(|| format!("Could not write {:?}", path))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryRecord;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("racecard_etl_{}_{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn sanitize_replaces_hostile_characters() {
        assert_eq!(sanitize_title("東京11R_天皇賞"), "東京11R_天皇賞");
        assert_eq!(sanitize_title("a/b:c*d"), "a_b_c_d");
        assert_eq!(sanitize_title("  "), "sheet");
        assert_eq!(sanitize_title(&"あ".repeat(40)).chars().count(), 31);
    }

    #[test]
    fn csv_sink_writes_one_file_per_sheet() {
        let dir = temp_dir("csv");
        let sink = CsvSink::new(&dir);
        let entries = vec![EntryRecord {
            entry_number: Some(5),
            popularity_rank: Some(2),
            odds: Some(4.1),
            horse_name: "サンプルホース".to_string(),
            sex_age: None,
            jockey_name: "山田太郎".to_string(),
            weight_carried: Some(54.0),
        }];

        let path = sink.write_sheet("京都9R_秋明菊賞", &entries).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("horse_name"));
        assert!(written.contains("サンプルホース"));
        assert!(written.contains("4.1"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failure_artifact_lands_in_debug_dir() {
        let dir = temp_dir("debug");
        let path = dump_failure_artifact(&dir, "202505040910", "<html></html>").unwrap();
        assert!(path.ends_with("debug_202505040910.html"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "<html></html>");
        let _ = fs::remove_dir_all(&dir);
    }
}
