//! Batch driver: runs the fetch → extract → persist chain for each race
//! identifier, isolating failures per race. A failed race is recorded and
//! the batch keeps going; its last document is kept for postmortem when
//! configured.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::{AppConfig, OutputConfig};
use crate::error::ExtractionError;
use crate::fetch::{NetkeibaSource, RaceCardSource};
use crate::output::{dump_failure_artifact, CsvSink, SheetSink};

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, race_ids: &[String]) -> Result<PipelineStats> {
        let source = Arc::new(
            NetkeibaSource::new(&self.config).context("Failed to build race card source")?,
        );
        let sink = Arc::new(CsvSink::new(self.config.output.out_dir.clone()));
        self.run_with(source, sink, race_ids).await
    }

    /// The batch loop behind `run`, with the source and sink injectable.
    pub async fn run_with(
        &self,
        source: Arc<dyn RaceCardSource>,
        sink: Arc<dyn SheetSink>,
        race_ids: &[String],
    ) -> Result<PipelineStats> {
        info!("=== Extracting {} race(s) ===", race_ids.len());
        let _batch_time = crate::utils::Stopwatch::scope("batch");

        let sem = Arc::new(Semaphore::new(self.config.pipeline.concurrency.max(1)));
        let mut handles = Vec::new();

        for race_id in race_ids {
            let race_id = race_id.clone();
            let task_id = race_id.clone();
            let source = Arc::clone(&source);
            let sink = Arc::clone(&sink);
            let sem = Arc::clone(&sem);
            let output = self.config.output.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await?;

                match source.fetch_race_card(&task_id).await {
                    Ok(card) => {
                        let title = card.sheet_title();
                        let path = sink
                            .write_sheet(&title, &card.entries)
                            .with_context(|| format!("write sheet for {}", task_id))?;
                        info!("{}: {} entries -> {:?}", task_id, card.entries.len(), path);
                        Ok::<usize, anyhow::Error>(card.entries.len())
                    }
                    Err(e) => {
                        keep_failure_artifact(&output, &task_id, &e);
                        Err(anyhow::Error::from(e))
                    }
                }
            });

            handles.push((race_id, handle));
        }

        let mut stats = PipelineStats::default();
        for (race_id, handle) in handles {
            match handle.await {
                Ok(Ok(rows)) => {
                    stats.races_processed += 1;
                    stats.rows_written += rows;
                }
                Ok(Err(e)) => {
                    warn!("{}: {:#}", race_id, e);
                    stats.errors += 1;
                    stats.failures.push(format!("{}: {:#}", race_id, e));
                }
                Err(e) => {
                    error!("Task panic for {}: {}", race_id, e);
                    stats.errors += 1;
                    stats.failures.push(format!("{}: task panic: {}", race_id, e));
                }
            }
        }

        info!(
            "=== Done: {} races | {} rows | {} errors ===",
            stats.races_processed, stats.rows_written, stats.errors
        );
        Ok(stats)
    }
}

fn keep_failure_artifact(output: &OutputConfig, race_id: &str, e: &ExtractionError) {
    if !output.dump_failed_html {
        return;
    }
    let Some(html) = e.failure_artifact() else {
        return;
    };
    match dump_failure_artifact(&output.debug_dir, race_id, html) {
        Ok(path) => info!("{}: kept failure document at {:?}", race_id, path),
        Err(err) => warn!("{}: could not keep failure document: {:#}", race_id, err),
    }
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub races_processed: usize,
    pub rows_written: usize,
    pub errors: usize,
    pub failures: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryRecord, RaceCard, RaceMetadata};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Source whose listed race IDs fail with a terminal error; the rest
    /// succeed with a single-row card.
    struct StubSource {
        failing: HashSet<String>,
    }

    #[async_trait]
    impl RaceCardSource for StubSource {
        async fn fetch_race_card(&self, race_ref: &str) -> Result<RaceCard, ExtractionError> {
            if self.failing.contains(race_ref) {
                return Err(ExtractionError::NoQualifyingTable {
                    race_id: race_ref.to_string(),
                    last_document: None,
                });
            }
            Ok(RaceCard {
                race_id: race_ref.to_string(),
                entries: vec![EntryRecord {
                    entry_number: Some(1),
                    popularity_rank: Some(1),
                    odds: Some(2.4),
                    horse_name: "アアア".to_string(),
                    sex_age: None,
                    jockey_name: "武豊".to_string(),
                    weight_carried: Some(57.0),
                }],
                meta: RaceMetadata {
                    race_name: format!("race {}", race_ref),
                    ..Default::default()
                },
            })
        }
    }

    /// Records titles instead of touching the filesystem.
    #[derive(Default)]
    struct MemorySink {
        titles: Mutex<Vec<String>>,
    }

    impl SheetSink for MemorySink {
        fn write_sheet(&self, title: &str, _entries: &[EntryRecord]) -> Result<PathBuf> {
            self.titles.lock().unwrap().push(title.to_string());
            Ok(PathBuf::from(title))
        }
    }

    #[tokio::test]
    async fn failures_are_isolated_per_race() {
        let source = Arc::new(StubSource {
            failing: ["bad1", "bad2"].iter().map(|s| s.to_string()).collect(),
        });
        let sink = Arc::new(MemorySink::default());
        let pipeline = Pipeline::new(AppConfig::default());

        let ids: Vec<String> = ["good1", "bad1", "good2", "bad2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let stats = pipeline
            .run_with(source, Arc::clone(&sink) as Arc<dyn SheetSink>, &ids)
            .await
            .unwrap();

        assert_eq!(stats.races_processed, 2);
        assert_eq!(stats.rows_written, 2);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.failures.len(), 2);
        assert!(stats.failures.iter().any(|f| f.starts_with("bad1:")));
        assert!(stats.failures.iter().any(|f| f.starts_with("bad2:")));

        let titles = sink.titles.lock().unwrap();
        assert_eq!(titles.len(), 2);
        assert!(titles.iter().all(|t| t.starts_with("race good")));
    }

    #[tokio::test]
    async fn empty_batch_is_a_clean_no_op() {
        let source = Arc::new(StubSource {
            failing: HashSet::new(),
        });
        let sink = Arc::new(MemorySink::default());
        let stats = Pipeline::new(AppConfig::default())
            .run_with(source, sink, &[])
            .await
            .unwrap();
        assert_eq!(stats.races_processed, 0);
        assert_eq!(stats.errors, 0);
    }
}
