use thiserror::Error;

/// Typed failures of the extraction ladder.
///
/// `Transport` and `Render` are per-tier failures: the orchestrator logs
/// them and escalates to the next tier instead of surfacing them. Only
/// `NoQualifyingTable` is terminal, and only after every tier has been
/// tried. It carries the last document obtained so a diagnostics consumer
/// can persist it for offline inspection.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Static fetch failed after its bounded transport retries.
    #[error("transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    /// The browser tier could not launch or snapshot a session. Render
    /// timeouts are NOT this error, they degrade to best-effort snapshots.
    #[error("render failure for {url}: {message}")]
    Render { url: String, message: String },

    /// Every tier ran and none produced a grid passing the column quorum.
    #[error("no qualifying entry table for race {race_id}")]
    NoQualifyingTable {
        race_id: String,
        last_document: Option<String>,
    },
}

impl ExtractionError {
    /// The document to keep for postmortem, if any tier got one at all.
    pub fn failure_artifact(&self) -> Option<&str> {
        match self {
            ExtractionError::NoQualifyingTable {
                last_document: Some(doc),
                ..
            } => Some(doc),
            _ => None,
        }
    }
}
