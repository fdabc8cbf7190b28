//! Fetching: static HTTP first, then a rendered-browser fallback, then a
//! rendered-browser-with-scroll fallback. Each tier is tried only when the
//! previous one failed to yield a grid that passes the column quorum.

pub mod browser;
pub mod encoding;
pub mod http_client;

use async_trait::async_trait;
use encoding_rs::Encoding;
use tracing::{debug, warn};
use url::Url;

use crate::config::{AppConfig, BrowserConfig, FetcherConfig};
use crate::error::ExtractionError;
use crate::extract;
use crate::extract::metadata;
use crate::models::{EntryRecord, RaceCard, RaceMetadata, RawDocument, Variant};

use self::browser::{BrowserSession, RenderRequest};
use self::http_client::HttpClient;

/// Structural markers whose presence means the entry table has landed.
const CONTENT_SELECTORS: [&str; 6] = [
    ".Shutuba_Table",
    "table.Shutuba_Table",
    ".RaceTable01",
    "table.RaceTable01",
    ".Shutuba_Table tbody tr",
    ".RaceTable01 tbody tr",
];

/// Clickable labels that switch a race page to its entries view.
const ENTRIES_TAB_LABELS: [&str; 3] = ["出馬表", "出馬", "枠順"];

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable race-card source abstraction.
#[async_trait]
pub trait RaceCardSource: Send + Sync {
    async fn fetch_race_card(&self, race_ref: &str) -> Result<RaceCard, ExtractionError>;
}

// ── netkeiba source ───────────────────────────────────────────────────────────

pub struct NetkeibaSource {
    client: HttpClient,
    browser_config: BrowserConfig,
    fetcher_config: FetcherConfig,
    variant: Variant,
    base_url: String,
}

impl NetkeibaSource {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: HttpClient::new(&config.fetcher)?,
            browser_config: config.browser.clone(),
            fetcher_config: config.fetcher.clone(),
            variant: config.pipeline.variant,
            base_url: config.fetcher.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL for a race's entry listing page.
    fn race_card_url(&self, race_id: &str) -> String {
        format!("{}/race/shutuba.html?race_id={}", self.base_url, race_id)
    }

    /// Accept either a bare race identifier or a full page URL; return the
    /// identifier to report under and the URL to fetch.
    fn resolve_race_ref(&self, input: &str) -> (String, String) {
        if let Ok(parsed) = Url::parse(input) {
            if let Some((_, id)) = parsed.query_pairs().find(|(k, _)| k == "race_id") {
                return (id.into_owned(), input.to_string());
            }
            return (input.to_string(), input.to_string());
        }
        (input.to_string(), self.race_card_url(input))
    }

    fn fallback_encoding(&self) -> &'static Encoding {
        encoding::encoding_for_label(&self.fetcher_config.fallback_charset)
    }

    /// Static-fetch + decode a document. Diagnostic commands use this too.
    async fn static_document(&self, url: &str) -> Result<RawDocument, ExtractionError> {
        let body = self
            .client
            .get_bytes(url)
            .await
            .map_err(|e| ExtractionError::Transport {
                url: url.to_string(),
                message: format!("{e:#}"),
            })?;
        Ok(RawDocument {
            url: url.to_string(),
            text: encoding::resolve(&body, self.fallback_encoding()),
        })
    }

    async fn rendered_document(
        &self,
        url: &str,
        wait_values: bool,
    ) -> Result<String, ExtractionError> {
        let url_owned = url.to_string();
        let config = self.browser_config.clone();

        let render = tokio::task::spawn_blocking(move || {
            let session = BrowserSession::launch(&config)?;
            let request = RenderRequest {
                wait_selectors: CONTENT_SELECTORS.iter().map(|s| s.to_string()).collect(),
                tab_labels: ENTRIES_TAB_LABELS.iter().map(|s| s.to_string()).collect(),
                wait_values,
            };
            let snapshot = session.render(&url_owned, &request)?;
            debug!(
                "{}: render finished as {:?} after reaching {:?}",
                url_owned,
                snapshot.terminal(),
                snapshot.reached
            );
            Ok::<String, anyhow::Error>(snapshot.html)
        })
        .await;

        match render {
            Ok(Ok(html)) => Ok(html),
            Ok(Err(e)) => Err(ExtractionError::Render {
                url: url.to_string(),
                message: format!("{e:#}"),
            }),
            Err(e) => Err(ExtractionError::Render {
                url: url.to_string(),
                message: format!("render task join: {e}"),
            }),
        }
    }

    async fn scrolled_document(&self, url: &str) -> Result<String, ExtractionError> {
        let url_owned = url.to_string();
        let config = self.browser_config.clone();

        let render = tokio::task::spawn_blocking(move || {
            let session = BrowserSession::launch(&config)?;
            let snapshot = session.render_scrolled(&url_owned)?;
            debug!(
                "{}: scroll pass finished as {:?} after reaching {:?}",
                url_owned,
                snapshot.terminal(),
                snapshot.reached
            );
            Ok::<String, anyhow::Error>(snapshot.html)
        })
        .await;

        match render {
            Ok(Ok(html)) => Ok(html),
            Ok(Err(e)) => Err(ExtractionError::Render {
                url: url.to_string(),
                message: format!("{e:#}"),
            }),
            Err(e) => Err(ExtractionError::Render {
                url: url.to_string(),
                message: format!("render task join: {e}"),
            }),
        }
    }

    /// Static fetch + metadata only, for diagnostics.
    pub async fn probe_metadata(&self, race_ref: &str) -> anyhow::Result<RaceMetadata> {
        let (_, url) = self.resolve_race_ref(race_ref);
        let doc = self.static_document(&url).await?;
        Ok(metadata::extract_metadata(&doc.text))
    }

    /// Build a race card from a document that produced a qualifying grid.
    /// Metadata comes from the same document so both views describe the
    /// same render.
    fn card_from(&self, race_id: &str, html: &str, entries: Vec<EntryRecord>) -> RaceCard {
        RaceCard {
            race_id: race_id.to_string(),
            entries,
            meta: metadata::extract_metadata(html),
        }
    }
}

#[async_trait]
impl RaceCardSource for NetkeibaSource {
    async fn fetch_race_card(&self, race_ref: &str) -> Result<RaceCard, ExtractionError> {
        let (race_id, url) = self.resolve_race_ref(race_ref);
        let mut last_document: Option<String> = None;

        // ── Tier 1: static fetch ──────────────────────────────────────────────
        match self.static_document(&url).await {
            Ok(doc) => {
                debug!(
                    "{}: static document from {} ({} chars)",
                    race_id,
                    doc.url,
                    doc.text.len()
                );
                if let Some(entries) = extract::extract_entries(&doc.text, self.variant) {
                    debug!("{}: static tier yielded {} entries", race_id, entries.len());
                    return Ok(self.card_from(&race_id, &doc.text, entries));
                }
                debug!("{}: no qualifying table in static document", race_id);
                last_document = Some(doc.text);
            }
            Err(e) => warn!("{}: static tier failed, escalating: {}", race_id, e),
        }

        // ── Tier 2: rendered, waiting for numeric values ──────────────────────
        match self.rendered_document(&url, true).await {
            Ok(html) => {
                if let Some(entries) = extract::extract_entries(&html, self.variant) {
                    debug!("{}: dynamic tier yielded {} entries", race_id, entries.len());
                    return Ok(self.card_from(&race_id, &html, entries));
                }
                debug!("{}: no qualifying table in rendered document", race_id);
                last_document = Some(html);
            }
            Err(e) => warn!("{}: dynamic tier failed, escalating: {}", race_id, e),
        }

        // ── Tier 3: fresh session, scripted scroll ────────────────────────────
        match self.scrolled_document(&url).await {
            Ok(html) => {
                if let Some(entries) = extract::extract_entries(&html, self.variant) {
                    debug!("{}: scroll tier yielded {} entries", race_id, entries.len());
                    return Ok(self.card_from(&race_id, &html, entries));
                }
                debug!("{}: no qualifying table after scroll pass", race_id);
                last_document = Some(html);
            }
            Err(e) => warn!("{}: scroll tier failed: {}", race_id, e),
        }

        Err(ExtractionError::NoQualifyingTable {
            race_id,
            last_document,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn source() -> NetkeibaSource {
        NetkeibaSource::new(&AppConfig::default()).unwrap()
    }

    #[test]
    fn bare_id_becomes_entry_page_url() {
        let (id, url) = source().resolve_race_ref("202505040910");
        assert_eq!(id, "202505040910");
        assert_eq!(
            url,
            "https://race.netkeiba.com/race/shutuba.html?race_id=202505040910"
        );
    }

    #[test]
    fn full_url_keeps_its_race_id() {
        let input = "https://race.netkeiba.com/race/shutuba.html?race_id=202508030911&rf=x";
        let (id, url) = source().resolve_race_ref(input);
        assert_eq!(id, "202508030911");
        assert_eq!(url, input);
    }

    #[test]
    fn url_without_race_id_is_identified_by_itself() {
        let input = "https://race.netkeiba.com/race/shutuba.html";
        let (id, url) = source().resolve_race_ref(input);
        assert_eq!(id, input);
        assert_eq!(url, input);
    }

    // A static document whose odds cells have not populated fails quorum,
    // while the rendered snapshot of the same page qualifies. The ladder
    // surfaces only the success.
    #[test]
    fn static_miss_then_dynamic_hit_at_extraction_level() {
        let static_doc = r#"<table><thead><tr>
            <th>馬番</th><th>人気</th><th>単勝</th><th>馬名</th><th>騎手</th><th>斤量</th>
        </tr></thead><tbody></tbody></table>"#;
        let rendered_doc = r#"<table><thead><tr>
            <th>馬番</th><th>人気</th><th>単勝</th><th>馬名</th><th>騎手</th><th>斤量</th>
        </tr></thead><tbody><tr>
            <td>5</td><td>2</td><td>4.1倍</td><td>サンプルホース</td><td>山田太郎</td><td>54.0</td>
        </tr></tbody></table>"#;

        assert!(extract::extract_entries(static_doc, Variant::Basic).is_none());
        let entries = extract::extract_entries(rendered_doc, Variant::Basic).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].odds, Some(4.1));
    }
}
