use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::Variant;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub fetcher: FetcherConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Static-fetch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_referer")]
    pub referer: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Charset used when neither the page nor detection yields one.
    #[serde(default = "default_fallback_charset")]
    pub fallback_charset: String,
}

/// Dynamic-render (headless browser) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    /// Hard deadline for one render pass; the controller returns whatever
    /// content exists when it elapses.
    #[serde(default = "default_render_deadline_secs")]
    pub render_deadline_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after clicking the entries tab, letting the content swap land.
    #[serde(default = "default_tab_pause_ms")]
    pub tab_pause_ms: u64,

    /// Nudge distance while polling for content, to provoke lazy loaders.
    #[serde(default = "default_scroll_step_px")]
    pub scroll_step_px: u32,

    /// Scripted scroll offsets for the last-resort scroll pass.
    #[serde(default = "default_scroll_offsets")]
    pub scroll_offsets: Vec<u32>,

    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,
}

/// Batch pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub variant: Variant,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    #[serde(default = "default_debug_dir")]
    pub debug_dir: PathBuf,

    /// Keep the last rendered document on total extraction failure.
    #[serde(default = "default_true")]
    pub dump_failed_html: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://race.netkeiba.com".to_string()
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_request_delay_ms() -> u64 {
    1200
}
fn default_jitter_ms() -> u64 {
    400
}
fn default_max_retries() -> u32 {
    3
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}
fn default_referer() -> String {
    "https://race.netkeiba.com/".to_string()
}
fn default_accept_language() -> String {
    "ja,en;q=0.9".to_string()
}
fn default_fallback_charset() -> String {
    "utf-8".to_string()
}
fn default_render_deadline_secs() -> u64 {
    60
}
fn default_poll_interval_ms() -> u64 {
    200
}
fn default_tab_pause_ms() -> u64 {
    300
}
fn default_scroll_step_px() -> u32 {
    400
}
fn default_scroll_offsets() -> Vec<u32> {
    vec![400, 800, 1200, 1600, 2000, 2800]
}
fn default_scroll_pause_ms() -> u64 {
    400
}
fn default_concurrency() -> usize {
    2
}
fn default_out_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_debug_dir() -> PathBuf {
    PathBuf::from("output/debug")
}
fn default_true() -> bool {
    true
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("RACECARD").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());
        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fetcher: FetcherConfig::default(),
            browser: BrowserConfig::default(),
            pipeline: PipelineConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            referer: default_referer(),
            accept_language: default_accept_language(),
            fallback_charset: default_fallback_charset(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            render_deadline_secs: default_render_deadline_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            tab_pause_ms: default_tab_pause_ms(),
            scroll_step_px: default_scroll_step_px(),
            scroll_offsets: default_scroll_offsets(),
            scroll_pause_ms: default_scroll_pause_ms(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            variant: Variant::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            debug_dir: default_debug_dir(),
            dump_failed_html: default_true(),
        }
    }
}
