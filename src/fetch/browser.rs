//! Render-wait controller over a scoped headless-Chrome session.
//!
//! The controller walks an explicit phase ladder instead of sprinkling
//! sleeps: `Navigating → DomReady → TabSelected → ContentPresent →
//! (DataReady) → Done`, with `TimedOut` as the terminal degradation. A
//! timed-out render still yields whatever document exists; in-flight
//! loading is halted before the snapshot so a half-streamed page is never
//! captured.

use std::ffi::OsStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, trace, warn};

use crate::config::BrowserConfig;

/// JS predicate: some odds/popularity cell holds a numeric value, with an
/// optional 倍 unit. Those cells are populated asynchronously after the row
/// skeleton appears, so row presence alone is not data readiness.
const VALUES_READY_JS: &str = r#"
(() => {
  const nodes = document.querySelectorAll('td.Popular, td.Odds, .Popular, .Odds');
  for (const n of nodes) {
    const t = (n.textContent || '').trim();
    if (/^\d+(?:\.\d+)?$/.test(t)) return true;
    if (/\d+(?:\.\d+)?\s*倍/.test(t)) return true;
  }
  return false;
})()
"#;

/// Progress of one render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RenderPhase {
    Navigating,
    DomReady,
    TabSelected,
    ContentPresent,
    DataReady,
    Done,
    TimedOut,
}

/// What one render pass should wait for.
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    /// Structural selectors whose presence means the target content landed.
    pub wait_selectors: Vec<String>,
    /// Clickable labels that switch the page to the entries view.
    pub tab_labels: Vec<String>,
    /// Also wait until value cells turn numeric.
    pub wait_values: bool,
}

/// Best-effort result of a render pass.
#[derive(Debug)]
pub struct RenderSnapshot {
    pub html: String,
    /// Furthest readiness phase the controller confirmed.
    pub reached: RenderPhase,
    pub timed_out: bool,
}

impl RenderSnapshot {
    /// Terminal state of the controller run.
    pub fn terminal(&self) -> RenderPhase {
        if self.timed_out {
            RenderPhase::TimedOut
        } else {
            RenderPhase::Done
        }
    }
}

/// A scoped browser session. The underlying Chrome process dies with this
/// value on every exit path, including panics in the caller.
pub struct BrowserSession {
    _browser: Browser,
    tab: Arc<Tab>,
    config: BrowserConfig,
}

impl BrowserSession {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .idle_browser_timeout(Duration::from_secs(config.render_deadline_secs + 30))
            .args(vec![
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-software-rasterizer"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--blink-settings=imagesEnabled=false"),
                OsStr::new("--lang=ja-JP"),
            ])
            .build()
            .map_err(|e| anyhow!("browser launch options: {e}"))?;

        let browser = Browser::new(options).context("Failed to launch headless browser")?;
        let tab = browser.new_tab().context("Failed to open browser tab")?;

        Ok(Self {
            _browser: browser,
            tab,
            config: config.clone(),
        })
    }

    /// Drive the page at `url` until the requested readiness level or the
    /// hard deadline, then snapshot.
    pub fn render(&self, url: &str, request: &RenderRequest) -> Result<RenderSnapshot> {
        let deadline = Instant::now() + Duration::from_secs(self.config.render_deadline_secs);
        let mut phase = RenderPhase::Navigating;

        // Navigation timeouts are survivable; the page often streams in anyway
        if let Err(e) = self.tab.navigate_to(url) {
            warn!("navigate to {} failed, continuing: {:#}", url, e);
        }

        if self.wait_dom_ready(deadline) {
            phase = RenderPhase::DomReady;
        }

        if phase >= RenderPhase::DomReady && self.select_tab(&request.tab_labels) {
            phase = RenderPhase::TabSelected;
        }

        if self.wait_content(&request.wait_selectors, deadline) {
            phase = RenderPhase::ContentPresent;
        }

        if request.wait_values
            && phase >= RenderPhase::ContentPresent
            && self.wait_values(deadline)
        {
            phase = RenderPhase::DataReady;
        }

        let timed_out = Instant::now() >= deadline;
        self.halt_loading();
        let html = self
            .tab
            .get_content()
            .context("Failed to snapshot rendered document")?;

        debug!(
            "render of {} reached {:?} (timed_out={})",
            url, phase, timed_out
        );
        Ok(RenderSnapshot {
            html,
            reached: phase,
            timed_out,
        })
    }

    /// Last-resort pass: navigate, walk through the scripted scroll
    /// offsets to provoke lazy loading, halt, snapshot.
    pub fn render_scrolled(&self, url: &str) -> Result<RenderSnapshot> {
        let deadline = Instant::now() + Duration::from_secs(self.config.render_deadline_secs);

        if let Err(e) = self.tab.navigate_to(url) {
            warn!("navigate to {} failed, continuing: {:#}", url, e);
        }
        let dom_ready = self.wait_dom_ready(deadline);

        for offset in &self.config.scroll_offsets {
            let _ = self
                .tab
                .evaluate(&format!("window.scrollTo(0, {});", offset), false);
            thread::sleep(Duration::from_millis(self.config.scroll_pause_ms));
        }

        self.halt_loading();
        let html = self
            .tab
            .get_content()
            .context("Failed to snapshot scrolled document")?;

        Ok(RenderSnapshot {
            html,
            reached: if dom_ready {
                RenderPhase::DomReady
            } else {
                RenderPhase::Navigating
            },
            timed_out: Instant::now() >= deadline,
        })
    }

    // ── Phase transitions ─────────────────────────────────────────────────────

    fn wait_dom_ready(&self, deadline: Instant) -> bool {
        while Instant::now() < deadline {
            if matches!(
                self.ready_state().as_deref(),
                Some("interactive") | Some("complete")
            ) {
                return true;
            }
            thread::sleep(self.poll_interval());
        }
        false
    }

    /// Click the first clickable element carrying one of the expected tab
    /// labels. Best-effort: any failure here is silently skipped.
    fn select_tab(&self, labels: &[String]) -> bool {
        if labels.is_empty() {
            return false;
        }
        let Ok(elements) = self.tab.find_elements("a, button") else {
            return false;
        };
        for element in elements {
            let Ok(text) = element.get_inner_text() else {
                continue;
            };
            let text = text.trim();
            if labels.iter().any(|l| !l.is_empty() && text.contains(l.as_str()))
                && element.click().is_ok()
            {
                thread::sleep(Duration::from_millis(self.config.tab_pause_ms));
                return true;
            }
        }
        false
    }

    fn wait_content(&self, selectors: &[String], deadline: Instant) -> bool {
        if selectors.is_empty() {
            return false;
        }
        while Instant::now() < deadline {
            for selector in selectors {
                if self.tab.find_element(selector).is_ok() {
                    return true;
                }
            }
            // Nudge lazy loaders and look again
            let _ = self.tab.evaluate(
                &format!("window.scrollBy(0, {});", self.config.scroll_step_px),
                false,
            );
            thread::sleep(self.poll_interval());
        }
        false
    }

    fn wait_values(&self, deadline: Instant) -> bool {
        while Instant::now() < deadline {
            if let Ok(result) = self.tab.evaluate(VALUES_READY_JS, false) {
                if matches!(result.value, Some(serde_json::Value::Bool(true))) {
                    return true;
                }
            }
            thread::sleep(self.poll_interval());
        }
        false
    }

    /// Stop any in-flight load so the snapshot is not a half-streamed
    /// document.
    fn halt_loading(&self) {
        if !matches!(self.ready_state().as_deref(), Some("complete")) {
            if let Err(e) = self.tab.evaluate("window.stop();", false) {
                trace!("window.stop() failed: {:#}", e);
            }
        }
    }

    fn ready_state(&self) -> Option<String> {
        let result = self.tab.evaluate("document.readyState", false).ok()?;
        match result.value {
            Some(serde_json::Value::String(state)) => Some(state),
            _ => None,
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms.max(50))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order_reflects_progress() {
        assert!(RenderPhase::Navigating < RenderPhase::DomReady);
        assert!(RenderPhase::DomReady < RenderPhase::TabSelected);
        assert!(RenderPhase::TabSelected < RenderPhase::ContentPresent);
        assert!(RenderPhase::ContentPresent < RenderPhase::DataReady);
        assert!(RenderPhase::DataReady < RenderPhase::Done);
    }

    #[test]
    fn values_predicate_accepts_unit_suffix() {
        // The embedded predicate mirrors these shapes; keep them in sync
        let numeric = regex::Regex::new(r"^\d+(?:\.\d+)?$").unwrap();
        let with_unit = regex::Regex::new(r"\d+(?:\.\d+)?\s*倍").unwrap();
        assert!(numeric.is_match("1.7"));
        assert!(numeric.is_match("12"));
        assert!(!numeric.is_match("--"));
        assert!(with_unit.is_match("4.1倍"));
        assert!(with_unit.is_match("12 倍"));
    }
}
