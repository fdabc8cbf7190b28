//! Race header metadata, independent of the table pipeline.
//!
//! Every field is best-effort; the extractor always returns a record. The
//! race date runs through an ordered fallback chain and is only accepted
//! when it names a real calendar day.

use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

use crate::models::RaceMetadata;

static VENUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"札幌|函館|福島|新潟|東京|中山|中京|京都|阪神|小倉").expect("venue pattern")
});
static RACE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*R").expect("race number pattern"));
static RACE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"race_id=(\d{12})").expect("race id pattern"));
static MONTH_DAY_SLASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s*/\s*(\d{1,2})").expect("m/d pattern"));
static MONTH_DAY_KANJI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s*月\s*(\d{1,2})\s*日").expect("m月d日 pattern"));
static FULL_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日").expect("y年m月d日 pattern")
});
static SCRIPT_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""kaisai_date"\s*:\s*"(\d{8})""#).expect("script date pattern"));
static SCRIPT_DATE_ALT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"kaisaiDate\s*[:=]\s*"(\d{8})""#).expect("script date alt pattern")
});

pub fn extract_metadata(html: &str) -> RaceMetadata {
    let doc = Html::parse_document(html);

    let race_name = select_text(&doc, ".RaceName").unwrap_or_default();
    let course_detail = select_text(&doc, ".RaceData01");
    let class_detail = select_text(&doc, ".RaceData02");

    let venue = class_detail
        .as_deref()
        .and_then(|text| VENUE_RE.find(text))
        .map(|m| m.as_str().to_string());

    let race_number = extract_race_number(&doc);
    let race_date = extract_race_date(
        html,
        &doc,
        course_detail.as_deref(),
        class_detail.as_deref(),
    );

    RaceMetadata {
        race_date,
        race_name,
        venue,
        race_number,
        course_detail,
        class_detail,
    }
}

/// First element matching `selector`, text whitespace-collapsed. None when
/// the element is missing or empty.
fn select_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let element = doc.select(&sel).next()?;
    let text = element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

/// "<digits>R", from the dedicated element first, then anywhere in the page
/// text. "第10R" and "10 R" normalize to "10R".
fn extract_race_number(doc: &Html) -> Option<String> {
    let from_element = select_text(doc, ".RaceNum")
        .as_deref()
        .and_then(race_number_in);
    if from_element.is_some() {
        return from_element;
    }
    let page_text = doc.root_element().text().collect::<String>();
    race_number_in(&page_text)
}

fn race_number_in(text: &str) -> Option<String> {
    let caps = RACE_NUMBER_RE.captures(text)?;
    let number: u32 = caps[1].parse().ok()?;
    Some(format!("{}R", number))
}

/// Ordered fallback chain; each source is consulted only when the previous
/// one yielded nothing usable.
fn extract_race_date(
    html: &str,
    doc: &Html,
    course_detail: Option<&str>,
    class_detail: Option<&str>,
) -> Option<String> {
    active_marker_date(html, doc)
        .or_else(|| full_text_date(doc, course_detail, class_detail))
        .or_else(|| script_date(doc))
}

/// (a) The active day marker in the date strip gives month/day; the year
/// comes from the first embedded 12-digit race identifier.
fn active_marker_date(html: &str, doc: &Html) -> Option<String> {
    let year: i32 = RACE_ID_RE.captures(html)?[1][..4].parse().ok()?;

    let marker = ["#RaceList_DateList dd.Active", ".RaceList_Date dd.Active"]
        .iter()
        .find_map(|sel| select_text(doc, sel))?;

    let (month, day) = MONTH_DAY_SLASH_RE
        .captures(&marker)
        .or_else(|| MONTH_DAY_KANJI_RE.captures(&marker))
        .and_then(|caps| Some((caps[1].parse().ok()?, caps[2].parse().ok()?)))?;

    valid_ymd(year, month, day)
}

/// (b) A full "YYYY年MM月DD日" somewhere in the date strip or detail lines.
fn full_text_date(
    doc: &Html,
    course_detail: Option<&str>,
    class_detail: Option<&str>,
) -> Option<String> {
    let date_strip = select_text(doc, ".RaceList_Date");
    let candidates = [date_strip.as_deref(), course_detail, class_detail];

    for text in candidates.into_iter().flatten() {
        if let Some(caps) = FULL_DATE_RE.captures(text) {
            let parsed = (|| {
                let y: i32 = caps[1].parse().ok()?;
                let m: u32 = caps[2].parse().ok()?;
                let d: u32 = caps[3].parse().ok()?;
                valid_ymd(y, m, d)
            })();
            if parsed.is_some() {
                return parsed;
            }
        }
    }
    None
}

/// (c) An embedded script-level date token.
fn script_date(doc: &Html) -> Option<String> {
    let sel = Selector::parse("script").ok()?;
    for script in doc.select(&sel) {
        let text = script.text().collect::<String>();
        let token = SCRIPT_DATE_RE
            .captures(&text)
            .or_else(|| SCRIPT_DATE_ALT_RE.captures(&text))
            .map(|caps| caps[1].to_string());
        if let Some(token) = token {
            if NaiveDate::parse_from_str(&token, "%Y%m%d").is_ok() {
                return Some(token);
            }
        }
    }
    None
}

/// YYYYMMDD, only for dates that exist on the calendar.
fn valid_ymd(year: i32, month: u32, day: u32) -> Option<String> {
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y%m%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_PAGE: &str = r#"<html><body>
        <div id="RaceList_DateList">
            <dd class="Active"><a href="?kaisai_date=20251026">10/26</a></dd>
        </div>
        <div class="RaceList_NameBox">
            <span class="RaceNum">11R</span>
            <h1 class="RaceName">天皇賞(秋)</h1>
            <div class="RaceData01">15:40発走 / 芝2000m (左) / 天候:晴 / 馬場:良</div>
            <div class="RaceData02"><span>4回</span> <span>東京</span> <span>9日目</span> サラ系３歳以上 オープン</div>
        </div>
        <a href="/race/shutuba.html?race_id=202505040911">出馬表</a>
    </body></html>"#;

    #[test]
    fn all_sources_present() {
        let meta = extract_metadata(FULL_PAGE);
        assert_eq!(meta.race_name, "天皇賞(秋)");
        assert_eq!(meta.venue.as_deref(), Some("東京"));
        assert_eq!(meta.race_number.as_deref(), Some("11R"));
        assert_eq!(meta.race_date.as_deref(), Some("20251026"));
        assert!(meta.course_detail.unwrap().contains("芝2000m"));
        assert!(meta.class_detail.unwrap().contains("オープン"));
    }

    #[test]
    fn date_round_trips_through_a_calendar_parse() {
        let meta = extract_metadata(FULL_PAGE);
        let date = meta.race_date.unwrap();
        assert_eq!(date.len(), 8);
        let parsed = NaiveDate::parse_from_str(&date, "%Y%m%d").unwrap();
        assert_eq!((parsed.format("%Y%m%d").to_string()), date);
    }

    #[test]
    fn full_text_date_is_second_in_line() {
        let html = r#"<html><body>
            <h1 class="RaceName">西湖特別</h1>
            <div class="RaceData01">2025年10月26日 16:50発走 / ダ1600m (左)</div>
        </body></html>"#;
        let meta = extract_metadata(html);
        assert_eq!(meta.race_date.as_deref(), Some("20251026"));
    }

    #[test]
    fn script_token_is_third_in_line() {
        let html = r#"<html><body>
            <h1 class="RaceName">西湖特別</h1>
            <script>var race = {"kaisai_date":"20250505"};</script>
        </body></html>"#;
        let meta = extract_metadata(html);
        assert_eq!(meta.race_date.as_deref(), Some("20250505"));
    }

    #[test]
    fn missing_date_sources_leave_date_unset() {
        let html = r#"<html><body><h1 class="RaceName">西湖特別</h1></body></html>"#;
        let meta = extract_metadata(html);
        assert_eq!(meta.race_date, None);
        assert_eq!(meta.race_name, "西湖特別");
    }

    #[test]
    fn impossible_dates_fall_through_the_chain() {
        let html = r#"<html><body>
            <div class="RaceData01">2025年2月30日</div>
            <script>kaisaiDate = "20250228";</script>
        </body></html>"#;
        let meta = extract_metadata(html);
        assert_eq!(meta.race_date.as_deref(), Some("20250228"));
    }

    #[test]
    fn race_number_falls_back_to_page_text() {
        let html = r#"<html><body>
            <h1 class="RaceName">葵ステークス</h1>
            <p>京都 第10 R 芝1200m</p>
        </body></html>"#;
        let meta = extract_metadata(html);
        assert_eq!(meta.race_number.as_deref(), Some("10R"));
    }

    #[test]
    fn venue_requires_the_class_detail_line() {
        let html = r#"<html><body>
            <h1 class="RaceName">東京優駿</h1>
        </body></html>"#;
        // 東京 in the race name is not the venue
        let meta = extract_metadata(html);
        assert_eq!(meta.venue, None);
    }
}
