//! Byte-to-text resolution for pages with unreliable charset declarations.
//!
//! Priority: in-page `charset=` declaration (first 4 KiB only), then
//! statistical detection over the full stream, then the configured
//! fallback. Decoding never fails; invalid sequences become U+FFFD.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use regex::bytes::Regex;
use std::sync::LazyLock;

/// How far into the byte stream a charset declaration is trusted.
const DECLARATION_WINDOW: usize = 4096;

static CHARSET_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)charset\s*=\s*['"]?\s*([A-Za-z0-9_\-]+)"#).expect("charset pattern")
});

/// Decode raw page bytes into text, lossily but never fatally.
pub fn resolve(bytes: &[u8], fallback: &'static Encoding) -> String {
    let encoding = declared_encoding(bytes)
        .or_else(|| detected_encoding(bytes))
        .unwrap_or(fallback);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// Map a config charset label to an encoding, defaulting to UTF-8 for
/// unrecognized labels.
pub fn encoding_for_label(label: &str) -> &'static Encoding {
    Encoding::for_label(label.as_bytes()).unwrap_or(encoding_rs::UTF_8)
}

fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(DECLARATION_WINDOW)];
    let caps = CHARSET_DECL.captures(head)?;
    let label = String::from_utf8_lossy(&caps[1]).to_ascii_lowercase();
    // EUC-JP travels under several names WHATWG does not recognize
    let label = match label.as_str() {
        "eucjp" | "euc_jp" | "ujis" => "euc-jp",
        other => other,
    };
    Encoding::for_label(label.as_bytes())
}

fn detected_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    // Pure ASCII carries no signal; let the fallback decide
    if bytes.is_ascii() {
        return None;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    Some(detector.guess(None, true))
}
