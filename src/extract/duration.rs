//! Duration extraction from free text.
//!
//! Total: never errors on malformed input, returns `None` when no
//! duration phrase is present and the caller applies the default.

use std::sync::OnceLock;

use regex::Regex;

const UNIT: &str = r"hours?|hrs?|hr|minutes?|mins?|min";

/// Priority-ordered duration patterns. First match wins — no attempt to
/// reconcile multiple duration phrases in one request.
fn duration_patterns() -> &'static [Regex; 4] {
    static RES: OnceLock<[Regex; 4]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(&format!(r"(?i)\bfor\s+(\d+(?:\.\d+)?)\s*({UNIT})\b")).unwrap(),
            Regex::new(&format!(r"(?i)\bin\s+(\d+(?:\.\d+)?)\s*({UNIT})\b")).unwrap(),
            Regex::new(&format!(r"(?i)\blasting\s+(\d+(?:\.\d+)?)\s*({UNIT})\b")).unwrap(),
            Regex::new(&format!(
                r"(?i)\b(\d+(?:\.\d+)?)\s*({UNIT})\b(?:\s*(?:long|duration))?"
            ))
            .unwrap(),
        ]
    })
}

/// Matches any duration phrase, leading preposition included, for removal.
fn strip_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(?:(?:for|in|lasting)\s+)?\d+(?:\.\d+)?\s*(?:{UNIT})\b(?:\s*(?:long|duration))?"
        ))
        .unwrap()
    })
}

/// Extract an explicit duration in minutes, or `None` when no phrase is
/// present. Hour units multiply by 60; fractional counts truncate.
pub fn extract_duration(text: &str) -> Option<u32> {
    for pattern in duration_patterns() {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let num: f64 = match caps[1].parse() {
            Ok(n) => n,
            Err(_) => continue,
        };
        let unit = caps[2].to_lowercase();
        let minutes = if unit.starts_with('h') { num * 60.0 } else { num };
        let minutes = minutes as u32;
        // A zero-length phrase falls back to the default.
        if minutes == 0 {
            return None;
        }
        return Some(minutes);
    }
    None
}

/// Remove every duration phrase from the text, not just the first, so the
/// temporal locator cannot misread "3 hours" as a time of day.
pub fn strip_duration_phrases(text: &str) -> String {
    strip_pattern().replace_all(text, "").into_owned()
}
