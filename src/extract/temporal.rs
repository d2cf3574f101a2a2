//! Temporal phrase location.
//!
//! `DateResolver` is the narrow capability the intent extractor consumes:
//! find date/time-bearing substrings and resolve each to an absolute
//! instant, preferring future readings when a phrase could go either way.
//! `RuleResolver` is the built-in rule-based English implementation;
//! callers with richer NLP can substitute their own.
//!
//! Immediacy keywords ("now", "right now", "immediately") are handled
//! before any resolver runs: they bind to the reference instant and are
//! stripped so the resolver never sees a degenerate remainder.

use std::sync::OnceLock;

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use regex::Regex;

/// A date/time-bearing substring resolved to an absolute instant.
/// `offset` is the byte position in the source text — declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalMatch {
    pub text: String,
    pub offset: usize,
    pub at: DateTime<Utc>,
}

/// External date-phrase resolution capability.
pub trait DateResolver: Send + Sync {
    /// Locate temporal phrases in `text`, resolved relative to `now`,
    /// returned in declaration order.
    fn locate(&self, text: &str, now: DateTime<Utc>) -> Vec<TemporalMatch>;
}

fn immediacy_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:right\s+now|now|immediately)\b").unwrap())
}

/// Whether the text demands immediate binding to the reference instant.
pub fn contains_immediacy(text: &str) -> bool {
    immediacy_pattern().is_match(text)
}

/// Remove immediacy keywords from the text.
pub fn strip_immediacy(text: &str) -> String {
    immediacy_pattern().replace_all(text, "").into_owned()
}

/// Time-of-day subpattern shared by the phrase patterns below: "7:30pm",
/// "19:30", "430" (compact), "7pm", or a bare hour.
const TIME: &str = r"\d{1,2}:\d{2}\s*(?:[ap]\.?m\.?)?|\d{3,4}\s*(?:[ap]\.?m\.?)?|\d{1,2}\s*(?:[ap]\.?m\.?)?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternKind {
    AbsoluteDate,
    RelativeDay,
    InOffset,
    NextWeek,
    WeekdayName,
    ClockTime,
    BareMeridiem,
    NoonMidnight,
}

fn phrase_patterns() -> &'static Vec<(PatternKind, Regex)> {
    static PATTERNS: OnceLock<Vec<(PatternKind, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (
                PatternKind::AbsoluteDate,
                Regex::new(&format!(
                    r"(?i)\b(?P<y>\d{{4}})-(?P<mo>\d{{2}})-(?P<d>\d{{2}})(?:\s+(?:at\s+)?(?P<t>{TIME}))?"
                ))
                .unwrap(),
            ),
            (
                PatternKind::RelativeDay,
                Regex::new(&format!(
                    r"(?i)\b(?P<d>day\s+after\s+tomorrow|tomorrow|tonight|today|this\s+(?:morning|afternoon|evening|night))(?:\s+(?:at\s+)?(?P<t>{TIME}))?\b"
                ))
                .unwrap(),
            ),
            (
                PatternKind::InOffset,
                Regex::new(r"(?i)\bin\s+(?P<n>\d+)\s+(?P<u>days?|weeks?)\b").unwrap(),
            ),
            (
                PatternKind::NextWeek,
                Regex::new(r"(?i)\bnext\s+week\b").unwrap(),
            ),
            (
                PatternKind::WeekdayName,
                Regex::new(&format!(
                    r"(?i)\b(?:(?P<m>on|next|this)\s+)?(?P<w>monday|tuesday|wednesday|thursday|friday|saturday|sunday)(?:\s+(?:at\s+)?(?P<t>{TIME}))?\b"
                ))
                .unwrap(),
            ),
            (
                PatternKind::ClockTime,
                Regex::new(&format!(r"(?i)\b(?:at|by)\s+(?P<t>{TIME})\b")).unwrap(),
            ),
            (
                // A clock reading with an explicit meridiem stands on its
                // own ("submit report 5pm"), no preposition needed.
                PatternKind::BareMeridiem,
                Regex::new(r"(?i)\b(?P<t>\d{1,2}(?::\d{2})?\s*[ap]\.?m\.?)\b").unwrap(),
            ),
            (
                PatternKind::NoonMidnight,
                Regex::new(r"(?i)\b(?:at\s+)?(?P<w>noon|midday|midnight)\b").unwrap(),
            ),
        ]
    })
}

/// A parsed clock reading. `explicit_meridiem` records whether the user
/// wrote am/pm — it gates the prefer-future pm bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Clock {
    hour: u32,
    minute: u32,
    explicit_meridiem: bool,
}

/// Parse a clock substring: "7:30pm", "19:30", "430", "7pm", "7".
fn parse_clock(s: &str) -> Option<Clock> {
    let lower = s.trim().to_lowercase();
    let (digits, meridiem) = match lower.find(|c: char| c == 'a' || c == 'p') {
        Some(idx) => {
            let suffix = lower[idx..].replace([' ', '.'], "");
            let meridiem = match suffix.as_str() {
                "am" | "a" => Some(false),
                "pm" | "p" => Some(true),
                _ => return None,
            };
            (lower[..idx].trim().to_string(), meridiem)
        }
        None => (lower, None),
    };

    let (hour, minute) = if let Some((h, m)) = digits.split_once(':') {
        (h.parse().ok()?, m.parse().ok()?)
    } else if digits.len() == 3 || digits.len() == 4 {
        // Compact form: "430" -> 4:30, "1915" -> 19:15
        let split = digits.len() - 2;
        (digits[..split].parse().ok()?, digits[split..].parse().ok()?)
    } else {
        (digits.parse().ok()?, 0)
    };

    if minute > 59 {
        return None;
    }
    let hour = match meridiem {
        Some(_) if !(1..=12).contains(&hour) => return None,
        Some(true) => hour % 12 + 12,
        Some(false) => hour % 12,
        None if hour > 23 => return None,
        None => hour,
    };

    Some(Clock {
        hour,
        minute,
        explicit_meridiem: meridiem.is_some(),
    })
}

/// Rule-based English date-phrase resolver over `regex` + `chrono`.
pub struct RuleResolver {
    tz: Tz,
}

impl RuleResolver {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Attach the zone to a wall-clock reading. DST-ambiguous readings take
    /// the earlier offset; readings inside a spring-forward gap are skipped.
    fn localize(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
        let naive = NaiveDateTime::new(date, time);
        self.tz
            .from_local_datetime(&naive)
            .single()
            .or_else(|| self.tz.from_local_datetime(&naive).earliest())
    }

    fn resolve(
        &self,
        kind: PatternKind,
        caps: &regex::Captures<'_>,
        now_local: DateTime<Tz>,
    ) -> Option<DateTime<Tz>> {
        let today = now_local.date_naive();
        match kind {
            PatternKind::AbsoluteDate => {
                let date = NaiveDate::from_ymd_opt(
                    caps["y"].parse().ok()?,
                    caps["mo"].parse().ok()?,
                    caps["d"].parse().ok()?,
                )?;
                let time = match caps.name("t") {
                    Some(t) => {
                        let clock = parse_clock(t.as_str())?;
                        NaiveTime::from_hms_opt(clock.hour, clock.minute, 0)?
                    }
                    None => NaiveTime::MIN,
                };
                self.localize(date, time)
            }
            PatternKind::RelativeDay => {
                let word = caps["d"].to_lowercase();
                let word = word.split_whitespace().collect::<Vec<_>>().join(" ");
                let (date, evening) = match word.as_str() {
                    "day after tomorrow" => (today + Duration::days(2), false),
                    "tomorrow" => (today + Duration::days(1), false),
                    "tonight" | "this night" | "this evening" => (today, true),
                    _ => (today, false), // today, this morning, this afternoon
                };
                let time = match caps.name("t") {
                    Some(t) => {
                        let mut clock = parse_clock(t.as_str())?;
                        // "tonight at 9" means 21:00, not 09:00
                        if evening && !clock.explicit_meridiem && clock.hour < 12 {
                            clock.hour += 12;
                        }
                        NaiveTime::from_hms_opt(clock.hour, clock.minute, 0)?
                    }
                    None => match word.as_str() {
                        "tonight" | "this night" => NaiveTime::from_hms_opt(20, 0, 0)?,
                        "this evening" => NaiveTime::from_hms_opt(19, 0, 0)?,
                        "this afternoon" => NaiveTime::from_hms_opt(15, 0, 0)?,
                        "this morning" => NaiveTime::from_hms_opt(9, 0, 0)?,
                        _ => now_local.time(),
                    },
                };
                self.localize(date, time)
            }
            PatternKind::InOffset => {
                let n: i64 = caps["n"].parse().ok()?;
                let days = if caps["u"].to_lowercase().starts_with("week") {
                    n * 7
                } else {
                    n
                };
                Some(now_local + Duration::days(days))
            }
            PatternKind::NextWeek => Some(now_local + Duration::days(7)),
            PatternKind::WeekdayName => {
                let target: Weekday = caps["w"].to_lowercase().parse().ok()?;
                let time = match caps.name("t") {
                    Some(t) => {
                        let clock = parse_clock(t.as_str())?;
                        NaiveTime::from_hms_opt(clock.hour, clock.minute, 0)?
                    }
                    None => NaiveTime::from_hms_opt(9, 0, 0)?,
                };
                let days_ahead = (target.num_days_from_monday() as i64
                    - today.weekday().num_days_from_monday() as i64)
                    .rem_euclid(7);
                let explicit_next = caps.name("m").map(|m| m.as_str().eq_ignore_ascii_case("next"));
                let mut date = today + Duration::days(days_ahead);
                // A bare weekday naming today resolves to next week once the
                // time has passed (future-preferring).
                let candidate = self.localize(date, time)?;
                if candidate <= now_local || (days_ahead == 0 && explicit_next == Some(true)) {
                    date += Duration::days(7);
                }
                self.localize(date, time)
            }
            PatternKind::BareMeridiem => {
                let clock = parse_clock(caps.name("t")?.as_str())?;
                let time = NaiveTime::from_hms_opt(clock.hour, clock.minute, 0)?;
                let candidate = self.localize(today, time)?;
                if candidate > now_local {
                    Some(candidate)
                } else {
                    self.localize(today + Duration::days(1), time)
                }
            }
            PatternKind::ClockTime => {
                let clock = parse_clock(caps.name("t")?.as_str())?;
                let time = NaiveTime::from_hms_opt(clock.hour, clock.minute, 0)?;
                let candidate = self.localize(today, time)?;
                if candidate > now_local {
                    return Some(candidate);
                }
                // Prefer the nearest future reading: an ambiguous morning
                // hour that has passed flips to the evening before jumping
                // a whole day ("at 430" said mid-morning means 16:30).
                if !clock.explicit_meridiem && clock.hour < 12 {
                    let pm = NaiveTime::from_hms_opt(clock.hour + 12, clock.minute, 0)?;
                    if let Some(evening) = self.localize(today, pm) {
                        if evening > now_local {
                            return Some(evening);
                        }
                    }
                }
                self.localize(today + Duration::days(1), time)
            }
            PatternKind::NoonMidnight => {
                let time = match caps["w"].to_lowercase().as_str() {
                    "midnight" => NaiveTime::MIN,
                    _ => NaiveTime::from_hms_opt(12, 0, 0)?,
                };
                let candidate = self.localize(today, time)?;
                if candidate > now_local {
                    Some(candidate)
                } else {
                    self.localize(today + Duration::days(1), time)
                }
            }
        }
    }
}

impl DateResolver for RuleResolver {
    fn locate(&self, text: &str, now: DateTime<Utc>) -> Vec<TemporalMatch> {
        let now_local = now.with_timezone(&self.tz);
        let mut claimed: Vec<(usize, usize)> = Vec::new();
        let mut matches = Vec::new();

        for (kind, pattern) in phrase_patterns() {
            for caps in pattern.captures_iter(text) {
                let whole = caps.get(0).expect("group 0 always present");
                let span = (whole.start(), whole.end());
                if claimed.iter().any(|&(s, e)| span.0 < e && s < span.1) {
                    continue;
                }
                let Some(at) = self.resolve(*kind, &caps, now_local) else {
                    continue;
                };
                claimed.push(span);
                matches.push(TemporalMatch {
                    text: whole.as_str().to_string(),
                    offset: whole.start(),
                    at: at.with_timezone(&Utc),
                });
            }
        }

        matches.sort_by_key(|m| m.offset);
        matches
    }
}

/// Parse a structured datetime field: the exact forms first
/// ("2024-10-25 17:00", "2024-10-25"), then whatever the resolver makes
/// of it ("tomorrow at 7pm" is accepted in the structured slot too).
pub fn parse_datetime_field(
    s: &str,
    tz: Tz,
    now: DateTime<Utc>,
    resolver: &dyn DateResolver,
) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        return tz
            .from_local_datetime(&naive)
            .single()
            .or_else(|| tz.from_local_datetime(&naive).earliest())
            .map(|dt| dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let naive = NaiveDateTime::new(date, NaiveTime::MIN);
        return tz
            .from_local_datetime(&naive)
            .single()
            .or_else(|| tz.from_local_datetime(&naive).earliest())
            .map(|dt| dt.with_timezone(&Utc));
    }
    resolver.locate(s, now).into_iter().next().map(|m| m.at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn resolver() -> RuleResolver {
        RuleResolver::new(chrono_tz::UTC)
    }

    /// 2024-01-01 was a Monday.
    fn monday_ten_am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_clock_forms() {
        assert_eq!(
            parse_clock("7pm"),
            Some(Clock { hour: 19, minute: 0, explicit_meridiem: true })
        );
        assert_eq!(
            parse_clock("19:30"),
            Some(Clock { hour: 19, minute: 30, explicit_meridiem: false })
        );
        assert_eq!(
            parse_clock("430"),
            Some(Clock { hour: 4, minute: 30, explicit_meridiem: false })
        );
        assert_eq!(
            parse_clock("12 am"),
            Some(Clock { hour: 0, minute: 0, explicit_meridiem: true })
        );
        assert_eq!(parse_clock("25:00"), None);
        assert_eq!(parse_clock("7:75"), None);
    }

    #[test]
    fn test_tomorrow_at_7pm() {
        let matches = resolver().locate("Dinner with family tomorrow at 7pm", monday_ten_am());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text.to_lowercase(), "tomorrow at 7pm");
        assert_eq!(
            matches[0].at,
            Utc.with_ymd_and_hms(2024, 1, 2, 19, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_weekday_prefers_future() {
        // Said on a Monday morning: "monday at 9am" has passed today,
        // so it rolls to next Monday.
        let matches = resolver().locate("review notes on monday at 9am", monday_ten_am());
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].at,
            Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_weekday_later_this_week() {
        let matches = resolver().locate("team meeting on Wednesday at 10 am", monday_ten_am());
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].at,
            Utc.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_compact_clock_bumps_to_afternoon() {
        // "at 430" said at 10:00 — 04:30 has passed, 16:30 is the nearest
        // future reading.
        let matches = resolver().locate("appointment with teacher at 430", monday_ten_am());
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].at,
            Utc.with_ymd_and_hms(2024, 1, 1, 16, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_absolute_datetime() {
        let matches = resolver().locate("submit draft 2024-10-25 17:00", monday_ten_am());
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].at,
            Utc.with_ymd_and_hms(2024, 10, 25, 17, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_in_days_and_next_week() {
        let now = monday_ten_am();
        let matches = resolver().locate("renew passport in 3 days", now);
        assert_eq!(matches[0].at, now + Duration::days(3));

        let matches = resolver().locate("plan sprint next week", now);
        assert_eq!(matches[0].at, now + Duration::days(7));
    }

    #[test]
    fn test_tonight_default_and_explicit_hour() {
        let now = monday_ten_am();
        let matches = resolver().locate("movie tonight", now);
        assert_eq!(
            matches[0].at,
            Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap()
        );

        let matches = resolver().locate("movie tonight at 9", now);
        assert_eq!(
            matches[0].at,
            Utc.with_ymd_and_hms(2024, 1, 1, 21, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_bare_meridiem_without_preposition() {
        let matches = resolver().locate("submit report 5pm", monday_ten_am());
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].at,
            Utc.with_ymd_and_hms(2024, 1, 1, 17, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_no_temporal_phrase() {
        assert!(resolver().locate("call mom", monday_ten_am()).is_empty());
        assert!(resolver().locate("", monday_ten_am()).is_empty());
    }

    #[test]
    fn test_two_phrases_reported_in_declaration_order() {
        let matches = resolver().locate(
            "prep slides tomorrow at 9am or on friday",
            monday_ten_am(),
        );
        assert_eq!(matches.len(), 2);
        assert!(matches[0].offset < matches[1].offset);
        assert_eq!(
            matches[0].at,
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
        );
        assert_eq!(
            matches[1].at,
            Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_immediacy_detection_and_strip() {
        assert!(contains_immediacy("start the laundry right now"));
        assert!(contains_immediacy("do it immediately"));
        assert!(!contains_immediacy("knowledge is power"));

        let stripped = strip_immediacy("start the laundry right now");
        assert!(!stripped.contains("now"));
        assert!(stripped.contains("laundry"));
    }

    #[test]
    fn test_non_utc_zone_resolution() {
        let resolver = RuleResolver::new(chrono_tz::Asia::Kuala_Lumpur);
        // 10:00 UTC = 18:00 in Kuala Lumpur (UTC+8)
        let matches = resolver.locate("dinner tomorrow at 7pm", monday_ten_am());
        assert_eq!(matches.len(), 1);
        // 2024-01-02 19:00 +08:00 == 11:00 UTC
        assert_eq!(
            matches[0].at,
            Utc.with_ymd_and_hms(2024, 1, 2, 11, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_datetime_field_exact_and_fallback() {
        let resolver = resolver();
        let now = monday_ten_am();
        assert_eq!(
            parse_datetime_field("2024-10-25 17:00", chrono_tz::UTC, now, &resolver),
            Some(Utc.with_ymd_and_hms(2024, 10, 25, 17, 0, 0).unwrap())
        );
        assert_eq!(
            parse_datetime_field("tomorrow at 7pm", chrono_tz::UTC, now, &resolver),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 19, 0, 0).unwrap())
        );
        assert_eq!(
            parse_datetime_field("gibberish", chrono_tz::UTC, now, &resolver),
            None
        );
    }
}
