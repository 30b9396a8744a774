//! Text form of observation timing windows.
//!
//! ```text
//! <start RFC 3339> <duration | forever> [<repeat count> <period>]
//! 2024-03-10T23:00:00Z PT2H
//! 2024-03-01T00:00:00Z P1D 10 P7D
//! 2024-03-01T00:00:00Z forever
//! ```
//!
//! Durations and periods are ISO-8601 spans (`P1Y2M3W4DT5H6M7S`). A repeat
//! count of `-1` repeats without bound; `0` means the window does not repeat.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::error::{ParseError, ParseResult};
use crate::models::{CalendarSpan, Repeat, RepeatCount, TimingWindow};

const FOREVER: &str = "forever";

fn span_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$",
        )
        .ok()
    })
    .as_ref()
}

/// Parse an ISO-8601 calendar span such as `P1M`, `PT90M` or `P1DT2H`.
pub fn parse_calendar_span(text: &str) -> ParseResult<CalendarSpan> {
    let malformed = || ParseError::MalformedDuration(text.to_string());
    let upper = text.trim().to_ascii_uppercase();
    // "P" and "PT" alone match the pattern but carry no components.
    if upper.len() < 3 || upper.ends_with('T') {
        return Err(malformed());
    }
    let captures = span_re()
        .and_then(|re| re.captures(&upper))
        .ok_or_else(malformed)?;

    let field = |i: usize| -> ParseResult<u32> {
        captures
            .get(i)
            .map(|m| m.as_str().parse::<u32>().map_err(|_| malformed()))
            .unwrap_or(Ok(0))
    };

    let weeks = field(3)?;
    let days = weeks
        .checked_mul(7)
        .and_then(|d| d.checked_add(field(4).ok()?))
        .ok_or_else(malformed)?;

    Ok(CalendarSpan {
        years: field(1)?,
        months: field(2)?,
        days,
        hours: field(5)?,
        minutes: field(6)?,
        seconds: field(7)?,
    })
}

/// Parse one timing-window definition.
pub fn parse_timing_window(text: &str) -> ParseResult<TimingWindow> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let reject = |reason: &str| ParseError::timing_window(text, reason);

    let (start, duration, repeat) = match tokens.as_slice() {
        [start, duration] => (*start, *duration, None),
        [start, duration, count, period] => (*start, *duration, Some((*count, *period))),
        _ => return Err(reject("expected 2 or 4 fields")),
    };

    let start = DateTime::parse_from_rfc3339(start)
        .map_err(|e| reject(&format!("bad start: {}", e)))?
        .with_timezone(&Utc);

    let duration = if duration.eq_ignore_ascii_case(FOREVER) {
        None
    } else {
        Some(parse_calendar_span(duration).map_err(|e| reject(&e.to_string()))?)
    };

    let repeat = match repeat {
        None => None,
        Some(_) if duration.is_none() => {
            return Err(reject("a window that never closes cannot repeat"));
        }
        Some((count, period)) => {
            let count: i64 = count
                .parse()
                .map_err(|_| reject(&format!("bad repeat count '{}'", count)))?;
            let period = parse_calendar_span(period).map_err(|e| reject(&e.to_string()))?;
            match count {
                -1 => Some(Repeat {
                    count: RepeatCount::Forever,
                    period,
                }),
                0 => None,
                n if n > 0 => Some(Repeat {
                    count: RepeatCount::Times(
                        u32::try_from(n).map_err(|_| reject("repeat count too large"))?,
                    ),
                    period,
                }),
                _ => return Err(reject("repeat count must be -1 or non-negative")),
            }
        }
    };

    Ok(TimingWindow {
        start,
        duration,
        repeat,
    })
}
