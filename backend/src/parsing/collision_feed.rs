//! Plain-text collision feed decoder.
//!
//! The feed is a whitespace-separated stream of fixed five-token records:
//!
//! ```text
//! <site> <observatory> <start hh:mm[:ss]> <end hh:mm[:ss]> <priority>
//! ```
//!
//! An empty body or the single token `NONE` means no collisions. Clock times
//! are anchored to the calendar date of the moment the feed was requested.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::{ParseError, ParseResult};
use crate::models::Collision;

/// Body of a feed reporting no collisions.
pub const EMPTY_FEED_TOKEN: &str = "NONE";

/// Priority of records that do not concern laser guide stars.
pub const NO_LGS_PRIORITY: &str = "NO-LGS";

/// Tokens per record.
pub const RECORD_LEN: usize = 5;

/// Decoded feed: active collisions plus forthcoming ones, both start-ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollisionFeed {
    pub active: Vec<Collision>,
    #[serde(default)]
    pub preview: Vec<Collision>,
    /// Records that could not be decoded.
    #[serde(skip)]
    pub rejected: Vec<ParseError>,
}

impl CollisionFeed {
    /// Keep only records tagged with `site` (case-insensitive) and return how
    /// many were dropped. Feeds shared between sites carry every site's records.
    pub fn retain_site(&mut self, site: &str) -> usize {
        let before = self.active.len() + self.preview.len();
        self.active.retain(|c| c.site.eq_ignore_ascii_case(site));
        self.preview.retain(|c| c.site.eq_ignore_ascii_case(site));
        before - self.active.len() - self.preview.len()
    }
}

/// Adapter from a raw feed body to a [`CollisionFeed`].
pub trait CollisionFeedDecoder: Send + Sync {
    fn decode(&self, raw: &str, reference_now: DateTime<Utc>) -> CollisionFeed;

    fn format(&self) -> FeedFormat;
}

/// Wire format of the collision feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    #[default]
    Text,
    Html,
}

impl FeedFormat {
    pub fn decoder(self) -> Box<dyn CollisionFeedDecoder> {
        match self {
            FeedFormat::Text => Box::new(TextFeedDecoder),
            FeedFormat::Html => Box::new(super::collision_html::HtmlFeedDecoder),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextFeedDecoder;

impl CollisionFeedDecoder for TextFeedDecoder {
    fn decode(&self, raw: &str, reference_now: DateTime<Utc>) -> CollisionFeed {
        let mut rejected = Vec::new();
        let active = decode_text(raw, reference_now, &mut rejected);
        CollisionFeed {
            active,
            preview: Vec::new(),
            rejected,
        }
    }

    fn format(&self) -> FeedFormat {
        FeedFormat::Text
    }
}

/// Decode a plain-text feed body into a start-ascending collision list.
///
/// Malformed records are logged and skipped.
pub fn parse_collisions(text: &str, reference_now: DateTime<Utc>) -> Vec<Collision> {
    let mut rejected = Vec::new();
    let collisions = decode_text(text, reference_now, &mut rejected);
    for error in &rejected {
        warn!(%error, "Skipping collision record");
    }
    collisions
}

pub(crate) fn decode_text(
    text: &str,
    reference_now: DateTime<Utc>,
    rejected: &mut Vec<ParseError>,
) -> Vec<Collision> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == EMPTY_FEED_TOKEN {
        return Vec::new();
    }
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    decode_tokens(&tokens, reference_now, rejected)
}

/// Decode a flat token stream, five tokens per record.
pub(crate) fn decode_tokens(
    tokens: &[&str],
    reference_now: DateTime<Utc>,
    rejected: &mut Vec<ParseError>,
) -> Vec<Collision> {
    let mut collisions = Vec::with_capacity(tokens.len() / RECORD_LEN);

    for record in tokens.chunks(RECORD_LEN) {
        match decode_record(record, reference_now) {
            Ok(Some(collision)) => collisions.push(collision),
            Ok(None) => {}
            Err(e) => rejected.push(e),
        }
    }

    // Stable: equal starts keep feed order.
    collisions.sort_by_key(|c| c.start);
    collisions
}

/// One record, or `None` when the record is filtered out.
fn decode_record(record: &[&str], reference_now: DateTime<Utc>) -> ParseResult<Option<Collision>> {
    let [site, observatory, start, end, priority] = record else {
        return Err(ParseError::record(
            record.join(" "),
            format!("expected {} tokens, found {}", RECORD_LEN, record.len()),
        ));
    };

    if *priority == NO_LGS_PRIORITY {
        return Ok(None);
    }

    let start_clock = parse_clock(start)?;
    let end_clock = parse_clock(end)?;
    let (start, end) = anchor(start_clock, end_clock, reference_now).ok_or_else(|| {
        ParseError::record(record.join(" "), "date out of range")
    })?;

    Ok(Some(Collision {
        site: site.to_string(),
        observatory: observatory.to_string(),
        priority: priority.to_string(),
        start,
        end,
    }))
}

/// Read `hh:mm:ss` or `hh:mm`.
pub fn parse_clock(token: &str) -> ParseResult<NaiveTime> {
    NaiveTime::parse_from_str(token, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(token, "%H:%M"))
        .map_err(|_| ParseError::MalformedTime(token.to_string()))
}

/// Place a pair of clock times on the calendar relative to `reference_now`.
///
/// Both are first put on the reference date. A start already in the past
/// moves both to the following day; an end clock earlier than the start
/// clock wraps past midnight onto the day after the start.
fn anchor(
    start_clock: NaiveTime,
    end_clock: NaiveTime,
    reference_now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let today = reference_now.date_naive();

    let start_date = if today.and_time(start_clock).and_utc() < reference_now {
        next_day(today)?
    } else {
        today
    };
    let end_date = if end_clock < start_clock {
        next_day(start_date)?
    } else {
        start_date
    };

    Some((
        start_date.and_time(start_clock).and_utc(),
        end_date.and_time(end_clock).and_utc(),
    ))
}

fn next_day(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(1))
}
