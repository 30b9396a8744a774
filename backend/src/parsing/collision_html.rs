//! HTML rendition of the collision feed.
//!
//! The page carries two tables: `id="collisions"` with the currently reported
//! windows and `id="preview"` with forthcoming ones. Every data row holds the
//! same five cells as a plain-text record. Header rows (`<th>`) are ignored.
//! A page without either table is treated as a `<pre>`-wrapped text feed.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::collision_feed::{
    decode_text, decode_tokens, CollisionFeed, CollisionFeedDecoder, FeedFormat,
};
use super::error::ParseError;
use crate::models::Collision;

const ACTIVE_TABLE: &str = "collisions";
const PREVIEW_TABLE: &str = "preview";

struct Patterns {
    table: Regex,
    row: Regex,
    cell: Regex,
    tag: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                table: Regex::new(
                    r#"(?is)<table[^>]*\bid\s*=\s*["']?([a-z_-]+)["']?[^>]*>(.*?)</table>"#,
                )
                .ok()?,
                row: Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").ok()?,
                cell: Regex::new(r"(?is)<td[^>]*>(.*?)</td>").ok()?,
                tag: Regex::new(r"(?s)<[^>]*>").ok()?,
            })
        })
        .as_ref()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlFeedDecoder;

impl CollisionFeedDecoder for HtmlFeedDecoder {
    fn decode(&self, raw: &str, reference_now: DateTime<Utc>) -> CollisionFeed {
        let mut rejected = Vec::new();
        let Some(patterns) = patterns() else {
            rejected.push(ParseError::record("<html>", "HTML patterns unavailable"));
            return CollisionFeed {
                rejected,
                ..Default::default()
            };
        };
        let mut active = None;
        let mut preview = None;

        for table in patterns.table.captures_iter(raw) {
            let id = table[1].to_ascii_lowercase();
            let rows = decode_table(patterns, &table[2], reference_now, &mut rejected);
            match id.as_str() {
                ACTIVE_TABLE => active = Some(rows),
                PREVIEW_TABLE => preview = Some(rows),
                _ => {}
            }
        }

        let active = match (active, &preview) {
            (Some(rows), _) => rows,
            (None, Some(_)) => Vec::new(),
            (None, None) => decode_text(&strip_tags(patterns, raw), reference_now, &mut rejected),
        };

        CollisionFeed {
            active,
            preview: preview.unwrap_or_default(),
            rejected,
        }
    }

    fn format(&self) -> FeedFormat {
        FeedFormat::Html
    }
}

fn decode_table(
    patterns: &Patterns,
    body: &str,
    reference_now: DateTime<Utc>,
    rejected: &mut Vec<ParseError>,
) -> Vec<Collision> {
    let mut tokens: Vec<String> = Vec::new();

    for row in patterns.row.captures_iter(body) {
        let cells: Vec<String> = patterns
            .cell
            .captures_iter(&row[1])
            .map(|cell| cell_text(patterns, &cell[1]))
            .collect();
        // Header rows use <th> and carry no <td> cells.
        if cells.is_empty() {
            continue;
        }
        // Keep each row a single record even if a cell is blank or split.
        let row_tokens: Vec<String> = cells
            .iter()
            .flat_map(|c| c.split_whitespace())
            .map(str::to_string)
            .collect();
        if row_tokens.len() != super::collision_feed::RECORD_LEN {
            rejected.push(ParseError::record(
                row_tokens.join(" "),
                "table row does not hold exactly five values",
            ));
            continue;
        }
        tokens.extend(row_tokens);
    }

    let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
    decode_tokens(&refs, reference_now, rejected)
}

fn cell_text(patterns: &Patterns, cell: &str) -> String {
    html_escape::decode_html_entities(&strip_tags(patterns, cell))
        .trim()
        .to_string()
}

fn strip_tags(patterns: &Patterns, html: &str) -> String {
    patterns.tag.replace_all(html, " ").into_owned()
}
