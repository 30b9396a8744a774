//! Decoders for the text formats this system consumes.
//!
//! # Parsers
//!
//! - [`collision_feed`]: plain-text laser-traffic collision feed
//! - [`collision_html`]: HTML rendition of the same feed, with preview rows
//! - [`timing_window`]: observation timing windows with ISO-8601 spans
//!
//! Malformed records are rejected one at a time; the rest of the input is
//! still decoded.

pub mod collision_feed;
pub mod collision_html;
pub mod error;
pub mod timing_window;


pub use collision_feed::{
    parse_collisions, CollisionFeed, CollisionFeedDecoder, FeedFormat, TextFeedDecoder,
};
pub use collision_html::HtmlFeedDecoder;
pub use error::{ParseError, ParseResult};
pub use timing_window::{parse_calendar_span, parse_timing_window};
