//! Errors raised while decoding external text.

/// Result type for decoders.
pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A collision record did not have the expected shape.
    #[error("Malformed collision record '{record}': {reason}")]
    MalformedRecord { record: String, reason: String },

    /// A time-of-day token could not be read.
    #[error("Malformed time of day '{0}'")]
    MalformedTime(String),

    /// An ISO-8601 span could not be read.
    #[error("Malformed duration '{0}'")]
    MalformedDuration(String),

    /// A timing-window definition could not be read.
    #[error("Malformed timing window '{input}': {reason}")]
    MalformedTimingWindow { input: String, reason: String },
}

impl ParseError {
    pub fn record(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            record: record.into(),
            reason: reason.into(),
        }
    }

    pub fn timing_window(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTimingWindow {
            input: input.into(),
            reason: reason.into(),
        }
    }
}
