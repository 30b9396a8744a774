/// Defines a newtype ID wrapper around an integer-like scalar (typically `i64`)
/// and generates:
/// - derives (Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)
/// - `Display`
/// - `From<$inner> for $name` and `From<$name> for $inner`
///
/// Usage:
///   define_id_type!(i64, NightId);
#[macro_export]
macro_rules! define_id_type {
    ($inner:ty, $name:ident) => {
        #[derive(
            Debug,
            Copy,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::write!(f, "{}", self.0)
            }
        }

        impl ::std::convert::From<$inner> for $name {
            fn from(v: $inner) -> Self {
                $name(v)
            }
        }

        impl ::std::convert::From<$name> for $inner {
            fn from(v: $name) -> Self {
                v.0
            }
        }

        impl $name {
            pub fn new(value: $inner) -> Self {
                $name(value)
            }

            pub fn value(&self) -> $inner {
                self.0
            }
        }
    };
}

/// Defines a plain `[start, end]` window type that carries no extra payload
/// and implements [`TimeWindow`](crate::models::TimeWindow) for it.
///
/// Usage:
///   define_window_type!(PropagationWindow, "Time range pre-cleared for firing.");
#[macro_export]
macro_rules! define_window_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            pub start: ::chrono::DateTime<::chrono::Utc>,
            pub end: ::chrono::DateTime<::chrono::Utc>,
        }

        impl $name {
            pub fn new(
                start: ::chrono::DateTime<::chrono::Utc>,
                end: ::chrono::DateTime<::chrono::Utc>,
            ) -> Self {
                Self { start, end }
            }
        }

        impl $crate::models::TimeWindow for $name {
            fn interval(&self) -> $crate::models::Interval {
                $crate::models::Interval::new_unchecked(self.start, self.end)
            }

            fn with_interval(&self, interval: $crate::models::Interval) -> Self {
                Self {
                    start: interval.start,
                    end: interval.end,
                }
            }
        }

        impl ::std::convert::From<$crate::models::Interval> for $name {
            fn from(interval: $crate::models::Interval) -> Self {
                Self {
                    start: interval.start,
                    end: interval.end,
                }
            }
        }
    };
}
