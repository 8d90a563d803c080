//! Capture timestamps: local wall-clock time at millisecond resolution.
//!
//! Live capture truncates to whole milliseconds so the value written to the
//! detail log is exactly the value the tracker computed with.

use chrono::{Local, NaiveDateTime, SubsecRound};

pub type Timestamp = NaiveDateTime;

pub const ISO_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub fn capture_now() -> Timestamp {
    Local::now().naive_local().trunc_subsecs(3)
}

pub fn format_iso(ts: &Timestamp) -> String {
    ts.format(ISO_MILLIS).to_string()
}

pub fn parse_iso(text: &str) -> Result<Timestamp, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%dT%H:%M:%S%.f")
}

/// Seconds elapsed from `earlier` to `later`; negative when out of order.
pub fn elapsed_secs(earlier: &Timestamp, later: &Timestamp) -> f64 {
    (*later - *earlier).num_milliseconds() as f64 / 1000.0
}

/// Serde adapter writing `YYYY-MM-DDTHH:MM:SS.mmm`.
pub mod iso_millis {
    use super::{format_iso, parse_iso, Timestamp};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_iso(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_iso(&text).map_err(D::Error::custom)
    }
}
