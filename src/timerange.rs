//! Time range handling.
//!
//! Timestamps arrive from clients either as absolute ISO-8601 strings,
//! as relative expressions anchored on the current time (`now`,
//! `now-1h`, `now-15m`, ...) or as epoch milliseconds. They always leave
//! as millisecond-precision UTC strings.

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;

/// A UTC timestamp with the wire format used by the by-dimension API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JsTime(pub DateTime<Utc>);

impl JsTime {
    pub fn from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(JsTime)
    }

    /// Parses an absolute or `now`-relative time expression, resolving
    /// relative ones against `now`.
    pub fn parse_relative_to(expr: &str, now: DateTime<Utc>) -> Result<Self, String> {
        let expr = expr.trim();

        if let Some(rest) = expr.strip_prefix("now") {
            if rest.is_empty() {
                return Ok(JsTime(now));
            }
            let (backwards, amount) = if let Some(amount) = rest.strip_prefix('-') {
                (true, amount)
            } else if let Some(amount) = rest.strip_prefix('+') {
                (false, amount)
            } else {
                return Err(format!("invalid time expression '{}'", expr));
            };
            let offset = parse_offset(amount)
                .ok_or_else(|| format!("invalid time offset in '{}'", expr))?;
            let shifted = if backwards {
                now.checked_sub_signed(offset)
            } else {
                now.checked_add_signed(offset)
            };
            return shifted
                .map(JsTime)
                .ok_or_else(|| format!("time offset out of range in '{}'", expr));
        }

        if let Ok(ts) = DateTime::parse_from_rfc3339(expr) {
            return Ok(JsTime(ts.with_timezone(&Utc)));
        }
        // Timestamps without a zone are taken as UTC.
        if let Ok(naive) = NaiveDateTime::parse_from_str(expr, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(JsTime(Utc.from_utc_datetime(&naive)));
        }

        Err(format!("invalid timestamp '{}'", expr))
    }
}

fn parse_offset(amount: &str) -> Option<Duration> {
    let unit_at = amount.find(|c: char| !c.is_ascii_digit())?;
    let (count, unit) = amount.split_at(unit_at);
    let count: i64 = count.parse().ok()?;
    match unit {
        "s" => Duration::try_seconds(count),
        "m" => Duration::try_minutes(count),
        "h" => Duration::try_hours(count),
        "d" => Duration::try_days(count),
        "w" => Duration::try_weeks(count),
        _ => None,
    }
}

impl FromStr for JsTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JsTime::parse_relative_to(s, Utc::now())
    }
}

impl fmt::Display for JsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl Serialize for JsTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JsTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct JsTimeVisitor;

        impl Visitor<'_> for JsTimeVisitor {
            type Value = JsTime;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a timestamp string, a now-relative expression or epoch milliseconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<JsTime, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<JsTime, E> {
                JsTime::from_millis(v).ok_or_else(|| E::custom("epoch milliseconds out of range"))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<JsTime, E> {
                let millis = i64::try_from(v).map_err(E::custom)?;
                self.visit_i64(millis)
            }
        }

        deserializer.deserialize_any(JsTimeVisitor)
    }
}

/// A `[from, to]` window. Either bound may be unset until defaults apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timerange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<JsTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<JsTime>,
}

impl Timerange {
    pub fn new(from: JsTime, to: JsTime) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Length of the window, or `None` while a bound is unset.
    pub fn duration(&self) -> Option<Duration> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Some(to.0 - from.0),
            _ => None,
        }
    }

    /// Fills unset bounds: `to` becomes `now`, `from` one hour before `to`.
    /// Fails when `to` is too early to have an hour before it.
    pub fn fill_defaults(&mut self, now: DateTime<Utc>) -> Result<(), QueryError> {
        let to = *self.to.get_or_insert(JsTime(now));
        if self.from.is_none() {
            let from = to.0.checked_sub_signed(Duration::hours(1)).ok_or_else(|| {
                QueryError::InvalidRequest(format!("no default start time before '{}'", to))
            })?;
            self.from = Some(JsTime(from));
        }
        Ok(())
    }
}
