//! Channel time windows: parsing range tokens and enforcing the width limit.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::SummaryError;

#[must_use]
pub fn default_channel_range() -> TimeDelta {
    TimeDelta::hours(24)
}

#[must_use]
pub fn max_channel_range() -> TimeDelta {
    TimeDelta::days(30)
}

/// A parsed range token. Parsing is the only way in, so unknown tokens are
/// rejected at the boundary instead of silently becoming a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// Ends at `until` and reaches back this far (`24h`, `7d`, `36h`, `1h30m`).
    Last(TimeDelta),
    /// From UTC midnight of the end date.
    Today,
    /// Whole days, inclusive of the end date.
    Dates { start: NaiveDate, end: NaiveDate },
}

impl Default for RangeSpec {
    fn default() -> Self {
        Self::Last(default_channel_range())
    }
}

impl FromStr for RangeSpec {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        if token.is_empty() {
            return Ok(Self::default());
        }
        if token == "today" {
            return Ok(Self::Today);
        }
        if let Some(duration) = parse_duration(&token) {
            if duration <= TimeDelta::zero() {
                return Err(SummaryError::InvalidRequest(format!(
                    "range `{s}` must be longer than zero"
                )));
            }
            return Ok(Self::Last(duration));
        }

        let parts: Vec<&str> = token.split_whitespace().collect();
        if let [start, end] = parts.as_slice() {
            let start = NaiveDate::parse_from_str(start, "%Y-%m-%d");
            let end = NaiveDate::parse_from_str(end, "%Y-%m-%d");
            return match (start, end) {
                (Ok(start), Ok(end)) => Ok(Self::Dates { start, end }),
                _ => Err(SummaryError::InvalidRequest(format!(
                    "invalid date range `{s}`, expected `YYYY-MM-DD YYYY-MM-DD`"
                ))),
            };
        }

        Err(SummaryError::InvalidRequest(format!(
            "unsupported range `{s}`"
        )))
    }
}

/// Parses `NdNhNmNs` style durations; each unit optional, at least one present.
fn parse_duration(token: &str) -> Option<TimeDelta> {
    static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").expect("static regex compile")
    });

    let caps = DURATION_RE.captures(token)?;
    if caps.iter().skip(1).all(|c| c.is_none()) {
        return None;
    }

    let unit = |idx: usize| -> Option<i64> {
        caps.get(idx)
            .map_or(Some(0), |m| m.as_str().parse::<i64>().ok())
    };

    let total = TimeDelta::try_days(unit(1)?)?
        .checked_add(&TimeDelta::try_hours(unit(2)?)?)?
        .checked_add(&TimeDelta::try_minutes(unit(3)?)?)?
        .checked_add(&TimeDelta::try_seconds(unit(4)?)?)?;
    Some(total)
}

/// A resolved, validated window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub label: String,
    /// Stable description of the window for cache keys. Relative ranges use
    /// the normalized token so repeated requests share a key; absolute ones
    /// use their exact bounds.
    pub cache_token: String,
}

impl TimeWindow {
    #[must_use]
    pub fn width(&self) -> TimeDelta {
        self.until - self.since
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.since && at <= self.until
    }
}

/// Resolves a channel window from an optional range token and optional
/// explicit bounds. Explicit `since`/`until` override what the token implies.
///
/// # Errors
///
/// - [`SummaryError::InvalidRequest`] for unparseable tokens or `since > until`.
/// - [`SummaryError::RangeTooWide`] when the window is wider than 30 days.
pub fn resolve_window(
    range: Option<&str>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<TimeWindow, SummaryError> {
    let spec = range.map_or_else(|| Ok(RangeSpec::default()), RangeSpec::from_str)?;
    let end = until.unwrap_or(now);

    let (mut start, mut end, mut cache_token) = match spec {
        RangeSpec::Last(span) => {
            if span > max_channel_range() {
                return Err(SummaryError::RangeTooWide(format!(
                    "{} days requested, at most {} allowed",
                    span.num_days(),
                    max_channel_range().num_days()
                )));
            }
            (end - span, end, format!("last:{}s", span.num_seconds()))
        }
        RangeSpec::Today => {
            let midnight = end.date_naive().and_time(NaiveTime::MIN).and_utc();
            (midnight, end, format!("today:{}", end.date_naive()))
        }
        RangeSpec::Dates { start, end: last } => {
            let from = start.and_time(NaiveTime::MIN).and_utc();
            let to = (last + TimeDelta::days(1)).and_time(NaiveTime::MIN).and_utc()
                - TimeDelta::nanoseconds(1);
            (from, to, format!("dates:{start}..{last}"))
        }
    };

    if let Some(explicit) = since {
        start = explicit;
    }
    if let Some(explicit) = until {
        end = explicit;
    }
    if since.is_some() || until.is_some() {
        cache_token = format!(
            "{}-{}",
            start.timestamp_millis(),
            end.timestamp_millis()
        );
    }

    if start > end {
        return Err(SummaryError::InvalidRequest(
            "range start is after its end".to_string(),
        ));
    }
    if end - start > max_channel_range() {
        return Err(SummaryError::RangeTooWide(format!(
            "window spans more than {} days",
            max_channel_range().num_days()
        )));
    }

    let label = format!(
        "{} – {}",
        start.format("%b %-d, %H:%M"),
        end.format("%b %-d, %H:%M")
    );

    Ok(TimeWindow {
        since: start,
        until: end,
        label,
        cache_token,
    })
}
