//! SLA deadline rendering

use chrono::{DateTime, Duration, Utc};
use std::fmt::Write;
use tracing::warn;

use crate::domain::aggregates::SlaBlock;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlaTarget {
    Respond,
    Resolve,
}

/// Derives deadline strings and remaining time from a ticket's SLA block
#[derive(Clone, Debug)]
pub struct SlaCalculator {
    date_format: String,
}

impl SlaCalculator {
    pub fn new(date_format: impl Into<String>) -> Self {
        Self { date_format: date_format.into() }
    }

    /// Deadlines for a ticket opened at `opened_at`. A target past the
    /// representable date range is left unset.
    pub fn targets_from(opened_at: DateTime<Utc>, respond_hours: u32, resolve_hours: u32) -> SlaBlock {
        SlaBlock {
            target_respond: Self::deadline(opened_at, respond_hours, SlaTarget::Respond),
            target_resolve: Self::deadline(opened_at, resolve_hours, SlaTarget::Resolve),
        }
    }

    fn deadline(opened_at: DateTime<Utc>, hours: u32, target: SlaTarget) -> Option<DateTime<Utc>> {
        let end = opened_at.checked_add_signed(Duration::hours(i64::from(hours)));
        if end.is_none() {
            warn!(?target, hours, "SLA target out of range, leaving it unset");
        }
        end
    }

    pub fn target(sla: Option<&SlaBlock>, target: SlaTarget) -> Option<DateTime<Utc>> {
        let sla = sla?;
        match target {
            SlaTarget::Respond => sla.target_respond,
            SlaTarget::Resolve => sla.target_resolve,
        }
    }

    /// Formatted deadline, empty when the ticket has no SLA
    pub fn format_target(&self, sla: Option<&SlaBlock>, target: SlaTarget) -> String {
        match Self::target(sla, target) {
            Some(at) => self.format(at),
            None => String::new(),
        }
    }

    /// Time left until the deadline, or time since it passed with an "ago"
    /// suffix. Empty when the ticket has no SLA.
    pub fn remaining(&self, sla: Option<&SlaBlock>, target: SlaTarget, now: DateTime<Utc>) -> String {
        let Some(end) = Self::target(sla, target) else {
            return String::new();
        };
        let diff = human_time_diff(end, now);
        if now > end {
            format!("{diff} ago")
        } else {
            diff
        }
    }

    pub fn is_breached(sla: Option<&SlaBlock>, target: SlaTarget, now: DateTime<Utc>) -> bool {
        Self::target(sla, target).is_some_and(|end| now > end)
    }

    fn format(&self, at: DateTime<Utc>) -> String {
        let mut out = String::new();
        if write!(out, "{}", at.format(&self.date_format)).is_err() {
            warn!(format = %self.date_format, "invalid SLA date format, falling back to RFC 3339");
            return at.to_rfc3339();
        }
        out
    }
}

/// Distance between two instants on a coarse human scale ("5 mins", "2 days").
/// Rounded to the nearest unit, never less than one.
pub fn human_time_diff(from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    let diff = (to - from).num_seconds().abs();
    let (unit_secs, singular, plural) = match diff {
        d if d < HOUR => (MINUTE, "min", "mins"),
        d if d < DAY => (HOUR, "hour", "hours"),
        d if d < WEEK => (DAY, "day", "days"),
        d if d < MONTH => (WEEK, "week", "weeks"),
        d if d < YEAR => (MONTH, "month", "months"),
        _ => (YEAR, "year", "years"),
    };
    let count = ((diff as f64 / unit_secs as f64).round() as i64).max(1);
    format!("{count} {}", if count == 1 { singular } else { plural })
}
