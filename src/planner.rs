//! Cursor planning for a calendar date range.
//!
//! The replay endpoint returns the matches recorded in the window ending at a
//! `before` timestamp. A [`WindowPlan`] turns an inclusive date range into a
//! deterministic sequence of such cursors, advancing from the range start by a
//! fixed window until the effective end is reached:
//!
//! ```text
//! start = 00:00:00 UTC on start_date
//! end   = min(23:59:59 UTC on end_date, now)
//! steps = ceil((end - start) / window)
//! cursor(step) = min(start + step * window, end)      step in 1..=steps
//! ```
//!
//! Planning is a pure function of its inputs: "now" is passed in, so the same
//! arguments always yield the same plan and a run can be resumed from any step.
//!
//! # Example
//!
//! ```
//! use replay_core::planner::{DateRange, WindowPlan};
//!
//! let range = DateRange::parse("2025-09-01", "2025-09-02").unwrap();
//! let plan = WindowPlan::new(&range, 700, i64::MAX).unwrap();
//! assert_eq!(plan.total_steps(), 247);
//! assert!(!plan.clamped_to_now());
//! ```

use std::fmt;

use chrono::{NaiveDate, NaiveTime};

use crate::config::ConfigError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive calendar date range, interpreted in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Creates a range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EndBeforeStart`] when `end < start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigError> {
        if end < start {
            return Err(ConfigError::EndBeforeStart {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parses two `YYYY-MM-DD` strings into a range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDate`] for malformed input and
    /// [`ConfigError::EndBeforeStart`] for a reversed range.
    pub fn parse(start: &str, end: &str) -> Result<Self, ConfigError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// First day of the range.
    #[must_use]
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the range.
    #[must_use]
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Epoch seconds at the start of the first day.
    #[must_use]
    pub fn start_timestamp(&self) -> i64 {
        self.start.and_time(NaiveTime::MIN).and_utc().timestamp()
    }

    /// Epoch seconds of the last second of the final day
    /// (next midnight minus one second).
    #[must_use]
    pub fn end_timestamp(&self) -> i64 {
        self.end.and_time(NaiveTime::MIN).and_utc().timestamp() + 86_400 - 1
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.start, self.end)
    }
}

/// Parses one `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDate`] when the value does not parse.
pub fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| ConfigError::InvalidDate {
        value: value.to_string(),
    })
}

/// One fetch cursor: the `before` timestamp of a window and its 1-based step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Position in the plan, starting at 1.
    pub step: usize,
    /// Upper bound of the window in epoch seconds.
    pub before: i64,
}

/// Deterministic cursor sequence covering a date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    start: i64,
    end: i64,
    window: i64,
    total_steps: usize,
    clamped_to_now: bool,
}

impl WindowPlan {
    /// Plans the cursors for `range` with windows of `window_seconds`,
    /// never reaching past `now` (epoch seconds).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::StartInFuture`] when the range begins at or
    /// after `now`, and [`ConfigError::OutOfRange`] for a zero window.
    pub fn new(range: &DateRange, window_seconds: u32, now: i64) -> Result<Self, ConfigError> {
        if window_seconds == 0 {
            return Err(ConfigError::OutOfRange {
                field: "batch_window_seconds",
                value: "0".to_string(),
                expected: "1..=86400",
            });
        }

        let start = range.start_timestamp();
        if start >= now {
            return Err(ConfigError::StartInFuture {
                start: range.start().to_string(),
            });
        }

        let mut end = range.end_timestamp();
        let clamped_to_now = end > now;
        if clamped_to_now {
            end = now;
        }

        let window = i64::from(window_seconds);
        let span = end - start;
        let total_steps = usize::try_from((span + window - 1) / window).unwrap_or(0);

        Ok(Self {
            start,
            end,
            window,
            total_steps,
            clamped_to_now,
        })
    }

    /// Number of cursors in the plan.
    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Whether the end of the range was pulled back to the current time.
    #[must_use]
    pub fn clamped_to_now(&self) -> bool {
        self.clamped_to_now
    }

    /// Effective start in epoch seconds.
    #[must_use]
    pub fn start(&self) -> i64 {
        self.start
    }

    /// Effective end in epoch seconds.
    #[must_use]
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Returns the cursor for a 1-based step, or `None` outside the plan.
    #[must_use]
    pub fn cursor_at(&self, step: usize) -> Option<Cursor> {
        if step == 0 || step > self.total_steps {
            return None;
        }
        let offset = i64::try_from(step).ok()?.checked_mul(self.window)?;
        Some(Cursor {
            step,
            before: (self.start + offset).min(self.end),
        })
    }

    /// Iterates every cursor in order.
    #[must_use]
    pub fn cursors(&self) -> Cursors<'_> {
        self.cursors_from(1)
    }

    /// Iterates cursors starting at a 1-based step.
    #[must_use]
    pub fn cursors_from(&self, step: usize) -> Cursors<'_> {
        Cursors {
            plan: self,
            next: step.max(1),
        }
    }
}

/// Iterator over the cursors of a [`WindowPlan`].
#[derive(Debug, Clone)]
pub struct Cursors<'a> {
    plan: &'a WindowPlan,
    next: usize,
}

impl Iterator for Cursors<'_> {
    type Item = Cursor;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.plan.cursor_at(self.next)?;
        self.next += 1;
        Some(cursor)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.plan.total_steps + 1).saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Cursors<'_> {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::parse(start, end).unwrap()
    }

    #[test]
    fn test_two_day_range_has_247_steps() {
        let plan = WindowPlan::new(&range("2025-09-01", "2025-09-02"), 700, i64::MAX).unwrap();
        assert_eq!(plan.end() - plan.start(), 172_799);
        assert_eq!(plan.total_steps(), 247);
        assert_eq!(plan.cursors().count(), 247);
    }

    #[test]
    fn test_cursors_increase_and_end_at_range_end() {
        let plan = WindowPlan::new(&range("2025-09-01", "2025-09-02"), 700, i64::MAX).unwrap();
        let cursors: Vec<Cursor> = plan.cursors().collect();

        assert_eq!(cursors[0].step, 1);
        assert_eq!(cursors[0].before, plan.start() + 700);
        assert!(cursors.windows(2).all(|w| w[0].before < w[1].before));
        assert_eq!(cursors.last().unwrap().before, plan.end());
    }

    #[test]
    fn test_single_day_step_count() {
        let plan = WindowPlan::new(&range("2025-09-01", "2025-09-01"), 700, i64::MAX).unwrap();
        // 86399 / 700 = 123.4
        assert_eq!(plan.total_steps(), 124);
    }

    #[test]
    fn test_end_in_future_is_clamped_to_now() {
        let r = range("2025-09-01", "2025-09-30");
        let now = r.start_timestamp() + 10_000;
        let plan = WindowPlan::new(&r, 700, now).unwrap();

        assert!(plan.clamped_to_now());
        assert_eq!(plan.end(), now);
        assert_eq!(plan.total_steps(), 15); // ceil(10000 / 700)
        assert!(plan.cursors().all(|c| c.before <= now));
        assert_eq!(plan.cursors().last().unwrap().before, now);
    }

    #[test]
    fn test_start_in_future_is_rejected() {
        let r = range("2030-01-01", "2030-01-02");
        let now = r.start_timestamp() - 1;
        assert!(matches!(
            WindowPlan::new(&r, 700, now),
            Err(ConfigError::StartInFuture { .. })
        ));
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        assert!(matches!(
            DateRange::parse("2025-09-02", "2025-09-01"),
            Err(ConfigError::EndBeforeStart { .. })
        ));
    }

    #[test]
    fn test_invalid_date_is_rejected() {
        assert!(matches!(
            DateRange::parse("2025-13-01", "2025-09-01"),
            Err(ConfigError::InvalidDate { .. })
        ));
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_cursors_from_resumes_mid_plan() {
        let plan = WindowPlan::new(&range("2025-09-01", "2025-09-02"), 700, i64::MAX).unwrap();
        let resumed: Vec<Cursor> = plan.cursors_from(11).collect();

        assert_eq!(resumed.len(), 237);
        assert_eq!(resumed[0], plan.cursor_at(11).unwrap());
        assert_eq!(plan.cursors_from(11).len(), 237);
    }

    #[test]
    fn test_cursor_at_outside_plan_is_none() {
        let plan = WindowPlan::new(&range("2025-09-01", "2025-09-01"), 700, i64::MAX).unwrap();
        assert!(plan.cursor_at(0).is_none());
        assert!(plan.cursor_at(plan.total_steps() + 1).is_none());
    }

    #[test]
    fn test_step_count_property_over_many_windows() {
        let r = range("2025-01-01", "2025-01-10");
        for window in [1_u32, 59, 600, 700, 3_600, 86_400] {
            let plan = WindowPlan::new(&r, window, i64::MAX).unwrap();
            let span = plan.end() - plan.start();
            let expected = (span + i64::from(window) - 1) / i64::from(window);
            assert_eq!(plan.total_steps() as i64, expected, "window {window}");
            assert_eq!(plan.cursors().count(), plan.total_steps());
        }
    }

    #[test]
    fn test_display_uses_store_suffix_format() {
        assert_eq!(
            range("2025-09-01", "2025-09-02").to_string(),
            "2025-09-01_2025-09-02"
        );
    }
}
