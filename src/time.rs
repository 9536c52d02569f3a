//! Calendar time algebra.
//!
//! Legislation and variable values are scoped by calendar time:
//! - **Instant**: a single calendar day.
//! - **Period**: a contiguous run of days expressed as a unit, a size and a
//!   start instant (`month:2015-03:3` covers March to May 2015).
//!
//! All operations are pure. Month and year offsets clamp to the end of the
//! month when the target day does not exist (Jan 31 + 1 month = Feb 28/29).

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Datelike, Days, Months, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A calendar day.
///
/// # Examples
///
/// ```
/// use legiscalc::time::{Instant, PeriodUnit};
///
/// let jan31 = Instant::new(2016, 1, 31).unwrap();
/// assert_eq!(jan31.offset(PeriodUnit::Month, 1), Instant::new(2016, 2, 29).unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instant(NaiveDate);

impl Instant {
    /// Earliest supported instant.
    pub const MIN: Self = Self(NaiveDate::MIN);

    /// Latest supported instant.
    pub const MAX: Self = Self(NaiveDate::MAX);

    /// Creates an instant from a year, month and day.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidPeriod` if the date does not exist.
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self, ValidationError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidPeriod {
                reason: format!("{year:04}-{month:02}-{day:02} is not a calendar date"),
            })
    }

    /// Wraps a chrono date.
    #[must_use]
    pub const fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The underlying chrono date.
    #[must_use]
    pub const fn date(self) -> NaiveDate {
        self.0
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn month(self) -> u32 {
        self.0.month()
    }

    pub fn day(self) -> u32 {
        self.0.day()
    }

    /// Shifts the instant by `delta` units.
    ///
    /// Month and year offsets clamp to the last day of the target month.
    /// Results saturate at the limits of the supported calendar range.
    #[must_use]
    pub fn offset(self, unit: PeriodUnit, delta: i64) -> Self {
        match self.checked_offset(unit, delta) {
            Some(shifted) => shifted,
            None if delta >= 0 => Self::MAX,
            None => Self::MIN,
        }
    }

    /// Like [`offset`](Self::offset), but `None` past the supported range.
    #[must_use]
    pub fn checked_offset(self, unit: PeriodUnit, delta: i64) -> Option<Self> {
        let magnitude = delta.unsigned_abs();
        let shifted = match unit {
            PeriodUnit::Day => {
                if delta >= 0 {
                    self.0.checked_add_days(Days::new(magnitude))
                } else {
                    self.0.checked_sub_days(Days::new(magnitude))
                }
            }
            PeriodUnit::Month | PeriodUnit::Year => {
                let months = if unit == PeriodUnit::Year {
                    magnitude.checked_mul(12)
                } else {
                    Some(magnitude)
                };
                months
                    .and_then(|m| u32::try_from(m).ok())
                    .and_then(|m| {
                        if delta >= 0 {
                            self.0.checked_add_months(Months::new(m))
                        } else {
                            self.0.checked_sub_months(Months::new(m))
                        }
                    })
            }
        };
        shifted.map(Self)
    }

    /// Returns the first day of the `unit` containing this instant.
    #[must_use]
    pub fn align(self, unit: PeriodUnit) -> Self {
        let date = match unit {
            PeriodUnit::Day => Some(self.0),
            PeriodUnit::Month => self.0.with_day(1),
            PeriodUnit::Year => self.0.with_day(1).and_then(|d| d.with_month(1)),
        };
        // Day 1 and month 1 always exist.
        Self(date.unwrap_or(self.0))
    }

    fn is_month_end(self) -> bool {
        self.offset(PeriodUnit::Day, 1).day() == 1
    }

    fn is_year_end(self) -> bool {
        self.month() == 12 && self.day() == 31
    }

    fn days_until(self, other: Self) -> i64 {
        other.0.signed_duration_since(self.0).num_days()
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for Instant {
    type Err = ValidationError;

    /// Parses `YYYY`, `YYYY-MM` or `YYYY-MM-DD`; missing parts default to 1.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (instant, _) = parse_partial_instant(s)?;
        Ok(instant)
    }
}

/// Parses a possibly partial date, returning the instant and the finest unit
/// the text specified.
fn parse_partial_instant(s: &str) -> Result<(Instant, PeriodUnit), ValidationError> {
    let invalid = || ValidationError::InvalidPeriod {
        reason: format!("'{s}' is not a valid instant"),
    };
    let mut parts = s.trim().split('-');
    let year: i32 = parts
        .next()
        .filter(|p| p.len() == 4)
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let month: Option<u32> = parts.next().map(|p| p.parse().map_err(|_| invalid())).transpose()?;
    let day: Option<u32> = parts.next().map(|p| p.parse().map_err(|_| invalid())).transpose()?;
    if parts.next().is_some() {
        return Err(invalid());
    }
    let unit = match (month, day) {
        (None, _) => PeriodUnit::Year,
        (Some(_), None) => PeriodUnit::Month,
        (Some(_), Some(_)) => PeriodUnit::Day,
    };
    let instant = Instant::new(year, month.unwrap_or(1), day.unwrap_or(1)).map_err(|_| invalid())?;
    Ok((instant, unit))
}

/// Unit of a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Day,
    Month,
    Year,
}

impl PeriodUnit {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl fmt::Display for PeriodUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Self::Day),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(ValidationError::InvalidPeriod {
                reason: format!("unknown period unit '{other}'"),
            }),
        }
    }
}

/// A contiguous run of `size` units starting at `start`.
///
/// Invariants: `size >= 1` and `start <= stop()`.
///
/// # Examples
///
/// ```
/// use legiscalc::time::{Instant, Period, PeriodUnit};
///
/// let period: Period = "month:2015-03:3".parse().unwrap();
/// assert_eq!(period.unit(), PeriodUnit::Month);
/// assert_eq!(period.stop(), Instant::new(2015, 5, 31).unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    unit: PeriodUnit,
    start: Instant,
    size: u32,
}

impl Period {
    /// Creates a period.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidPeriod` if `size` is zero or the
    /// period ends after [`Instant::MAX`].
    pub fn new(unit: PeriodUnit, start: Instant, size: u32) -> Result<Self, ValidationError> {
        if size == 0 {
            return Err(ValidationError::InvalidPeriod {
                reason: "period size must be >= 1".to_string(),
            });
        }
        let period = Self { unit, start, size };
        if period.checked_stop().is_none() {
            return Err(ValidationError::InvalidPeriod {
                reason: format!("{unit}:{start}:{size} ends after the last supported day"),
            });
        }
        Ok(period)
    }

    /// The size-1 period of `unit` containing `instant`, aligned to the
    /// natural boundary of that unit.
    #[must_use]
    pub fn base(unit: PeriodUnit, instant: Instant) -> Self {
        Self {
            unit,
            start: instant.align(unit),
            size: 1,
        }
    }

    /// The calendar year `year`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidPeriod` if the year is out of range.
    pub fn year(year: i32) -> Result<Self, ValidationError> {
        Ok(Self::base(PeriodUnit::Year, Instant::new(year, 1, 1)?))
    }

    /// The calendar month `month` of `year`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidPeriod` if the month does not exist.
    pub fn month(year: i32, month: u32) -> Result<Self, ValidationError> {
        Ok(Self::base(PeriodUnit::Month, Instant::new(year, month, 1)?))
    }

    /// The single day `instant`.
    #[must_use]
    pub fn day(instant: Instant) -> Self {
        Self::base(PeriodUnit::Day, instant)
    }

    /// One `unit` starting exactly at `start`, whether or not `start` is on
    /// a natural boundary of `unit`.
    #[must_use]
    pub fn single(unit: PeriodUnit, start: Instant) -> Self {
        Self { unit, start, size: 1 }
    }

    pub const fn unit(&self) -> PeriodUnit {
        self.unit
    }

    pub const fn start(&self) -> Instant {
        self.start
    }

    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Last instant covered by the period. Never before `start`: a period
    /// running past [`Instant::MAX`] ends there.
    #[must_use]
    pub fn stop(&self) -> Instant {
        self.checked_stop().unwrap_or(Instant::MAX)
    }

    fn checked_stop(&self) -> Option<Instant> {
        if let Some(next) = self.start.checked_offset(self.unit, i64::from(self.size)) {
            return next.checked_offset(PeriodUnit::Day, -1);
        }
        // The following unit starts past the calendar; an aligned last unit
        // still ends on the last supported day.
        let last = self.start.checked_offset(self.unit, i64::from(self.size) - 1)?;
        (last.align(self.unit) == last).then_some(Instant::MAX)
    }

    /// Number of days covered by the period.
    #[must_use]
    pub fn days(&self) -> i64 {
        self.start.days_until(self.stop()) + 1
    }

    #[must_use]
    pub fn contains_instant(&self, instant: Instant) -> bool {
        self.start <= instant && instant <= self.stop()
    }

    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.start <= other.start && other.stop() <= self.stop()
    }

    /// Shifts the period by `delta` of its own unit, keeping its size.
    #[must_use]
    pub fn offset(&self, delta: i64) -> Self {
        Self {
            unit: self.unit,
            start: self.start.offset(self.unit, delta),
            size: self.size,
        }
    }

    /// Clips the period to `[lower, upper]` (either bound optional).
    ///
    /// Returns `None` when nothing remains. A clipped range is re-expressed in
    /// the coarsest unit whose natural boundaries it matches.
    #[must_use]
    pub fn intersection(&self, lower: Option<Instant>, upper: Option<Instant>) -> Option<Self> {
        let own_stop = self.stop();
        let start = lower.map_or(self.start, |l| l.max(self.start));
        let stop = upper.map_or(own_stop, |u| u.min(own_stop));
        if start > stop {
            return None;
        }
        if start == self.start && stop == own_stop {
            return Some(*self);
        }
        Some(Self::covering(start, stop))
    }

    /// The period exactly covering `[start, stop]`.
    fn covering(start: Instant, stop: Instant) -> Self {
        if start.month() == 1 && start.day() == 1 && stop.is_year_end() {
            let years = stop.year() - start.year() + 1;
            if let Ok(size) = u32::try_from(years) {
                return Self { unit: PeriodUnit::Year, start, size };
            }
        }
        if start.day() == 1 && stop.is_month_end() {
            let months = (stop.year() - start.year()) * 12 + stop.month() as i32 - start.month() as i32 + 1;
            if let Ok(size) = u32::try_from(months) {
                return Self { unit: PeriodUnit::Month, start, size };
            }
        }
        let days = start.days_until(stop) + 1;
        Self {
            unit: PeriodUnit::Day,
            start,
            size: u32::try_from(days).unwrap_or(u32::MAX),
        }
    }

    fn is_aligned(&self) -> bool {
        self.start.align(self.unit) == self.start
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = if self.is_aligned() {
            match self.unit {
                PeriodUnit::Year => format!("{:04}", self.start.year()),
                PeriodUnit::Month => format!("{:04}-{:02}", self.start.year(), self.start.month()),
                PeriodUnit::Day => self.start.to_string(),
            }
        } else {
            self.start.to_string()
        };
        if self.size == 1 && self.is_aligned() {
            f.write_str(&start)
        } else {
            write!(f, "{}:{}:{}", self.unit, start, self.size)
        }
    }
}

fn period_regex() -> Result<&'static Regex, ValidationError> {
    static PERIOD_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PERIOD_RE
        .get_or_init(|| Regex::new(r"^(?:(day|month|year):)?(\d{4}(?:-\d{2}(?:-\d{2})?)?)(?::(\d+))?$"))
        .as_ref()
        .map_err(|e| ValidationError::InvalidPeriod {
            reason: format!("period pattern failed to compile: {e}"),
        })
}

impl FromStr for Period {
    type Err = ValidationError;

    /// Parses `2015`, `2015-03`, `2015-03-01` or `unit:start[:size]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = period_regex()?
            .captures(s.trim())
            .ok_or_else(|| ValidationError::InvalidPeriod {
                reason: format!("'{s}' is not a valid period"),
            })?;
        let (start, precision) = parse_partial_instant(&caps[2])?;
        let size = caps
            .get(3)
            .map(|m| m.as_str().parse::<u32>())
            .transpose()
            .map_err(|e| ValidationError::InvalidPeriod {
                reason: format!("invalid size in '{s}': {e}"),
            })?;
        match caps.get(1) {
            Some(unit) => Self::new(unit.as_str().parse()?, start, size.unwrap_or(1)),
            None if size.is_some() => Err(ValidationError::InvalidPeriod {
                reason: format!("'{s}' gives a size without a unit"),
            }),
            None => Self::new(precision, start, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> Instant {
        Instant::new(y, m, day).unwrap()
    }

    #[test]
    fn test_base_aligns_to_unit_boundary() {
        let instant = d(2015, 3, 17);
        assert_eq!(Period::base(PeriodUnit::Year, instant).start(), d(2015, 1, 1));
        assert_eq!(Period::base(PeriodUnit::Month, instant).start(), d(2015, 3, 1));
        assert_eq!(Period::base(PeriodUnit::Day, instant).start(), instant);
    }

    #[test]
    fn test_stop_instant() {
        assert_eq!(Period::year(2015).unwrap().stop(), d(2015, 12, 31));
        assert_eq!(Period::month(2016, 2).unwrap().stop(), d(2016, 2, 29));
        let three_months = Period::new(PeriodUnit::Month, d(2015, 11, 1), 3).unwrap();
        assert_eq!(three_months.stop(), d(2016, 1, 31));
        assert_eq!(Period::day(d(2015, 1, 1)).stop(), d(2015, 1, 1));
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(Period::new(PeriodUnit::Year, d(2015, 1, 1), 0).is_err());
    }

    #[test]
    fn test_month_offset_clamps_to_month_end() {
        assert_eq!(d(2015, 1, 31).offset(PeriodUnit::Month, 1), d(2015, 2, 28));
        assert_eq!(d(2016, 2, 29).offset(PeriodUnit::Year, 1), d(2017, 2, 28));
        assert_eq!(d(2015, 3, 31).offset(PeriodUnit::Month, -1), d(2015, 2, 28));
        assert_eq!(d(2015, 1, 1).offset(PeriodUnit::Day, -1), d(2014, 12, 31));
    }

    #[test]
    fn test_offset_saturates() {
        let far = d(2015, 1, 1).offset(PeriodUnit::Year, i64::MAX);
        assert_eq!(far.date(), NaiveDate::MAX);
    }

    #[test]
    fn test_intersection_inside_returns_same_period() {
        let year = Period::year(2015).unwrap();
        assert_eq!(year.intersection(None, None), Some(year));
        assert_eq!(year.intersection(Some(d(2010, 1, 1)), Some(d(2020, 1, 1))), Some(year));
    }

    #[test]
    fn test_intersection_reexpresses_clipped_range() {
        let year = Period::year(2015).unwrap();
        let clipped = year.intersection(Some(d(2015, 7, 1)), None).unwrap();
        assert_eq!(clipped.unit(), PeriodUnit::Month);
        assert_eq!(clipped.size(), 6);
        assert_eq!(clipped.start(), d(2015, 7, 1));

        let odd = year.intersection(Some(d(2015, 7, 15)), Some(d(2015, 7, 20))).unwrap();
        assert_eq!(odd.unit(), PeriodUnit::Day);
        assert_eq!(odd.size(), 6);

        let years = Period::new(PeriodUnit::Year, d(2014, 1, 1), 3).unwrap();
        let two = years.intersection(Some(d(2015, 1, 1)), None).unwrap();
        assert_eq!(two, Period::new(PeriodUnit::Year, d(2015, 1, 1), 2).unwrap());
    }

    #[test]
    fn test_intersection_empty() {
        let year = Period::year(2015).unwrap();
        assert!(year.intersection(Some(d(2016, 1, 1)), None).is_none());
        assert!(year.intersection(None, Some(d(2014, 12, 31))).is_none());
    }

    #[test]
    fn test_period_offset_and_contains() {
        let march = Period::month(2015, 3).unwrap();
        assert_eq!(march.offset(-3), Period::month(2014, 12).unwrap());
        assert!(Period::year(2015).unwrap().contains(&march));
        assert!(march.contains_instant(d(2015, 3, 31)));
        assert!(!march.contains_instant(d(2015, 4, 1)));
        assert_eq!(Period::year(2016).unwrap().days(), 366);
    }

    #[test]
    fn test_parse_and_display() {
        for text in ["2015", "2015-03", "2015-03-01", "year:2014:2", "month:2015-03:3", "day:2015-03-01:10"] {
            let period: Period = text.parse().unwrap();
            assert_eq!(period.to_string(), text);
        }
        let unaligned: Period = "year:2015-03-01".parse().unwrap();
        assert_eq!(unaligned.to_string(), "year:2015-03-01:1");
        assert_eq!(unaligned.to_string().parse::<Period>().unwrap(), unaligned);
    }

    #[test]
    fn test_stop_never_precedes_start_at_calendar_end() {
        let last = Period::day(Instant::MAX);
        assert_eq!(last.stop(), Instant::MAX);
        assert_eq!(last.days(), 1);

        let last_year = Period::base(PeriodUnit::Year, Instant::MAX);
        assert_eq!(last_year.stop(), Instant::MAX);
        assert!(Period::new(PeriodUnit::Year, last_year.start(), 1).is_ok());

        assert!(Period::new(PeriodUnit::Day, Instant::MAX, 2).is_err());
        assert!(Period::new(PeriodUnit::Year, d(2015, 1, 1), u32::MAX).is_err());
        assert!("year:2015:4000000000".parse::<Period>().is_err());

        let shifted = Period::day(d(2015, 1, 1)).offset(i64::MAX);
        assert!(shifted.start() <= shifted.stop());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("15".parse::<Period>().is_err());
        assert!("2015:2".parse::<Period>().is_err());
        assert!("week:2015".parse::<Period>().is_err());
        assert!("2015-13".parse::<Period>().is_err());
        assert!("year:2015:0".parse::<Period>().is_err());
    }

    #[test]
    fn test_instant_serialization() {
        let instant = d(2015, 3, 1);
        let json = serde_json::to_string(&instant).unwrap();
        assert_eq!(json, "\"2015-03-01\"");
        let back: Instant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, instant);
    }
}
