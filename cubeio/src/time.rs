use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use ndarray::Array1;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{Error, Result};

/// A calendar day as (year, month, day)
pub type Ymd = (i32, u32, u32);

static UNITS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*([A-Za-z]+)\s+since\s+(-?\d{1,4})-(\d{1,2})-(\d{1,2})(?:[ T](\d{1,2}):(\d{1,2})(?::(\d{1,2}))?(?:\.\d+)?)?",
    )
    .expect("time units pattern is valid")
});

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Largest offset from the reference date, in milliseconds, that is converted to a date
const MAX_OFFSET_MILLIS: f64 = 1e17;

/// The calendars time coordinates can be defined in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Calendar {
    /// Gregorian leap years, extended back before 1582
    Gregorian,

    /// 365 days every year
    NoLeap,

    /// 366 days every year
    AllLeap,

    /// Twelve months of 30 days
    Day360,
}

impl Calendar {
    /// Parse a CF calendar name. No calendar means the standard calendar.
    ///
    pub fn parse(name: Option<&str>) -> Result<Self> {
        let name = match name {
            Some(name) => name.to_lowercase(),
            None => return Ok(Calendar::Gregorian),
        };
        match name.as_str() {
            "standard" | "gregorian" | "proleptic_gregorian" => Ok(Calendar::Gregorian),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            _ => Err(Error::Time(format!("Unsupported calendar: {name}"))),
        }
    }

    /// Number of days in a month, or 0 if `month` isn't one
    pub fn days_in_month(&self, year: i32, month: u32) -> u32 {
        match (self, month) {
            (_, month) if !(1..=12).contains(&month) => 0,
            (Calendar::Day360, _) => 30,
            (Calendar::NoLeap, 2) => 28,
            (Calendar::AllLeap, 2) => 29,
            (Calendar::Gregorian, 2) if is_leap_year(year) => 29,
            (Calendar::Gregorian, 2) => 28,
            (_, 4 | 6 | 9 | 11) => 30,
            _ => 31,
        }
    }

    /// Whether a day exists in this calendar
    pub fn is_valid(&self, (year, month, day): Ymd) -> bool {
        day >= 1 && day <= self.days_in_month(year, month)
    }

    fn days_in_year(&self, year: i32) -> i64 {
        (1..=12).map(|month| self.days_in_month(year, month) as i64).sum()
    }

    /// Count of days from a fixed origin to a day. Only differences between counts mean anything.
    fn day_number(&self, (year, month, day): Ymd) -> Result<i64> {
        if !self.is_valid((year, month, day)) {
            return Err(Error::Time(format!(
                "{year}-{month}-{day} is not a date in the {self:?} calendar"
            )));
        }

        match self {
            Calendar::Gregorian => NaiveDate::from_ymd_opt(year, month, day)
                .map(|date| date.num_days_from_ce() as i64)
                .ok_or_else(|| Error::Time(format!("{year}-{month}-{day} is out of range"))),
            _ => {
                let before_month: i64 = (1..month)
                    .map(|month| self.days_in_month(year, month) as i64)
                    .sum();
                Ok(year as i64 * self.days_in_year(year) + before_month + day as i64 - 1)
            }
        }
    }

    /// Inverse of `day_number`
    fn ymd_of_day_number(&self, days: i64) -> Result<Ymd> {
        let out_of_range = || Error::Time(format!("Day {days} is out of range"));
        match self {
            Calendar::Gregorian => {
                let days = i32::try_from(days).map_err(|_| out_of_range())?;
                NaiveDate::from_num_days_from_ce_opt(days)
                    .map(|date| (date.year(), date.month(), date.day()))
                    .ok_or_else(out_of_range)
            }
            _ => {
                // Every year has the same length
                let year_len = self.days_in_year(0);
                let year = i32::try_from(days.div_euclid(year_len)).map_err(|_| out_of_range())?;
                let mut remaining = days.rem_euclid(year_len);
                let mut month = 1;
                while month < 12 && remaining >= self.days_in_month(year, month) as i64 {
                    remaining -= self.days_in_month(year, month) as i64;
                    month += 1;
                }

                Ok((year, month, remaining as u32 + 1))
            }
        }
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// A date and time in one of the supported calendars.
///
/// Unlike `chrono` dates, this can hold days that only exist in some calendars, like the 30th of
/// February in the 360 day calendar. Ordering is chronological.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CfDateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,

    /// Milliseconds since midnight
    pub millis: u32,
}

impl CfDateTime {
    /// Midnight at the start of a day
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self {
            year,
            month,
            day,
            millis: 0,
        }
    }

    pub fn and_hms(self, hour: u32, minute: u32, second: u32) -> Self {
        Self {
            millis: ((hour * 60 + minute) * 60 + second) * 1000,
            ..self
        }
    }

    /// The calendar day
    pub fn ymd(&self) -> Ymd {
        (self.year, self.month, self.day)
    }
}

impl From<NaiveDateTime> for CfDateTime {
    fn from(date: NaiveDateTime) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            millis: date.num_seconds_from_midnight() * 1000 + date.nanosecond() / 1_000_000,
        }
    }
}

impl fmt::Display for CfDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.millis / 1000;
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year,
            self.month,
            self.day,
            seconds / 3600,
            seconds / 60 % 60,
            seconds % 60
        )?;
        match self.millis % 1000 {
            0 => Ok(()),
            millis => write!(f, ".{millis:03}"),
        }
    }
}

/// Parsed time units of the form `<unit> since <reference date>`, in a calendar
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeUnits {
    /// Number of seconds in one unit
    seconds: f64,

    calendar: Calendar,

    /// The reference date
    epoch: CfDateTime,

    /// The reference date as milliseconds from the calendar's origin
    epoch_millis: i64,
}

impl TimeUnits {
    /// Parse a units string, eg "days since 1850-01-01 00:00:00"
    ///
    /// # Arguments
    ///
    /// * `units` - The units string.
    /// * `calendar` - The CF calendar the units are defined in, if any.
    ///
    pub fn parse(units: &str, calendar: Option<&str>) -> Result<Self> {
        let calendar = Calendar::parse(calendar)?;

        let captures = UNITS
            .captures(units)
            .ok_or_else(|| Error::Time(format!("Not a time unit: {units}")))?;
        let seconds = match captures[1].to_lowercase().as_str() {
            "days" | "day" | "d" => 86400.0,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
            "minutes" | "minute" | "mins" | "min" => 60.0,
            "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
            unit => return Err(Error::Time(format!("Unknown time unit: {unit}"))),
        };

        let bad_date = || Error::Time(format!("Bad reference date: {units}"));
        let field = |index: usize| -> Result<i64> {
            match captures.get(index) {
                Some(value) => value.as_str().parse().map_err(|_| bad_date()),
                None => Ok(0),
            }
        };
        let (hour, minute, second) = (field(5)?, field(6)?, field(7)?);
        if hour >= 24 || minute >= 60 || second >= 60 {
            return Err(bad_date());
        }
        let epoch = CfDateTime::new(field(2)? as i32, field(3)? as u32, field(4)? as u32)
            .and_hms(hour as u32, minute as u32, second as u32);
        let epoch_millis = calendar
            .day_number(epoch.ymd())
            .map_err(|_| bad_date())?
            * MILLIS_PER_DAY
            + epoch.millis as i64;

        Ok(Self {
            seconds,
            calendar,
            epoch,
            epoch_millis,
        })
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    pub fn epoch(&self) -> CfDateTime {
        self.epoch
    }

    /// Convert a point value to a date and time, rounded to the millisecond
    ///
    pub fn num2date(&self, value: f64) -> Result<CfDateTime> {
        let offset = (value * self.seconds * 1000.0).round();
        if !offset.is_finite() || offset.abs() > MAX_OFFSET_MILLIS {
            return Err(Error::Time(format!(
                "Time value {value} is out of range for a date"
            )));
        }

        let millis = self
            .epoch_millis
            .checked_add(offset as i64)
            .ok_or_else(|| Error::Time(format!("Time value {value} is out of range for a date")))?;
        let (year, month, day) = self
            .calendar
            .ymd_of_day_number(millis.div_euclid(MILLIS_PER_DAY))?;

        Ok(CfDateTime {
            year,
            month,
            day,
            millis: millis.rem_euclid(MILLIS_PER_DAY) as u32,
        })
    }

    /// Convert a date and time to a point value
    ///
    pub fn date2num(&self, date: CfDateTime) -> Result<f64> {
        let millis =
            self.calendar.day_number(date.ymd())? * MILLIS_PER_DAY + date.millis as i64;
        Ok((millis - self.epoch_millis) as f64 / 1000.0 / self.seconds)
    }
}

/// A regular time axis, used to build evenly spaced time coordinates.
///
#[derive(Clone)]
pub struct TimeRange {
    pub start: f64,
    pub step: f64,
}

impl TimeRange {
    pub fn new(start: f64, step: f64) -> Self {
        Self { start, step }
    }

    pub fn get(&self, index: usize) -> f64 {
        self.start + (index as f64) * self.step
    }

    pub fn slice(&self, start: usize, stop: usize) -> Array1<f64> {
        Array1::from_iter((start..stop).map(|i| self.get(i)))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn date(year: i32, month: u32, day: u32) -> CfDateTime {
        CfDateTime::new(year, month, day)
    }

    #[test]
    fn test_get() {
        let range = TimeRange::new(0.5, 1.0);
        assert_eq!(range.get(0), 0.5);
        assert_eq!(range.get(100), 100.5);
    }

    #[test]
    fn test_slice() {
        let range = TimeRange::new(0.5, 1.0);
        assert_eq!(range.slice(100, 102), array![100.5, 101.5]);
    }

    #[test]
    fn test_num2date_days() -> Result<()> {
        let units = TimeUnits::parse("days since 1850-01-01 00:00:00", Some("standard"))?;
        assert_eq!(units.num2date(0.0)?, date(1850, 1, 1));
        assert_eq!(units.num2date(31.0)?, date(1850, 2, 1));
        assert_eq!(units.num2date(0.5)?, date(1850, 1, 1).and_hms(12, 0, 0));
        assert_eq!(units.num2date(-1.0)?, date(1849, 12, 31));

        Ok(())
    }

    #[test]
    fn test_num2date_hours() -> Result<()> {
        let units = TimeUnits::parse("hours since 2000-01-01", None)?;
        assert_eq!(units.num2date(48.0)?, date(2000, 1, 3));
        assert_eq!(units.num2date(1429.5)?, date(2000, 2, 29).and_hms(13, 30, 0));

        Ok(())
    }

    #[test]
    fn test_date2num_inverts_num2date() -> Result<()> {
        let units = TimeUnits::parse("days since 1970-01-01T00:00:00", Some("gregorian"))?;
        assert_eq!(units.date2num(date(1970, 1, 11))?, 10.0);
        assert_eq!(units.date2num(units.num2date(12345.25)?)?, 12345.25);

        Ok(())
    }

    #[test]
    fn test_noleap() -> Result<()> {
        let units = TimeUnits::parse("days since 2000-01-01", Some("noleap"))?;
        assert_eq!(units.num2date(58.0)?, date(2000, 2, 28));
        assert_eq!(units.num2date(59.0)?, date(2000, 3, 1));
        assert_eq!(units.num2date(365.0)?, date(2001, 1, 1));
        assert_eq!(units.num2date(-365.0)?, date(1999, 1, 1));
        assert_eq!(units.date2num(date(2004, 3, 1))?, 4.0 * 365.0 + 59.0);

        let units = TimeUnits::parse("days since 2000-01-01", Some("365_day"))?;
        assert_eq!(units.num2date(59.0)?, date(2000, 3, 1));

        Ok(())
    }

    #[test]
    fn test_all_leap() -> Result<()> {
        let units = TimeUnits::parse("days since 2001-01-01", Some("all_leap"))?;
        assert_eq!(units.num2date(59.0)?, date(2001, 2, 29));
        assert_eq!(units.num2date(365.0)?, date(2001, 12, 31));
        assert_eq!(units.num2date(366.0)?, date(2002, 1, 1));

        Ok(())
    }

    #[test]
    fn test_360_day() -> Result<()> {
        let units = TimeUnits::parse("days since 2000-01-01", Some("360_day"))?;
        assert_eq!(units.num2date(59.5)?, date(2000, 2, 30).and_hms(12, 0, 0));
        assert_eq!(units.num2date(360.0)?, date(2001, 1, 1));
        assert_eq!(units.num2date(-1.0)?, date(1999, 12, 30));
        assert_eq!(units.date2num(date(2000, 2, 30))?, 59.0);

        // Only valid in a 360 day calendar
        let units = TimeUnits::parse("days since 2000-02-30", Some("360_day"))?;
        assert_eq!(units.epoch(), date(2000, 2, 30));
        assert!(TimeUnits::parse("days since 2000-02-30", Some("standard")).is_err());

        Ok(())
    }

    #[test]
    fn test_out_of_range() -> Result<()> {
        let units = TimeUnits::parse("days since 2000-01-01", None)?;
        assert!(matches!(units.num2date(1e20), Err(Error::Time(_))));
        assert!(matches!(units.num2date(f64::NAN), Err(Error::Time(_))));
        assert!(matches!(units.num2date(f64::INFINITY), Err(Error::Time(_))));

        // Past the last year chrono can represent
        assert!(matches!(units.num2date(1e9), Err(Error::Time(_))));

        Ok(())
    }

    #[test]
    fn test_bad_units() {
        assert!(matches!(
            TimeUnits::parse("kelvin", None),
            Err(Error::Time(_))
        ));
        assert!(matches!(
            TimeUnits::parse("fortnights since 2000-01-01", None),
            Err(Error::Time(_))
        ));
        assert!(matches!(
            TimeUnits::parse("days since 2000-13-01", None),
            Err(Error::Time(_))
        ));
        assert!(matches!(
            TimeUnits::parse("days since 2000-01-01 25:00:00", None),
            Err(Error::Time(_))
        ));
        assert!(matches!(
            TimeUnits::parse("days since 2000-01-01", Some("julian")),
            Err(Error::Time(_))
        ));
    }

    #[test]
    fn test_calendar_names() -> Result<()> {
        assert_eq!(Calendar::parse(None)?, Calendar::Gregorian);
        assert_eq!(Calendar::parse(Some("Proleptic_Gregorian"))?, Calendar::Gregorian);
        assert_eq!(Calendar::parse(Some("365_day"))?, Calendar::NoLeap);
        assert_eq!(Calendar::parse(Some("366_day"))?, Calendar::AllLeap);
        assert_eq!(Calendar::parse(Some("360_day"))?, Calendar::Day360);

        Ok(())
    }

    #[test]
    fn test_display() {
        assert_eq!(date(2000, 2, 30).and_hms(12, 0, 0).to_string(), "2000-02-30 12:00:00");
        let precise = CfDateTime {
            millis: 1500,
            ..date(850, 1, 2)
        };
        assert_eq!(precise.to_string(), "0850-01-02 00:00:01.500");
    }

    #[test]
    fn test_from_chrono() {
        let naive = NaiveDate::from_ymd_opt(2001, 3, 4)
            .unwrap()
            .and_hms_opt(13, 0, 2)
            .unwrap();
        let date = CfDateTime::from(naive);
        assert_eq!(date, CfDateTime::new(2001, 3, 4).and_hms(13, 0, 2));
        assert_eq!(date.ymd(), (2001, 3, 4));
    }
}
