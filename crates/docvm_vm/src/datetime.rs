//! Calendar arithmetic on millisecond dates in fixed-offset timezones.
//!
//! Dates are milliseconds since the Unix epoch. All calendar decisions are
//! made in the local time of a [`FixedOffset`]; results are converted back to
//! UTC milliseconds.

use chrono::{DateTime, Datelike, FixedOffset, Months, NaiveDate, NaiveDateTime, Timelike};
use docvm_foundation::Value;

const MILLIS_PER_SECOND: i64 = 1000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// 2000-01-01T00:00:00Z, the reference point for binned truncation.
const REFERENCE_MILLIS: i64 = 946_684_800_000;

/// A calendar or clock unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TimeUnit {
    /// Calendar year.
    Year,
    /// Calendar quarter.
    Quarter,
    /// Calendar month.
    Month,
    /// Seven days starting on a configurable day.
    Week,
    /// Day.
    Day,
    /// Hour.
    Hour,
    /// Minute.
    Minute,
    /// Second.
    Second,
    /// Millisecond.
    Millisecond,
}

impl TimeUnit {
    const ALL: [TimeUnit; 9] = [
        Self::Year,
        Self::Quarter,
        Self::Month,
        Self::Week,
        Self::Day,
        Self::Hour,
        Self::Minute,
        Self::Second,
        Self::Millisecond,
    ];

    /// Parses a unit name such as `"day"`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.name() == name)
    }

    /// Decodes a unit byte.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(usize::from(byte)).copied()
    }

    /// The unit name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Quarter => "quarter",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Millisecond => "millisecond",
        }
    }

    /// Length in milliseconds for units of fixed length.
    #[must_use]
    pub const fn fixed_millis(self) -> Option<i64> {
        match self {
            Self::Week => Some(7 * MILLIS_PER_DAY),
            Self::Day => Some(MILLIS_PER_DAY),
            Self::Hour => Some(MILLIS_PER_HOUR),
            Self::Minute => Some(MILLIS_PER_MINUTE),
            Self::Second => Some(MILLIS_PER_SECOND),
            Self::Millisecond => Some(1),
            Self::Year | Self::Quarter | Self::Month => None,
        }
    }

    /// Number of months for calendar units.
    const fn months(self) -> Option<u32> {
        match self {
            Self::Year => Some(12),
            Self::Quarter => Some(3),
            Self::Month => Some(1),
            _ => None,
        }
    }
}

/// Day on which a week starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DayOfWeek {
    /// Sunday.
    #[default]
    Sunday,
    /// Monday.
    Monday,
    /// Tuesday.
    Tuesday,
    /// Wednesday.
    Wednesday,
    /// Thursday.
    Thursday,
    /// Friday.
    Friday,
    /// Saturday.
    Saturday,
}

impl DayOfWeek {
    const ALL: [DayOfWeek; 7] = [
        Self::Sunday,
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
    ];

    /// Parses a full or three-letter day name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.name() == lower || (lower.len() == 3 && d.name().starts_with(&lower)))
    }

    /// Decodes a day byte (0 = Sunday).
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(usize::from(byte)).copied()
    }

    /// Lowercase full name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sunday => "sunday",
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
        }
    }
}

/// Milliseconds since the epoch of a Date, or of a Timestamp's seconds.
pub(crate) fn date_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Date(ms) => Some(*ms),
        Value::Timestamp(ts) => i64::try_from(ts >> 32).ok()?.checked_mul(1000),
        _ => None,
    }
}

fn offset_millis(offset: FixedOffset) -> i64 {
    i64::from(offset.local_minus_utc()) * MILLIS_PER_SECOND
}

/// Local wall-clock time of `date` in `offset`.
#[must_use]
pub fn local(date: i64, offset: FixedOffset) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(date.checked_add(offset_millis(offset))?).map(|d| d.naive_utc())
}

fn from_local(local: NaiveDateTime, offset: FixedOffset) -> Option<i64> {
    local
        .and_utc()
        .timestamp_millis()
        .checked_sub(offset_millis(offset))
}

/// Days since 1970-01-01 (a Thursday) to the local day of `local_millis`.
fn epoch_day(local_millis: i64) -> i64 {
    local_millis.div_euclid(MILLIS_PER_DAY)
}

/// Weekday of an epoch day, 0 = Sunday.
fn weekday(epoch_day: i64) -> i64 {
    (epoch_day + 4).rem_euclid(7)
}

/// First day of the week containing `epoch_day`.
fn week_start(epoch_day: i64, start_of_week: DayOfWeek) -> i64 {
    epoch_day - (weekday(epoch_day) - start_of_week as i64).rem_euclid(7)
}

/// Truncates `date` to the start of its `bin_size`-`unit` bin.
///
/// Bins are aligned to 2000-01-01 local time (for weeks, the first
/// `start_of_week` on or after it). Returns `None` for a non-positive bin
/// size or a result outside the representable range.
#[must_use]
pub fn truncate(
    date: i64,
    unit: TimeUnit,
    bin_size: i64,
    offset: FixedOffset,
    start_of_week: DayOfWeek,
) -> Option<i64> {
    if bin_size <= 0 {
        return None;
    }
    let local_millis = date.checked_add(offset_millis(offset))?;
    if let Some(months) = unit.months() {
        let local = local(date, offset)?;
        let elapsed = (i64::from(local.year()) - 2000) * 12 + i64::from(local.month0());
        let bin = i64::from(months).checked_mul(bin_size)?;
        let start = elapsed.div_euclid(bin) * bin;
        let year = i32::try_from(2000 + start.div_euclid(12)).ok()?;
        let month = u32::try_from(start.rem_euclid(12) + 1).ok()?;
        let truncated = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
        return from_local(truncated, offset);
    }
    let mut reference = REFERENCE_MILLIS;
    if unit == TimeUnit::Week {
        let day = epoch_day(REFERENCE_MILLIS);
        let ahead = (start_of_week as i64 - weekday(day)).rem_euclid(7);
        reference += ahead * MILLIS_PER_DAY;
    }
    let bin = unit.fixed_millis()?.checked_mul(bin_size)?;
    let truncated = reference.checked_add((local_millis - reference).div_euclid(bin) * bin)?;
    truncated.checked_sub(offset_millis(offset))
}

/// Adds `amount` units to `date`.
///
/// Calendar units clamp the day of month (Jan 31 + 1 month = Feb 28/29).
#[must_use]
pub fn add(date: i64, unit: TimeUnit, amount: i64, offset: FixedOffset) -> Option<i64> {
    if let Some(months) = unit.months() {
        let local = local(date, offset)?;
        let total = u32::try_from(amount.unsigned_abs().checked_mul(u64::from(months))?).ok()?;
        let shifted = if amount >= 0 {
            local.checked_add_months(Months::new(total))?
        } else {
            local.checked_sub_months(Months::new(total))?
        };
        return from_local(shifted, offset);
    }
    date.checked_add(unit.fixed_millis()?.checked_mul(amount)?)
}

/// Number of `unit` boundaries crossed from `start` to `end`.
#[must_use]
pub fn diff(
    start: i64,
    end: i64,
    unit: TimeUnit,
    offset: FixedOffset,
    start_of_week: DayOfWeek,
) -> Option<i64> {
    let shift = offset_millis(offset);
    let (ls, le) = (start.checked_add(shift)?, end.checked_add(shift)?);
    match unit {
        TimeUnit::Year | TimeUnit::Quarter | TimeUnit::Month => {
            let months = unit.months().map(i64::from)?;
            let index = |d: NaiveDateTime| (i64::from(d.year()) * 12 + i64::from(d.month0())) / months;
            Some(index(local(end, offset)?) - index(local(start, offset)?))
        }
        TimeUnit::Week => {
            let s = week_start(epoch_day(ls), start_of_week);
            let e = week_start(epoch_day(le), start_of_week);
            Some((e - s) / 7)
        }
        _ => {
            let size = unit.fixed_millis()?;
            Some(le.div_euclid(size) - ls.div_euclid(size))
        }
    }
}

/// Calendar components of a date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateParts {
    /// Year.
    pub year: i32,
    /// Month, 1 to 12.
    pub month: u32,
    /// Day of month, 1 to 31.
    pub day: u32,
    /// Hour, 0 to 23.
    pub hour: u32,
    /// Minute, 0 to 59.
    pub minute: u32,
    /// Second, 0 to 59.
    pub second: u32,
    /// Millisecond, 0 to 999.
    pub millisecond: u32,
    /// Day of year, 1 to 366.
    pub day_of_year: u32,
    /// Day of week, 1 (Sunday) to 7 (Saturday).
    pub day_of_week: u32,
    /// Week of year, 0 to 53, weeks starting on Sunday.
    pub week: u32,
    /// ISO 8601 week-numbering year.
    pub iso_week_year: i32,
    /// ISO 8601 week, 1 to 53.
    pub iso_week: u32,
    /// ISO day of week, 1 (Monday) to 7 (Sunday).
    pub iso_day_of_week: u32,
}

impl DateParts {
    /// Splits `date` into components in `offset`.
    #[must_use]
    pub fn of(date: i64, offset: FixedOffset) -> Option<Self> {
        let local = local(date, offset)?;
        let weekday = local.weekday();
        let yday = local.ordinal0();
        let wday = weekday.num_days_from_sunday();
        let iso = local.iso_week();
        Some(Self {
            year: local.year(),
            month: local.month(),
            day: local.day(),
            hour: local.hour(),
            minute: local.minute(),
            second: local.second(),
            millisecond: local.and_utc().timestamp_subsec_millis(),
            day_of_year: yday + 1,
            day_of_week: wday + 1,
            week: (yday + 7 - wday) / 7,
            iso_week_year: iso.year(),
            iso_week: iso.week(),
            iso_day_of_week: weekday.number_from_monday(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn ms(y: i32, m: u32, d: u32, h: u32, mi: u32) -> i64 {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    #[test]
    fn parse_units() {
        assert_eq!(TimeUnit::parse("quarter"), Some(TimeUnit::Quarter));
        assert_eq!(TimeUnit::parse("fortnight"), None);
        assert_eq!(DayOfWeek::parse("MON"), Some(DayOfWeek::Monday));
        assert_eq!(DayOfWeek::parse("Saturday"), Some(DayOfWeek::Saturday));
        assert_eq!(DayOfWeek::parse("mo"), None);
    }

    #[test]
    fn truncate_calendar_units() {
        let date = ms(2021, 8, 17, 13, 45);
        let sunday = DayOfWeek::Sunday;
        assert_eq!(truncate(date, TimeUnit::Year, 1, utc(), sunday), Some(ms(2021, 1, 1, 0, 0)));
        assert_eq!(truncate(date, TimeUnit::Quarter, 1, utc(), sunday), Some(ms(2021, 7, 1, 0, 0)));
        assert_eq!(truncate(date, TimeUnit::Month, 5, utc(), sunday), Some(ms(2021, 4, 1, 0, 0)));
        assert_eq!(truncate(date, TimeUnit::Hour, 1, utc(), sunday), Some(ms(2021, 8, 17, 13, 0)));
        assert_eq!(truncate(date, TimeUnit::Minute, 15, utc(), sunday), Some(ms(2021, 8, 17, 13, 45)));
        assert_eq!(truncate(date, TimeUnit::Day, 0, utc(), sunday), None);
    }

    #[test]
    fn truncate_week_respects_start_day() {
        // 2021-08-17 is a Tuesday
        let date = ms(2021, 8, 17, 13, 45);
        assert_eq!(
            truncate(date, TimeUnit::Week, 1, utc(), DayOfWeek::Sunday),
            Some(ms(2021, 8, 15, 0, 0))
        );
        assert_eq!(
            truncate(date, TimeUnit::Week, 1, utc(), DayOfWeek::Monday),
            Some(ms(2021, 8, 16, 0, 0))
        );
    }

    #[test]
    fn truncate_in_offset_zone() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        // 23:30 UTC is 01:30 the next day at +02:00
        let date = ms(2021, 8, 17, 23, 30);
        assert_eq!(
            truncate(date, TimeUnit::Day, 1, plus_two, DayOfWeek::Sunday),
            Some(ms(2021, 8, 17, 22, 0))
        );
    }

    #[test]
    fn add_clamps_month_end() {
        let jan31 = ms(2021, 1, 31, 0, 0);
        assert_eq!(add(jan31, TimeUnit::Month, 1, utc()), Some(ms(2021, 2, 28, 0, 0)));
        assert_eq!(add(jan31, TimeUnit::Day, -1, utc()), Some(ms(2021, 1, 30, 0, 0)));
        assert_eq!(add(jan31, TimeUnit::Year, -1, utc()), Some(ms(2020, 1, 31, 0, 0)));
    }

    #[test]
    fn diff_counts_boundaries() {
        let a = ms(2020, 12, 31, 23, 59);
        let b = ms(2021, 1, 1, 0, 1);
        let sunday = DayOfWeek::Sunday;
        assert_eq!(diff(a, b, TimeUnit::Year, utc(), sunday), Some(1));
        assert_eq!(diff(a, b, TimeUnit::Day, utc(), sunday), Some(1));
        assert_eq!(diff(a, b, TimeUnit::Minute, utc(), sunday), Some(2));
        assert_eq!(diff(b, a, TimeUnit::Hour, utc(), sunday), Some(-1));
    }

    #[test]
    fn parts() {
        // 2021-01-03 is a Sunday
        let parts = DateParts::of(ms(2021, 1, 3, 10, 5), utc()).unwrap();
        assert_eq!(parts.day_of_week, 1);
        assert_eq!(parts.iso_day_of_week, 7);
        assert_eq!(parts.week, 1);
        assert_eq!(parts.iso_week, 53);
        assert_eq!(parts.iso_week_year, 2020);
        assert_eq!(parts.day_of_year, 3);
    }
}
