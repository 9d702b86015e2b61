//! Date parts and calendar arithmetic.
//!
//! Dates are `Date` milliseconds; a `Timestamp` is accepted as the date of its
//! seconds field. Timezones are names resolved through a `TimeZoneDb` handle,
//! which callers pass as the last argument. Without a handle only the built-in
//! UTC aliases and numeric offsets resolve.

use chrono::FixedOffset;

use docvm_foundation::numeric::exact_i64;
use docvm_foundation::{Error, Operand, Result, TimeZoneDb, Value};

use super::{Args, nothing, owned};
use crate::datetime::{self, DateParts, DayOfWeek, TimeUnit, date_millis};

/// The timezone database among the trailing arguments, if any.
fn tz_db(args: &Args, from: usize) -> Option<&TimeZoneDb> {
    args.iter().skip(from).find_map(|v| match v {
        Value::TimeZoneDb(db) => Some(db.as_ref()),
        _ => None,
    })
}

/// Resolves the timezone argument `i`. A missing timezone is UTC.
fn offset(args: &Args, i: usize) -> Option<FixedOffset> {
    let fallback = TimeZoneDb::new();
    let db = tz_db(args, i + 1).unwrap_or(&fallback);
    match args.get(i) {
        Value::Nothing | Value::TimeZoneDb(_) => FixedOffset::east_opt(0),
        Value::String(name) => db.resolve(name),
        _ => None,
    }
}

/// Parses a unit argument. Nothing when not a string, an error when unknown.
fn unit(value: &Value) -> Result<Option<TimeUnit>> {
    let Some(name) = value.as_str() else {
        return Ok(None);
    };
    TimeUnit::parse(name)
        .map(Some)
        .ok_or_else(|| Error::invalid_argument(format!("unknown time unit '{name}'")))
}

/// The start of week among `args[from..]`; Sunday when absent.
fn start_of_week(args: &Args, from: usize) -> Result<DayOfWeek> {
    match args.iter().skip(from).find_map(Value::as_str) {
        None => Ok(DayOfWeek::default()),
        Some(name) => DayOfWeek::parse(name)
            .ok_or_else(|| Error::invalid_argument(format!("unknown day of week '{name}'"))),
    }
}

fn parts(args: &Args) -> Option<DateParts> {
    DateParts::of(date_millis(args.get(0))?, offset(args, 1)?)
}

macro_rules! part_builtins {
    ($($(#[$doc:meta])* $name:ident => |$p:ident| $value:expr;)*) => {
        $(
            $(#[$doc])*
            pub(super) fn $name(args: &mut Args) -> Result<Operand> {
                owned(parts(args).map_or(Value::Nothing, |$p| $value))
            }
        )*
    };
}

#[allow(clippy::cast_possible_wrap)]
fn int(n: u32) -> Value {
    Value::Int32(n as i32)
}

part_builtins! {
    /// Date: year(date, [timezone], [tzdb])
    year => |p| Value::Int32(p.year);
    /// Date: month, 1 to 12
    month => |p| int(p.month);
    /// Date: hour
    hour => |p| int(p.hour);
    /// Date: minute
    minute => |p| int(p.minute);
    /// Date: second
    second => |p| int(p.second);
    /// Date: millisecond
    millisecond => |p| int(p.millisecond);
    /// Date: dayOfYear, 1 to 366
    day_of_year => |p| int(p.day_of_year);
    /// Date: dayOfMonth
    day_of_month => |p| int(p.day);
    /// Date: dayOfWeek, 1 (Sunday) to 7
    day_of_week => |p| int(p.day_of_week);
    /// Date: week, 0 to 53 with weeks starting on Sunday
    week => |p| int(p.week);
    /// Date: isoWeekYear
    iso_week_year => |p| Value::Int32(p.iso_week_year);
    /// Date: isoDayOfWeek, 1 (Monday) to 7
    iso_day_of_week => |p| int(p.iso_day_of_week);
    /// Date: isoWeek, 1 to 53
    iso_week => |p| int(p.iso_week);
}

// =============================================================================
// Calendar Arithmetic
// =============================================================================

/// Date: dateAdd(date, unit, amount, timezone, [tzdb])
///
/// # Errors
///
/// `InvalidArgument` for an unknown unit.
pub(super) fn date_add(args: &mut Args) -> Result<Operand> {
    let Some(unit) = unit(args.get(1))? else {
        return nothing();
    };
    let (Some(date), Some(amount), Some(offset)) = (
        date_millis(args.get(0)),
        exact_i64(args.get(2)),
        offset(args, 3),
    ) else {
        return nothing();
    };
    owned(datetime::add(date, unit, amount, offset).map_or(Value::Nothing, Value::Date))
}

/// Date: dateDiff(start, end, unit, timezone, [startOfWeek], [tzdb]) - Int64
///
/// # Errors
///
/// `InvalidArgument` for an unknown unit or day name.
pub(super) fn date_diff(args: &mut Args) -> Result<Operand> {
    let Some(unit) = unit(args.get(2))? else {
        return nothing();
    };
    let sow = start_of_week(args, 4)?;
    let (Some(start), Some(end), Some(offset)) = (
        date_millis(args.get(0)),
        date_millis(args.get(1)),
        offset(args, 3),
    ) else {
        return nothing();
    };
    owned(datetime::diff(start, end, unit, offset, sow).map_or(Value::Nothing, Value::Int64))
}

/// Date: dateTrunc(date, unit, binSize, timezone, [startOfWeek], [tzdb])
///
/// # Errors
///
/// `InvalidArgument` for an unknown unit or day name.
pub(super) fn date_trunc(args: &mut Args) -> Result<Operand> {
    let Some(unit) = unit(args.get(1))? else {
        return nothing();
    };
    let sow = start_of_week(args, 4)?;
    let (Some(date), Some(bin), Some(offset)) = (
        date_millis(args.get(0)),
        exact_i64(args.get(2)),
        offset(args, 3),
    ) else {
        return nothing();
    };
    owned(datetime::truncate(date, unit, bin, offset, sow).map_or(Value::Nothing, Value::Date))
}

/// Date: dateToParts(date, timezone, iso, [tzdb]) - calendar or ISO week parts
pub(super) fn date_to_parts(args: &mut Args) -> Result<Operand> {
    let Some(p) = parts(args) else {
        return nothing();
    };
    let Some(iso) = args.get(2).as_bool() else {
        return nothing();
    };
    let time = [
        ("hour", int(p.hour)),
        ("minute", int(p.minute)),
        ("second", int(p.second)),
        ("millisecond", int(p.millisecond)),
    ];
    let date = if iso {
        [
            ("isoWeekYear", Value::Int32(p.iso_week_year)),
            ("isoWeek", int(p.iso_week)),
            ("isoDayOfWeek", int(p.iso_day_of_week)),
        ]
    } else {
        [
            ("year", Value::Int32(p.year)),
            ("month", int(p.month)),
            ("day", int(p.day)),
        ]
    };
    owned(Value::object(date.into_iter().chain(time)))
}

// =============================================================================
// Predicates and Timestamps
// =============================================================================

/// Date: isTimeUnit
pub(super) fn is_time_unit(args: &mut Args) -> Result<Operand> {
    owned(
        args.get(0)
            .as_str()
            .map_or(Value::Nothing, |s| Value::Bool(TimeUnit::parse(s).is_some())),
    )
}

/// Date: isTimezone(name, [tzdb])
pub(super) fn is_timezone(args: &mut Args) -> Result<Operand> {
    if !args.get(0).is_string() {
        return nothing();
    }
    owned(Value::Bool(offset(args, 0).is_some()))
}

/// Date: isDayOfWeek
pub(super) fn is_day_of_week(args: &mut Args) -> Result<Operand> {
    owned(
        args.get(0)
            .as_str()
            .map_or(Value::Nothing, |s| Value::Bool(DayOfWeek::parse(s).is_some())),
    )
}

/// Date: tsSecond - seconds field of a timestamp
#[allow(clippy::cast_possible_truncation)]
pub(super) fn ts_second(args: &mut Args) -> Result<Operand> {
    owned(match args.get(0) {
        Value::Timestamp(ts) => Value::Int64(i64::from((ts >> 32) as u32)),
        _ => Value::Nothing,
    })
}

/// Date: tsIncrement - increment field of a timestamp
#[allow(clippy::cast_possible_truncation)]
pub(super) fn ts_increment(args: &mut Args) -> Result<Operand> {
    owned(match args.get(0) {
        Value::Timestamp(ts) => Value::Int64(i64::from(*ts as u32)),
        _ => Value::Nothing,
    })
}
