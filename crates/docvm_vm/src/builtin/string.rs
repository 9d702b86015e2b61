//! String functions.

use chrono::DateTime;

use docvm_foundation::numeric::exact_i64;
use docvm_foundation::{Operand, Result, Value};

use super::{Args, nothing, owned};

fn length(n: usize) -> Value {
    i32::try_from(n).map_or_else(|_| Value::Int64(i64::try_from(n).unwrap_or(i64::MAX)), Value::Int32)
}

// =============================================================================
// Basic String Functions
// =============================================================================

/// String: split(str, delimiter)
pub(super) fn split(args: &mut Args) -> Result<Operand> {
    let (Some(s), Some(delimiter)) = (args.get(0).as_str(), args.get(1).as_str()) else {
        return nothing();
    };
    if delimiter.is_empty() {
        return nothing();
    }
    owned(Value::array(s.split(delimiter).map(Value::from)))
}

/// String: strLenBytes
pub(super) fn str_len_bytes(args: &mut Args) -> Result<Operand> {
    owned(args.get(0).as_str().map_or(Value::Nothing, |s| length(s.len())))
}

/// String: strLenCP - length in code points
pub(super) fn str_len_cp(args: &mut Args) -> Result<Operand> {
    owned(
        args.get(0)
            .as_str()
            .map_or(Value::Nothing, |s| length(s.chars().count())),
    )
}

/// String: toUpper - Null maps to the empty string
pub(super) fn to_upper(args: &mut Args) -> Result<Operand> {
    owned(match args.get(0) {
        Value::String(s) => Value::from(s.to_uppercase()),
        Value::Null => Value::from(""),
        _ => Value::Nothing,
    })
}

/// String: toLower - Null maps to the empty string
pub(super) fn to_lower(args: &mut Args) -> Result<Operand> {
    owned(match args.get(0) {
        Value::String(s) => Value::from(s.to_lowercase()),
        Value::Null => Value::from(""),
        _ => Value::Nothing,
    })
}

/// String: concat - Nothing unless every argument is a string
pub(super) fn concat(args: &mut Args) -> Result<Operand> {
    let mut result = String::new();
    for value in args.iter() {
        let Some(s) = value.as_str() else {
            return nothing();
        };
        result.push_str(s);
    }
    owned(Value::from(result))
}

// =============================================================================
// Trimming
// =============================================================================

#[derive(Clone, Copy)]
enum Side {
    Both,
    Start,
    End,
}

fn trim_impl(args: &Args, side: Side) -> Value {
    let Some(s) = args.get(0).as_str() else {
        return Value::Nothing;
    };
    let chars: Option<Vec<char>> = match args.get_opt(1) {
        None | Some(Value::Null) => None,
        Some(Value::String(set)) => Some(set.chars().collect()),
        Some(_) => return Value::Nothing,
    };
    let matches = |c: char| match &chars {
        Some(set) => set.contains(&c),
        None => c.is_whitespace() || c == '\0',
    };
    let trimmed = match side {
        Side::Both => s.trim_matches(matches),
        Side::Start => s.trim_start_matches(matches),
        Side::End => s.trim_end_matches(matches),
    };
    Value::from(trimmed)
}

/// String: trim(str, [chars])
pub(super) fn trim(args: &mut Args) -> Result<Operand> {
    owned(trim_impl(args, Side::Both))
}

/// String: ltrim(str, [chars])
pub(super) fn ltrim(args: &mut Args) -> Result<Operand> {
    owned(trim_impl(args, Side::Start))
}

/// String: rtrim(str, [chars])
pub(super) fn rtrim(args: &mut Args) -> Result<Operand> {
    owned(trim_impl(args, Side::End))
}

// =============================================================================
// Searching
// =============================================================================

/// Optional non-negative bound argument. `Err` means the argument is invalid.
fn bound(args: &Args, i: usize) -> std::result::Result<Option<usize>, ()> {
    match args.get_opt(i) {
        None => Ok(None),
        Some(v) => match exact_i64(v) {
            Some(n) if n >= 0 => Ok(Some(usize::try_from(n).unwrap_or(usize::MAX))),
            _ => Err(()),
        },
    }
}

/// String: indexOfBytes(str, sub, [start], [end])
pub(super) fn index_of_bytes(args: &mut Args) -> Result<Operand> {
    let (Some(s), Some(sub)) = (args.get(0).as_str(), args.get(1).as_str()) else {
        return nothing();
    };
    let (Ok(start), Ok(end)) = (bound(args, 2), bound(args, 3)) else {
        return nothing();
    };
    let start = start.unwrap_or(0);
    let end = end.unwrap_or(s.len()).min(s.len());
    if start > end {
        return owned(Value::Int32(-1));
    }
    let haystack = &s.as_bytes()[start..end];
    let needle = sub.as_bytes();
    let found = if needle.is_empty() {
        Some(0)
    } else {
        haystack.windows(needle.len()).position(|w| w == needle)
    };
    owned(found.map_or(Value::Int32(-1), |i| length(start + i)))
}

/// String: indexOfCP(str, sub, [start], [end]) - positions in code points
pub(super) fn index_of_cp(args: &mut Args) -> Result<Operand> {
    let (Some(s), Some(sub)) = (args.get(0).as_str(), args.get(1).as_str()) else {
        return nothing();
    };
    let (Ok(start), Ok(end)) = (bound(args, 2), bound(args, 3)) else {
        return nothing();
    };
    let chars: Vec<char> = s.chars().collect();
    let needle: Vec<char> = sub.chars().collect();
    let start = start.unwrap_or(0);
    let end = end.unwrap_or(chars.len()).min(chars.len());
    if start > end {
        return owned(Value::Int32(-1));
    }
    let haystack = &chars[start..end];
    let found = if needle.is_empty() {
        Some(0)
    } else {
        haystack.windows(needle.len()).position(|w| w == needle.as_slice())
    };
    owned(found.map_or(Value::Int32(-1), |i| length(start + i)))
}

/// String: replaceOne(str, find, replacement)
pub(super) fn replace_one(args: &mut Args) -> Result<Operand> {
    let (Some(s), Some(find), Some(replacement)) = (
        args.get(0).as_str(),
        args.get(1).as_str(),
        args.get(2).as_str(),
    ) else {
        return nothing();
    };
    owned(Value::from(s.replacen(find, replacement, 1)))
}

/// String: hasNullBytes
pub(super) fn has_null_bytes(args: &mut Args) -> Result<Operand> {
    owned(
        args.get(0)
            .as_str()
            .map_or(Value::Nothing, |s| Value::Bool(s.contains('\0'))),
    )
}

// =============================================================================
// Coercion
// =============================================================================

/// Coerce: coerceToBool - Null is false, zero numbers are false, other values true
pub(super) fn coerce_to_bool(args: &mut Args) -> Result<Operand> {
    owned(match args.get(0) {
        Value::Nothing => Value::Nothing,
        Value::Null => Value::Bool(false),
        Value::Bool(b) => Value::Bool(*b),
        Value::Int32(n) => Value::Bool(*n != 0),
        Value::Int64(n) => Value::Bool(*n != 0),
        Value::Double(f) => Value::Bool(*f != 0.0),
        Value::Decimal(d) => Value::Bool(!d.is_zero()),
        _ => Value::Bool(true),
    })
}

fn format_double(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        f.to_string()
    }
}

/// Coerce: coerceToString
pub(super) fn coerce_to_string(args: &mut Args) -> Result<Operand> {
    owned(match args.get(0) {
        v @ Value::String(_) => v.clone(),
        Value::Bool(b) => Value::from(b.to_string()),
        Value::Int32(n) => Value::from(n.to_string()),
        Value::Int64(n) => Value::from(n.to_string()),
        Value::Double(f) => Value::from(format_double(*f)),
        Value::Decimal(d) => Value::from(d.to_string()),
        Value::Date(ms) => DateTime::from_timestamp_millis(*ms).map_or(Value::Nothing, |dt| {
            Value::from(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        }),
        Value::Timestamp(ts) => Value::from(format!("Timestamp({}, {})", ts >> 32, ts & 0xFFFF_FFFF)),
        _ => Value::Nothing,
    })
}
