//! Regular expression builtins.
//!
//! Patterns are compiled once by `regexCompile` into a handle; the matching
//! builtins also accept a pattern string, compiling it without options.

use std::borrow::Cow;
use std::sync::Arc;

use docvm_foundation::{CompiledRegex, Operand, Result, Value};

use super::{Args, nothing, owned};

/// The compiled regex behind `value`, compiling plain strings on the fly.
fn regex_of(value: &Value) -> Result<Option<Cow<'_, CompiledRegex>>> {
    match value {
        Value::Regex(re) => Ok(Some(Cow::Borrowed(re.as_ref()))),
        Value::String(pattern) => Ok(Some(Cow::Owned(CompiledRegex::new(pattern, "")?))),
        _ => Ok(None),
    }
}

/// `{match, idx, captures}` for one match, with code point offsets.
fn match_document(subject: &str, captures: &::regex::Captures<'_>) -> Value {
    let whole = captures.get(0).map_or("", |m| m.as_str());
    let start = captures.get(0).map_or(0, |m| m.start());
    let idx = subject[..start].chars().count();
    let groups = captures
        .iter()
        .skip(1)
        .map(|g| g.map_or(Value::Null, |m| Value::from(m.as_str())));
    Value::object([
        ("match", Value::from(whole)),
        ("idx", Value::Int32(i32::try_from(idx).unwrap_or(i32::MAX))),
        ("captures", Value::array(groups)),
    ])
}

/// Regex: regexCompile(pattern, options)
///
/// # Errors
///
/// `InvalidArgument` for null bytes, unknown options or a bad pattern.
pub(super) fn regex_compile(args: &mut Args) -> Result<Operand> {
    let (Some(pattern), Some(options)) = (args.get(0).as_str(), args.get(1).as_str()) else {
        return nothing();
    };
    let compiled = CompiledRegex::new(pattern, options)?;
    owned(Value::Regex(Arc::new(compiled)))
}

/// Regex: regexMatch(regex, subject) - Boolean; an array subject matches if any string element does
pub(super) fn regex_match(args: &mut Args) -> Result<Operand> {
    let Some(re) = regex_of(args.get(0))? else {
        return nothing();
    };
    let subject = args.get(1);
    let matched = match subject {
        Value::String(s) => re.regex().is_match(s),
        v if v.is_array() => v
            .array_iter()
            .any(|e| e.as_str().is_some_and(|s| re.regex().is_match(s))),
        _ => return nothing(),
    };
    owned(Value::Bool(matched))
}

/// Regex: regexFind(regex, subject) - first match document or Null
pub(super) fn regex_find(args: &mut Args) -> Result<Operand> {
    let Some(re) = regex_of(args.get(0))? else {
        return nothing();
    };
    let Some(subject) = args.get(1).as_str() else {
        return nothing();
    };
    owned(
        re.regex()
            .captures(subject)
            .map_or(Value::Null, |c| match_document(subject, &c)),
    )
}

/// Regex: regexFindAll(regex, subject) - array of match documents
pub(super) fn regex_find_all(args: &mut Args) -> Result<Operand> {
    let Some(re) = regex_of(args.get(0))? else {
        return nothing();
    };
    let Some(subject) = args.get(1).as_str() else {
        return nothing();
    };
    let matches = re
        .regex()
        .captures_iter(subject)
        .map(|c| match_document(subject, &c));
    owned(Value::array(matches))
}

/// Regex: getRegexPattern
pub(super) fn get_regex_pattern(args: &mut Args) -> Result<Operand> {
    owned(match args.get(0) {
        Value::Regex(re) => Value::from(re.pattern()),
        _ => Value::Nothing,
    })
}

/// Regex: getRegexFlags
pub(super) fn get_regex_flags(args: &mut Args) -> Result<Operand> {
    owned(match args.get(0) {
        Value::Regex(re) => Value::from(re.flags()),
        _ => Value::Nothing,
    })
}
