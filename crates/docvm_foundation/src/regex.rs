//! Compiled regular expression handle.

use ::regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

/// A regular expression compiled together with its source pattern and flags.
#[derive(Debug, Clone)]
pub struct CompiledRegex {
    pattern: String,
    flags: String,
    regex: Regex,
}

impl CompiledRegex {
    /// Compiles `pattern` with the option letters in `flags`.
    ///
    /// Recognized flags are `i`, `m`, `s` and `x`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for embedded null bytes, unknown flags or a
    /// pattern that fails to compile.
    pub fn new(pattern: &str, flags: &str) -> Result<Self> {
        if pattern.contains('\0') {
            return Err(Error::invalid_argument("regular expression cannot contain a null byte"));
        }
        if flags.contains('\0') {
            return Err(Error::invalid_argument("regular expression options cannot contain a null byte"));
        }
        let mut builder = RegexBuilder::new(pattern);
        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                other => {
                    return Err(Error::invalid_argument(format!("invalid regular expression option: {other}")));
                }
            };
        }
        let regex = builder
            .build()
            .map_err(|e| Error::invalid_argument(format!("invalid regular expression: {e}")))?;
        Ok(Self {
            pattern: pattern.to_string(),
            flags: flags.to_string(),
            regex,
        })
    }

    /// The source pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The option letters.
    #[must_use]
    pub fn flags(&self) -> &str {
        &self.flags
    }

    /// The compiled expression.
    #[must_use]
    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

impl PartialEq for CompiledRegex {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.flags == other.flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_with_flags() {
        let re = CompiledRegex::new("^ab+c$", "i").unwrap();
        assert!(re.regex().is_match("ABBC"));
        assert_eq!(re.pattern(), "^ab+c$");
        assert_eq!(re.flags(), "i");
    }

    #[test]
    fn rejects_null_bytes() {
        let err = CompiledRegex::new("a\0b", "").unwrap_err();
        assert!(err.is_user_facing());
    }

    #[test]
    fn rejects_unknown_flags_and_bad_patterns() {
        assert!(CompiledRegex::new("a", "q").is_err());
        assert!(CompiledRegex::new("(", "").is_err());
    }
}
