//! Error types for docvm.
//!
//! Data-level type mismatches are not errors: they evaluate to
//! [`Value::Nothing`](crate::Value::Nothing). This module covers the two
//! remaining taxonomies, internal failures and user-facing errors.

use std::fmt;

use thiserror::Error;

/// The main error type for docvm operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    ///
    /// An existing context is kept; the innermost location is the useful one.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        if self.context.is_none() {
            self.context = Some(context);
        }
        self
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }

    /// Creates a memory limit error for a capped accumulator.
    #[must_use]
    pub fn memory_limit(accumulator: &'static str, used: i64, limit: i64) -> Self {
        Self::new(ErrorKind::MemoryLimitExceeded {
            accumulator,
            used,
            limit,
        })
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument(message.into()))
    }

    /// Creates the error raised by an explicit `fail` instruction.
    #[must_use]
    pub fn failed(code: i64, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Failed {
            code,
            message: message.into(),
        })
    }

    /// Returns true if this error is meant to be reported to the user.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        self.kind.is_user_facing()
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A capped accumulator grew past its configured memory limit.
    #[error("{accumulator} used too much memory: {used} bytes, limit is {limit} bytes")]
    MemoryLimitExceeded {
        /// Name of the accumulator that hit the limit.
        accumulator: &'static str,
        /// Bytes in use after the rejected addition.
        used: i64,
        /// The configured limit.
        limit: i64,
    },

    /// Malformed input to a builtin.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Raised by the `fail` instruction of a compiled program.
    #[error("{message} (code {code})")]
    Failed {
        /// Error code chosen by the program.
        code: i64,
        /// Error message chosen by the program.
        message: String,
    },

    /// Internal error (broken invariant, should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    /// Returns true for errors that propagate to the user as error codes.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Name of the instruction being executed.
    pub instruction: Option<&'static str>,
    /// Byte offset of the instruction in its code fragment.
    pub offset: Option<usize>,
    /// Name of the builtin being invoked.
    pub builtin: Option<&'static str>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the instruction name and offset.
    #[must_use]
    pub fn with_instruction(mut self, name: &'static str, offset: usize) -> Self {
        self.instruction = Some(name);
        self.offset = Some(offset);
        self
    }

    /// Sets the builtin name.
    #[must_use]
    pub fn with_builtin(mut self, name: &'static str) -> Self {
        self.builtin = Some(name);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(instruction) = self.instruction {
            write!(f, "in {instruction}")?;
            if let Some(offset) = self.offset {
                write!(f, " at offset {offset}")?;
            }
        }
        if let Some(builtin) = self.builtin {
            if self.instruction.is_some() {
                write!(f, ", ")?;
            }
            write!(f, "calling {builtin}")?;
        }
        Ok(())
    }
}

/// Result type alias using docvm's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_limit_display() {
        let err = Error::memory_limit("addToArrayCapped", 120, 100);
        let msg = format!("{err}");
        assert!(msg.contains("addToArrayCapped"));
        assert!(msg.contains("100"));
        assert!(err.is_user_facing());
    }

    #[test]
    fn internal_is_not_user_facing() {
        let err = Error::internal("stack underflow");
        assert!(!err.is_user_facing());
        assert!(format!("{err}").contains("stack underflow"));
    }

    #[test]
    fn context_keeps_innermost() {
        let err = Error::failed(7, "boom")
            .with_context(ErrorContext::new().with_instruction("fail", 12))
            .with_context(ErrorContext::new().with_instruction("function", 40));

        let ctx = err.context.unwrap();
        assert_eq!(ctx.instruction, Some("fail"));
        assert_eq!(ctx.offset, Some(12));
    }

    #[test]
    fn context_display() {
        let ctx = ErrorContext::new()
            .with_instruction("function", 3)
            .with_builtin("aggTopN");
        assert_eq!(ctx.to_string(), "in function at offset 3, calling aggTopN");
    }
}
