//! Integration tests for Error types
//!
//! Tests error construction, display, context and the user-facing split.

use docvm_foundation::{Error, ErrorContext, ErrorKind};

#[test]
fn internal_errors_are_not_user_facing() {
    let err = Error::internal("stack underflow");
    assert!(matches!(err.kind, ErrorKind::Internal(_)));
    assert!(!err.is_user_facing());
    assert!(err.to_string().contains("stack underflow"));
}

#[test]
fn failed_carries_code_and_message() {
    let err = Error::failed(4822, "boom");
    assert!(err.is_user_facing());
    assert!(matches!(&err.kind, ErrorKind::Failed { code: 4822, message } if message == "boom"));
    assert_eq!(err.to_string(), "boom (code 4822)");
}

#[test]
fn memory_limit_names_the_accumulator() {
    let err = Error::memory_limit("$push", 2048, 1024);
    assert!(err.is_user_facing());
    let msg = err.to_string();
    assert!(msg.contains("$push"));
    assert!(msg.contains("1024"));
}

#[test]
fn invalid_argument_display() {
    let err = Error::invalid_argument("alpha must be in (0, 1)");
    assert!(err.to_string().starts_with("invalid argument"));
}

#[test]
fn context_keeps_the_innermost_location() {
    let err = Error::internal("x")
        .with_context(ErrorContext::new().with_builtin("concat"))
        .with_context(ErrorContext::new().with_instruction("function", 12));
    let context = err.context.unwrap();
    assert_eq!(context.builtin, Some("concat"));
    assert_eq!(context.instruction, None);
}

#[test]
fn context_records_instruction_and_offset() {
    let context = ErrorContext::new().with_instruction("add", 3);
    assert_eq!(context.instruction, Some("add"));
    assert_eq!(context.offset, Some(3));
}
