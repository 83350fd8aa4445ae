// ABOUTME: The three error tiers -- build-time, runtime, and internal invariant violations

use crate::span::SourceRange;
use crate::value::Value;
use std::fmt;
use thiserror::Error;

/// A static error discovered while turning source text into IR: malformed
/// special forms, unbound references to forms that can only be resolved at
/// build time, arity mismatches the builder can prove ahead of evaluation,
/// and so on. Never catchable from within a running program --
/// a `BuildError` means evaluation never started.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("{range}: malformed special form `{form}`: {detail}")]
    MalformedForm {
        form: String,
        detail: String,
        range: SourceRange,
    },

    #[error("{range}: `{form}` is not supported in this position")]
    UnsupportedForm { form: String, range: SourceRange },

    #[error("{range}: expected {expected} argument(s) to `{form}`, found {found}")]
    ArityMismatch {
        form: String,
        expected: String,
        found: usize,
        range: SourceRange,
    },

    #[error("{range}: `{name}` is not a valid identifier")]
    InvalidIdentifier { name: String, range: SourceRange },

    #[error("{range}: duplicate binding `{name}` in the same scope")]
    DuplicateBinding { name: String, range: SourceRange },
}

impl BuildError {
    pub fn range(&self) -> SourceRange {
        match self {
            BuildError::MalformedForm { range, .. }
            | BuildError::UnsupportedForm { range, .. }
            | BuildError::ArityMismatch { range, .. }
            | BuildError::InvalidIdentifier { range, .. }
            | BuildError::DuplicateBinding { range, .. } => *range,
        }
    }
}

/// A catchable runtime condition: unbound variable, wrong argument type at
/// a builtin call, division by zero, calling a non-procedure, or a value
/// explicitly raised by `throw`/`(error ...)`. Carries the `Value` that
/// `try`'s catch lambda receives, not just a message -- `throw`
/// can raise any value, not only strings. Every evaluator threads this as
/// the failure channel (the `Err` of a direct-style `Result`, or the
/// failure continuation in CPS); `try` is the only thing that
/// catches it. It intentionally does not implement `std::error::Error`:
/// it is caught inside the language via `try`, never via Rust's `?`.
#[derive(Debug, Clone)]
pub struct SchemeException {
    pub value: Value,
    pub range: Option<SourceRange>,
}

impl SchemeException {
    pub fn new(value: Value) -> Self {
        SchemeException { value, range: None }
    }

    pub fn at(value: Value, range: SourceRange) -> Self {
        SchemeException {
            value,
            range: Some(range),
        }
    }

    /// Convenience constructor for the common case of a plain-text failure
    /// reason with no richer payload (arity/type errors raised by builtins).
    pub fn message(msg: impl Into<String>) -> Self {
        SchemeException::new(Value::string(msg.into()))
    }

    pub fn unbound_variable(name: &str) -> Self {
        SchemeException::message(format!("unbound variable: {}", name))
    }

    pub fn not_a_procedure(type_name: &str) -> Self {
        SchemeException::message(format!("attempt to call non-procedure: {}", type_name))
    }

    pub fn wrong_type(expected: &str, found: &str) -> Self {
        SchemeException::message(format!("expected {}, found {}", expected, found))
    }

    pub fn arity(name: &str, expected: &str, found: usize) -> Self {
        SchemeException::message(format!(
            "{}: expected {} argument(s), found {}",
            name, expected, found
        ))
    }
}

impl fmt::Display for SchemeException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.range {
            Some(range) => write!(f, "{}: {}", range, self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_exception_displays_the_string_value() {
        let e = SchemeException::unbound_variable("x");
        assert_eq!(format!("{}", e), "\"unbound variable: x\"");
    }

    #[test]
    fn build_error_range_accessor_matches_variant() {
        let range = SourceRange::synthetic();
        let err = BuildError::UnsupportedForm {
            form: "define".to_string(),
            range,
        };
        assert_eq!(err.range(), range);
    }
}
