use serde_json::Value;
use std::fmt::{self, Debug};
use std::panic::Location;
use thiserror::Error;

/// A failed matcher, with the source location of the assertion that produced it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{location}: {message}")]
pub struct AssertionFailure {
    pub location: String,
    pub message: String,
}

impl AssertionFailure {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let caller = Location::caller();
        Self {
            location: format!("{}:{}", caller.file(), caller.line()),
            message: message.into(),
        }
    }
}

pub type AssertionResult = Result<(), AssertionFailure>;

/// JSON value kinds accepted by [`assert_kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Null,
    Bool,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl JsonKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    fn matches(self, value: &Value) -> bool {
        let actual = Self::of(value);
        // Integers are numbers too.
        actual == self || (self == Self::Number && actual == Self::Integer)
    }
}

impl fmt::Display for JsonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

fn with_context(message: String, context: &str) -> String {
    if context.is_empty() {
        message
    } else {
        format!("{message} ({context})")
    }
}

#[track_caller]
pub fn assert_equal<T: PartialEq + Debug>(actual: T, expected: T, context: &str) -> AssertionResult {
    if actual == expected {
        return Ok(());
    }
    Err(AssertionFailure::new(with_context(
        format!("expected {expected:?}, got {actual:?}"),
        context,
    )))
}

/// Membership: a key of an object, an element of an array or a substring of a string.
#[track_caller]
pub fn assert_in(needle: impl Into<Value>, haystack: &Value, context: &str) -> AssertionResult {
    let needle = needle.into();
    let found = match (haystack, &needle) {
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        (Value::Array(items), _) => items.contains(&needle),
        (Value::String(text), Value::String(part)) => text.contains(part.as_str()),
        _ => false,
    };

    if found {
        return Ok(());
    }
    Err(AssertionFailure::new(with_context(
        format!("{needle} not found in {haystack}"),
        context,
    )))
}

#[track_caller]
pub fn assert_kind(value: &Value, kinds: &[JsonKind], context: &str) -> AssertionResult {
    if kinds.iter().any(|kind| kind.matches(value)) {
        return Ok(());
    }
    let expected: Vec<String> = kinds.iter().map(ToString::to_string).collect();
    Err(AssertionFailure::new(with_context(
        format!(
            "expected {} but {value} is {}",
            expected.join(" or "),
            JsonKind::of(value)
        ),
        context,
    )))
}

/// Strict ordering: `lower < upper`.
#[track_caller]
pub fn assert_less<T: PartialOrd + Debug>(lower: T, upper: T, context: &str) -> AssertionResult {
    if lower < upper {
        return Ok(());
    }
    Err(AssertionFailure::new(with_context(
        format!("expected {lower:?} < {upper:?}"),
        context,
    )))
}
