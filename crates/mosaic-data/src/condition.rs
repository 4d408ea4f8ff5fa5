//! Filter conditions for queries.

use std::{
    cmp::Ordering,
    ops::{RangeFrom, RangeInclusive, RangeToInclusive},
};

use crate::value::Value;

/// Condition on a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value.
    Equals(Value),
    /// Array field: same sequence. Scalar field: one of the values.
    List(Vec<Value>),
    /// Field lies in the inclusive range.
    Range { from: Value, to: Value },
    /// Operator match.
    Match(Matcher),
}

/// Operator conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// String field contains the text; array field contains the element.
    Contains(Value),
    StartsWith(String),
    EndsWith(String),
    GreaterThan(Value),
    GreaterThanOrEqual(Value),
    LessThan(Value),
    LessThanOrEqual(Value),
    /// Inclusive range. Either bound may be open.
    Between {
        from: Option<Value>,
        to: Option<Value>,
    },
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Not(Value),
    /// `true`: field present and non-null. `false`: missing or null.
    Exists(bool),
    /// `true`: null, empty string or empty collection.
    Empty(bool),
}

impl Condition {
    /// Whether `field` (null when missing) satisfies the condition.
    pub fn matches(&self, field: &Value) -> bool {
        match self {
            Self::Equals(expected) => field.loose_eq(expected),
            Self::List(values) => match field {
                Value::Array(items) => {
                    items.len() == values.len()
                        && items.iter().zip(values).all(|(a, b)| a.loose_eq(b))
                }
                scalar => values.iter().any(|v| scalar.loose_eq(v)),
            },
            Self::Range { from, to } => within(field, Some(from), Some(to)),
            Self::Match(matcher) => matcher.matches(field),
        }
    }
}

impl Matcher {
    /// Whether `field` satisfies the operator.
    pub fn matches(&self, field: &Value) -> bool {
        match self {
            Self::Contains(needle) => match field {
                Value::Array(items) => items.iter().any(|item| item.loose_eq(needle)),
                Value::Null => false,
                other => other.to_string().contains(&needle.to_string()),
            },
            Self::StartsWith(prefix) => !field.is_null() && field.to_string().starts_with(prefix),
            Self::EndsWith(suffix) => !field.is_null() && field.to_string().ends_with(suffix),
            Self::GreaterThan(v) => field.compare(v) == Some(Ordering::Greater),
            Self::GreaterThanOrEqual(v) => {
                matches!(field.compare(v), Some(Ordering::Greater | Ordering::Equal))
            }
            Self::LessThan(v) => field.compare(v) == Some(Ordering::Less),
            Self::LessThanOrEqual(v) => {
                matches!(field.compare(v), Some(Ordering::Less | Ordering::Equal))
            }
            Self::Between { from, to } => within(field, from.as_ref(), to.as_ref()),
            Self::In(values) => values.iter().any(|v| field.loose_eq(v)),
            Self::NotIn(values) => !values.iter().any(|v| field.loose_eq(v)),
            Self::Not(v) => !field.loose_eq(v),
            Self::Exists(expected) => !field.is_null() == *expected,
            Self::Empty(expected) => field.is_empty() == *expected,
        }
    }
}

/// A missing bound is open. A null field never falls in a range.
fn within(field: &Value, from: Option<&Value>, to: Option<&Value>) -> bool {
    if field.is_null() {
        return false;
    }
    let above = from.is_none_or(|from| {
        matches!(field.compare(from), Some(Ordering::Greater | Ordering::Equal))
    });
    let below = to.is_none_or(|to| {
        matches!(field.compare(to), Some(Ordering::Less | Ordering::Equal))
    });
    above && below
}

impl Matcher {
    /// `from..` as an inclusive range with an open upper bound.
    pub fn at_least(from: impl Into<Value>) -> Self {
        Self::Between {
            from: Some(from.into()),
            to: None,
        }
    }

    /// `..=to` as an inclusive range with an open lower bound.
    pub fn at_most(to: impl Into<Value>) -> Self {
        Self::Between {
            from: None,
            to: Some(to.into()),
        }
    }
}

impl From<Value> for Condition {
    fn from(value: Value) -> Self {
        Self::Equals(value)
    }
}

impl From<&str> for Condition {
    fn from(value: &str) -> Self {
        Self::Equals(value.into())
    }
}

impl From<String> for Condition {
    fn from(value: String) -> Self {
        Self::Equals(value.into())
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Self::Equals(value.into())
    }
}

impl From<i64> for Condition {
    fn from(value: i64) -> Self {
        Self::Equals(value.into())
    }
}

impl From<i32> for Condition {
    fn from(value: i32) -> Self {
        Self::Equals(value.into())
    }
}

impl From<f64> for Condition {
    fn from(value: f64) -> Self {
        Self::Equals(value.into())
    }
}

impl From<Vec<Value>> for Condition {
    fn from(values: Vec<Value>) -> Self {
        Self::List(values)
    }
}

impl From<Matcher> for Condition {
    fn from(matcher: Matcher) -> Self {
        Self::Match(matcher)
    }
}

impl<T: Into<Value>> From<RangeInclusive<T>> for Condition {
    fn from(range: RangeInclusive<T>) -> Self {
        let (from, to) = range.into_inner();
        Self::Range {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl<T: Into<Value>> From<RangeFrom<T>> for Condition {
    fn from(range: RangeFrom<T>) -> Self {
        Self::Match(Matcher::at_least(range.start))
    }
}

impl<T: Into<Value>> From<RangeToInclusive<T>> for Condition {
    fn from(range: RangeToInclusive<T>) -> Self {
        Self::Match(Matcher::at_most(range.end))
    }
}
