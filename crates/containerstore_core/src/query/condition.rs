//! Comparison tokens and record filters shared by both store modes.
//!
//! # Responsibility
//! - Normalize user-facing comparison tokens (`>`, `>=`, `<`, `<=`, `=`, `!=`).
//! - Evaluate timestamp comparisons and destination membership on records.
//!
//! # Invariants
//! - Comparisons follow IEEE-754: `NaN != x` holds for every `x`, every other
//!   comparison involving `NaN` is false.
//! - Unknown tokens are rejected with `InvalidCondition`, never coerced.

use crate::model::container::Container;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Comparison operator applied between a record timestamp and a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Equal,
    NotEqual,
}

impl Comparison {
    /// Parses a token after trimming whitespace and lowercasing.
    pub fn parse(token: &str) -> Result<Self, InvalidCondition> {
        match token.trim().to_lowercase().as_str() {
            ">" => Ok(Self::Greater),
            ">=" => Ok(Self::GreaterOrEqual),
            "<" => Ok(Self::Less),
            "<=" => Ok(Self::LessOrEqual),
            "=" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            _ => Err(InvalidCondition {
                token: token.to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Equal => "=",
            Self::NotEqual => "!=",
        }
    }

    /// Evaluates `value <op> reference`.
    pub fn evaluate(self, value: f64, reference: f64) -> bool {
        match self {
            Self::Greater => value > reference,
            Self::GreaterOrEqual => value >= reference,
            Self::Less => value < reference,
            Self::LessOrEqual => value <= reference,
            Self::Equal => value == reference,
            Self::NotEqual => value != reference,
        }
    }
}

impl FromStr for Comparison {
    type Err = InvalidCondition;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Self::parse(token)
    }
}

impl Display for Comparison {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected comparison token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCondition {
    pub token: String,
}

impl Display for InvalidCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid condition `{}`; expected one of >, >=, <, <=, =, !=",
            self.token
        )
    }
}

impl Error for InvalidCondition {}

/// Timestamp a time filter reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    Added,
    Leaving,
}

impl TimeField {
    pub fn read(self, container: &Container) -> f64 {
        self.pick(container.added_time, container.leaving_time)
    }

    fn pick(self, added_time: f64, leaving_time: f64) -> f64 {
        match self {
            Self::Added => added_time,
            Self::Leaving => leaving_time,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added_time",
            Self::Leaving => "leaving_time",
        }
    }
}

/// Selection criterion for query, dequeue and count operations.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordFilter {
    Time {
        field: TimeField,
        comparison: Comparison,
        reference: f64,
    },
    /// Exact membership of the literal in `next_destinations`.
    Destination(String),
}

impl RecordFilter {
    /// Builds a time filter from a raw comparison token.
    pub fn time(field: TimeField, condition: &str, reference: f64) -> Result<Self, InvalidCondition> {
        Ok(Self::Time {
            field,
            comparison: Comparison::parse(condition)?,
            reference,
        })
    }

    pub fn destination(destination: impl Into<String>) -> Self {
        Self::Destination(destination.into())
    }

    pub fn matches(&self, container: &Container) -> bool {
        match self {
            Self::Time {
                field,
                comparison,
                reference,
            } => comparison.evaluate(field.read(container), *reference),
            Self::Destination(destination) => container.has_destination(destination),
        }
    }

    /// Evaluates a time filter from bare timestamps.
    ///
    /// Returns `None` for destination filters, which need the full record.
    pub fn matches_times(&self, added_time: f64, leaving_time: f64) -> Option<bool> {
        match self {
            Self::Time {
                field,
                comparison,
                reference,
            } => Some(comparison.evaluate(field.pick(added_time, leaving_time), *reference)),
            Self::Destination(_) => None,
        }
    }
}

impl Display for RecordFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Time {
                field,
                comparison,
                reference,
            } => write!(f, "{} {} {}", field.as_str(), comparison, reference),
            Self::Destination(destination) => write!(f, "destination = {destination}"),
        }
    }
}
