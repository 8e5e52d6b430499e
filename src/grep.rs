//! Matching decoded messages against patterns.
//!
//! A pattern takes the form `MSG:FLD[=VAL]`, where the message and field
//! select by profile name or bare number, and the optional value compares
//! numerically when both sides parse as numbers, textually otherwise.
//! Used standalone for the "find records matching pattern" case, and by
//! callers filtering recovered streams.

use std::str::FromStr;

use thiserror::Error;

use crate::message::{DecodedMessage, FieldValue};

/// An error parsing a match pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    /// No field selector.
    #[error("Missing field selector in pattern `{0}`, expected `MSG:FLD[=VAL]`.")]
    MissingField(String),
}

/// A message or field selector: a profile name, or a bare number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Name(String),
    Number(u32),
}

impl Selector {
    fn parse(s: &str) -> Self {
        match s.parse() {
            Ok(number) => Self::Number(number),
            Err(_) => Self::Name(s.to_owned()),
        }
    }

    fn matches(&self, name: Option<&str>, number: u32) -> bool {
        match self {
            Self::Name(selector) => name.is_some_and(|name| name.eq_ignore_ascii_case(selector)),
            Self::Number(selector) => *selector == number,
        }
    }
}

/// A `MSG:FLD[=VAL]` pattern over decoded messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub message: Selector,
    pub field: Selector,
    pub value: Option<String>,
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (message, rest) = s
            .split_once(':')
            .ok_or_else(|| PatternError::MissingField(s.to_owned()))?;

        let (field, value) = match rest.split_once('=') {
            Some((field, value)) => (field, Some(value.to_owned())),
            None => (rest, None),
        };

        Ok(Self {
            message: Selector::parse(message),
            field: Selector::parse(field),
            value,
        })
    }
}

impl Pattern {
    /// The first field of a message matching this pattern.
    pub fn matches<'a>(&self, message: &'a DecodedMessage) -> Option<&'a FieldValue> {
        if !self.message.matches(message.name.as_deref(), message.global as u32) {
            return None;
        }

        message
            .fields
            .iter()
            .filter(|field| self.field.matches(field.name.as_deref(), field.number as u32))
            .find(|field| match &self.value {
                None => true,
                Some(expected) => field
                    .value
                    .as_ref()
                    .is_some_and(|value| compare(&value.to_string(), expected)),
            })
    }
}

/// A pattern hit within a message stream.
#[derive(Debug, Clone)]
pub struct Match<'a> {
    /// Index of the message within the scanned stream.
    pub index: usize,
    pub message: &'a DecodedMessage,
    /// The matching field; `None` for inverted matches.
    pub field: Option<&'a FieldValue>,
}

/// Scan messages for fields matching any pattern.
///
/// At most `limit` matches are returned when it is non-negative, in
/// stream order. With `invert`, yields the messages no pattern matched
/// instead.
pub fn grep<'a>(
    messages: &'a [DecodedMessage],
    patterns: &[Pattern],
    limit: isize,
    invert: bool,
) -> Vec<Match<'a>> {
    let mut matches = Vec::new();

    for (index, message) in messages.iter().enumerate() {
        if limit >= 0 && matches.len() >= limit as usize {
            break;
        }

        let hit = patterns
            .iter()
            .find_map(|pattern| pattern.matches(message));

        match (hit, invert) {
            (Some(field), false) => matches.push(Match {
                index,
                message,
                field: Some(field),
            }),
            (None, true) => matches.push(Match {
                index,
                message,
                field: None,
            }),
            _ => {}
        }
    }

    matches
}

/// Compare a rendered field value against a pattern value, numerically
/// when both sides parse as numbers.
fn compare(found: &str, expected: &str) -> bool {
    match (found.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(found), Ok(expected)) => found == expected,
        _ => found == expected,
    }
}
