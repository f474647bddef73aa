//! Sequence notation parsing.
//!
//! A sequence specification names scripts by their numeric prefix using single
//! numbers, inclusive ranges, and comma-separated unions, e.g.
//! `0400-0402,0404,0406-0407`. Expansion is all-or-nothing: any malformed term
//! fails the whole specification.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Upper bound on identifiers produced by a single specification.
pub const MAX_SEQUENCE_LEN: u64 = 100_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SequenceError {
    #[error("sequence specification is empty")]
    Empty,

    #[error("invalid sequence term {term:?}: {reason}")]
    InvalidToken { term: String, reason: &'static str },

    #[error("invalid range {start}-{end}: start is greater than end")]
    InvalidRange { start: String, end: String },

    #[error("sequence expands to more than {} identifiers", MAX_SEQUENCE_LEN)]
    TooLarge,
}

/// Zero-padded numeric script identifier.
///
/// Identity and ordering use the numeric value only; the width controls how
/// the identifier is rendered and matched against file names.
#[derive(Debug, Clone, Copy)]
pub struct ScriptId {
    value: u64,
    width: usize,
}

impl ScriptId {
    pub fn new(value: u64, width: usize) -> Self {
        Self { value, width }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// File name prefix that scripts for this id start with.
    pub fn file_prefix(&self) -> String {
        format!("{self}_")
    }
}

impl PartialEq for ScriptId {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for ScriptId {}

impl PartialOrd for ScriptId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScriptId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.value, width = self.width)
    }
}

impl Serialize for ScriptId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScriptId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_number(raw.trim(), &raw).map_err(serde::de::Error::custom)
    }
}

/// Expand a sequence specification into ordered, deduplicated identifiers.
pub fn expand_sequence(spec: &str) -> Result<Vec<ScriptId>, SequenceError> {
    if spec.trim().is_empty() {
        return Err(SequenceError::Empty);
    }

    // Keyed by numeric value so overlaps coalesce; the first token seen for a
    // value decides its width.
    let mut seen: BTreeMap<u64, ScriptId> = BTreeMap::new();
    for raw_term in spec.split(',') {
        let term = raw_term.trim();
        if term.is_empty() {
            return Err(invalid(raw_term, "empty term"));
        }
        match term.split_once('-') {
            Some((start, end)) => {
                let start = parse_number(start.trim(), term)?;
                let end = parse_number(end.trim(), term)?;
                if start.value > end.value {
                    return Err(SequenceError::InvalidRange {
                        start: start.to_string(),
                        end: end.to_string(),
                    });
                }
                let added = end.value - start.value + 1;
                if seen.len() as u64 + added > MAX_SEQUENCE_LEN {
                    return Err(SequenceError::TooLarge);
                }
                let width = start.width.max(end.width);
                for value in start.value..=end.value {
                    seen.entry(value).or_insert(ScriptId::new(value, width));
                }
            }
            None => {
                let id = parse_number(term, term)?;
                seen.entry(id.value).or_insert(id);
            }
        }
    }

    if seen.len() as u64 > MAX_SEQUENCE_LEN {
        return Err(SequenceError::TooLarge);
    }
    Ok(seen.into_values().collect())
}

/// Expand a literal list of terms, each of which may itself be a range.
pub fn expand_terms<S: AsRef<str>>(terms: &[S]) -> Result<Vec<ScriptId>, SequenceError> {
    let joined = terms
        .iter()
        .map(|term| term.as_ref().trim())
        .collect::<Vec<_>>()
        .join(",");
    expand_sequence(&joined)
}

fn parse_number(token: &str, term: &str) -> Result<ScriptId, SequenceError> {
    if token.is_empty() {
        return Err(invalid(term, "missing number"));
    }
    if !token.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(invalid(term, "expected digits"));
    }
    let value = token
        .parse::<u64>()
        .map_err(|_| invalid(term, "number out of range"))?;
    Ok(ScriptId::new(value, token.len()))
}

fn invalid(term: &str, reason: &'static str) -> SequenceError {
    SequenceError::InvalidToken {
        term: term.to_string(),
        reason,
    }
}
