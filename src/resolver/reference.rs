//! Composite reference numbers: `{program_id}_{subject_id}`.
//!
//! Providers that cannot carry our identifiers in dedicated fields get this
//! single string instead, and echo it back in their status results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ClearanceError;

pub const REFERENCE_SEPARATOR: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceNumber {
    pub program_id: i64,
    /// Zero when the subject half could not be parsed
    pub subject_id: i64,
}

impl ReferenceNumber {
    pub fn new(program_id: i64, subject_id: i64) -> Self {
        Self {
            program_id,
            subject_id,
        }
    }

    /// Lenient decode. A usable program half is enough; the subject can be
    /// recovered from the subject/program relation.
    pub fn decode(text: &str) -> Option<Self> {
        let (program, subject) = text.trim().split_once(REFERENCE_SEPARATOR)?;
        let program_id = program.trim().parse::<i64>().ok().filter(|id| *id > 0)?;
        let subject_id = subject
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .unwrap_or(0);
        Some(Self::new(program_id, subject_id))
    }

    pub fn has_subject(&self) -> bool {
        self.subject_id > 0
    }
}

impl fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{REFERENCE_SEPARATOR}{}", self.program_id, self.subject_id)
    }
}

impl FromStr for ReferenceNumber {
    type Err = ClearanceError;

    /// Strict parse: both halves must be positive integers
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::decode(s) {
            Some(reference) if reference.has_subject() => Ok(reference),
            _ => Err(ClearanceError::ValidationError(format!(
                "Invalid reference number: {s}"
            ))),
        }
    }
}
