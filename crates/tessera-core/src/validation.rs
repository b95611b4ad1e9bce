//! PIN character and full-string validation rules

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PinValidationError;
use crate::DEFAULT_PIN_LENGTH;

/// Characters a PIN may be built from
#[derive(Clone, Copy, Default)]
pub enum CharacterSet {
    /// ASCII `0-9`
    #[default]
    Digits,
    /// ASCII letters and digits
    Alphanumeric,
    /// Caller-supplied predicate
    Custom(fn(char) -> bool),
}

impl CharacterSet {
    /// Check whether a single character belongs to this set
    pub fn accepts(&self, c: char) -> bool {
        match self {
            CharacterSet::Digits => c.is_ascii_digit(),
            CharacterSet::Alphanumeric => c.is_ascii_alphanumeric(),
            CharacterSet::Custom(predicate) => predicate(c),
        }
    }
}

impl fmt::Debug for CharacterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacterSet::Digits => write!(f, "Digits"),
            CharacterSet::Alphanumeric => write!(f, "Alphanumeric"),
            CharacterSet::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Single-character validation used to pre-filter input.
///
/// Total: any string that is not exactly one accepted character is rejected.
pub fn is_valid_pin_character(candidate: &str, set: CharacterSet) -> bool {
    let mut chars = candidate.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => set.accepts(c),
        _ => false,
    }
}

/// Length bounds and strength rules for a PIN
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinPolicy {
    /// Minimum length (`None` means no lower bound)
    pub min_length: Option<usize>,
    /// Maximum length (`None` means unbounded)
    pub max_length: Option<usize>,
    /// Reject repeated digits and straight ascending/descending runs
    pub reject_trivial: bool,
}

impl Default for PinPolicy {
    fn default() -> Self {
        Self {
            min_length: Some(DEFAULT_PIN_LENGTH),
            max_length: Some(DEFAULT_PIN_LENGTH),
            reject_trivial: false,
        }
    }
}

impl PinPolicy {
    /// Fixed-length policy
    pub fn exact(length: usize) -> Self {
        Self {
            min_length: Some(length),
            max_length: Some(length),
            ..Default::default()
        }
    }

    /// Bounded-length policy
    pub fn between(min: usize, max: usize) -> Self {
        Self {
            min_length: Some(min),
            max_length: Some(max),
            ..Default::default()
        }
    }

    /// Whether another character may be appended at `len`
    pub fn allows_more(&self, len: usize) -> bool {
        self.max_length.map_or(true, |max| len < max)
    }

    /// Whether `len` lies within the configured bounds
    pub fn length_in_bounds(&self, len: usize) -> bool {
        self.min_length.map_or(true, |min| len >= min)
            && self.max_length.map_or(true, |max| len <= max)
    }

    /// Full-string validation, independent of length
    pub fn accepts_content(&self, pin: &str, set: CharacterSet) -> bool {
        pin.chars().all(|c| set.accepts(c)) && !(self.reject_trivial && is_trivial(pin))
    }

    /// Report the first user-facing problem with `pin`
    pub fn check(&self, pin: &str, set: CharacterSet) -> Result<(), PinValidationError> {
        if let Some(bad) = pin.chars().find(|&c| !set.accepts(c)) {
            return Err(PinValidationError::InvalidCharacter(bad));
        }

        let len = pin.chars().count();
        if let Some(min) = self.min_length {
            if len < min {
                return Err(PinValidationError::TooShort { min });
            }
        }
        if let Some(max) = self.max_length {
            if len > max {
                return Err(PinValidationError::TooLong { max });
            }
        }

        if self.reject_trivial && is_trivial(pin) {
            return Err(PinValidationError::TooSimple);
        }

        Ok(())
    }
}

/// All-identical or straight +1/-1 digit runs
fn is_trivial(pin: &str) -> bool {
    let digits = match pin.chars().map(|c| c.to_digit(10)).collect::<Option<Vec<u32>>>() {
        Some(digits) => digits,
        None => return false,
    };
    if digits.len() < 2 {
        return false;
    }

    let steps: Vec<i64> = digits
        .windows(2)
        .map(|w| i64::from(w[1]) - i64::from(w[0]))
        .collect();

    [0, 1, -1]
        .iter()
        .any(|&step| steps.iter().all(|&s| s == step))
}
