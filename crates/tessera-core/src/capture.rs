//! PIN capture state machine
//!
//! A `PinCapture` accumulates characters for one entry session, keeps the
//! derived affordances (`can_add`, `can_remove`, `can_commit`) and the
//! masked representation current after every mutation, and yields the
//! clear-text PIN exactly once on commit.
//!
//! # Contract
//!
//! `add`, `remove` and `commit` have preconditions that the presentation
//! layer is expected to honor by disabling the matching affordance. The
//! `try_*` variants report a breach as `CaptureError::ContractViolation`;
//! the plain variants treat it as a fatal bug and panic.
//!
//! Confirmation is not handled here. The provisioning coordinator opens a
//! second session in `EntryMode::Confirmation` and compares the results.

use std::fmt;

use zeroize::Zeroizing;

use crate::error::{CaptureError, PinValidationError, Result};
use crate::representation::{self, PinCharacterRepresentation, ProjectionOptions};
use crate::secret::PinSecret;
use crate::validation::{is_valid_pin_character, CharacterSet, PinPolicy};

/// Which step of provisioning a session belongs to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EntryMode {
    #[default]
    Initial,
    Confirmation,
}

/// Outcome of a capture session
#[derive(Debug, PartialEq, Eq)]
pub enum PinResult {
    Pin(PinSecret),
    Cancelled,
}

/// Capture session configuration
#[derive(Clone, Debug)]
pub struct PinCaptureConfig {
    pub mode: EntryMode,
    pub policy: PinPolicy,
    pub character_set: CharacterSet,
    /// Attempt number this session represents (observable only)
    pub attempt: u32,
    /// Upper bound on attempts, if the caller enforces one
    pub max_attempts: Option<u32>,
    /// Project entered characters in clear instead of masked
    pub reveal_digits: bool,
    /// Draw optional slots between the minimum and maximum length
    pub show_optional_slots: bool,
}

impl Default for PinCaptureConfig {
    fn default() -> Self {
        Self {
            mode: EntryMode::Initial,
            policy: PinPolicy::default(),
            character_set: CharacterSet::Digits,
            attempt: 0,
            max_attempts: None,
            reveal_digits: false,
            show_optional_slots: false,
        }
    }
}

impl PinCaptureConfig {
    /// Configuration for the initial entry step
    pub fn initial(policy: PinPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Configuration for the confirmation step
    pub fn confirmation(policy: PinPolicy) -> Self {
        Self {
            mode: EntryMode::Confirmation,
            policy,
            ..Default::default()
        }
    }

    pub fn with_attempt(mut self, attempt: u32, max_attempts: Option<u32>) -> Self {
        self.attempt = attempt;
        self.max_attempts = max_attempts;
        self
    }
}

/// One PIN entry session
pub struct PinCapture {
    config: PinCaptureConfig,
    buffer: Zeroizing<String>,
    len: usize,
    can_add: bool,
    can_remove: bool,
    can_commit: bool,
    representation: Vec<PinCharacterRepresentation>,
}

impl PinCapture {
    /// Open an empty session
    pub fn new(config: PinCaptureConfig) -> Self {
        let mut capture = Self {
            config,
            buffer: Zeroizing::new(String::new()),
            len: 0,
            can_add: false,
            can_remove: false,
            can_commit: false,
            representation: Vec::new(),
        };
        capture.refresh();
        capture
    }

    pub fn config(&self) -> &PinCaptureConfig {
        &self.config
    }

    pub fn mode(&self) -> EntryMode {
        self.config.mode
    }

    pub fn attempt(&self) -> u32 {
        self.config.attempt
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.config.max_attempts
    }

    /// Number of characters entered so far
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn can_add(&self) -> bool {
        self.can_add
    }

    pub fn can_remove(&self) -> bool {
        self.can_remove
    }

    pub fn can_commit(&self) -> bool {
        self.can_commit
    }

    /// Masked per-slot projection of the buffer
    pub fn representation(&self) -> &[PinCharacterRepresentation] {
        &self.representation
    }

    /// Pure pre-filter for the presentation layer
    pub fn is_valid_pin_character(&self, candidate: &str) -> bool {
        is_valid_pin_character(candidate, self.config.character_set)
    }

    /// First user-facing problem with the current buffer, if any
    pub fn validation_error(&self) -> Option<PinValidationError> {
        self.config
            .policy
            .check(&self.buffer, self.config.character_set)
            .err()
    }

    /// Append one character
    pub fn try_add(&mut self, character: &str) -> Result<()> {
        if !self.can_add {
            return Err(CaptureError::ContractViolation("add called at maximum length"));
        }
        if !self.is_valid_pin_character(character) {
            return Err(CaptureError::ContractViolation(
                "add called with an invalid character",
            ));
        }

        self.buffer.push_str(character);
        self.refresh();
        Ok(())
    }

    /// Append one character, panicking on a contract violation
    pub fn add(&mut self, character: &str) {
        if let Err(e) = self.try_add(character) {
            panic!("{e}");
        }
    }

    /// Drop the last character
    pub fn try_remove(&mut self) -> Result<()> {
        if !self.can_remove {
            return Err(CaptureError::ContractViolation(
                "remove called on an empty buffer",
            ));
        }

        self.buffer.pop();
        self.refresh();
        Ok(())
    }

    /// Drop the last character, panicking on a contract violation
    pub fn remove(&mut self) {
        if let Err(e) = self.try_remove() {
            panic!("{e}");
        }
    }

    /// Finish the session and hand over the clear-text PIN
    pub fn try_commit(mut self) -> Result<PinResult> {
        if !self.can_commit {
            return Err(CaptureError::ContractViolation(
                "commit called before the PIN is complete",
            ));
        }

        let pin = std::mem::take(&mut *self.buffer);
        Ok(PinResult::Pin(PinSecret::new(pin)))
    }

    /// Finish the session, panicking on a contract violation
    pub fn commit(self) -> PinResult {
        match self.try_commit() {
            Ok(result) => result,
            Err(e) => panic!("{e}"),
        }
    }

    /// Abandon the session; always succeeds
    pub fn cancel(self) -> PinResult {
        PinResult::Cancelled
    }

    fn refresh(&mut self) {
        let policy = &self.config.policy;
        self.len = self.buffer.chars().count();
        self.can_add = policy.allows_more(self.len);
        self.can_remove = self.len > 0;
        self.can_commit = policy.length_in_bounds(self.len)
            && policy.accepts_content(&self.buffer, self.config.character_set);
        self.representation = representation::project(
            &self.buffer,
            policy.min_length,
            policy.max_length,
            ProjectionOptions {
                reveal: self.config.reveal_digits,
                show_optional_slots: self.config.show_optional_slots,
            },
        );
    }
}

impl fmt::Debug for PinCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinCapture")
            .field("mode", &self.config.mode)
            .field("len", &self.len)
            .field("can_add", &self.can_add)
            .field("can_remove", &self.can_remove)
            .field("can_commit", &self.can_commit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn six_digit() -> PinCapture {
        PinCapture::new(PinCaptureConfig::default())
    }

    #[test]
    fn test_fixed_length_entry() {
        let mut capture = six_digit();

        for (i, digit) in ["1", "2", "3", "4", "5", "6"].iter().enumerate() {
            assert_eq!(capture.len(), i);
            assert!(!capture.can_commit());
            assert!(capture.can_add());
            capture.add(digit);
        }

        assert_eq!(capture.len(), 6);
        assert!(capture.can_commit());
        assert!(!capture.can_add());
        assert!(capture.can_remove());

        match capture.commit() {
            PinResult::Pin(pin) => assert_eq!(pin.as_str(), "123456"),
            PinResult::Cancelled => panic!("expected a PIN"),
        }
    }

    #[test]
    fn test_remove_updates_affordances() {
        let mut capture = six_digit();
        assert!(!capture.can_remove());

        capture.add("9");
        assert!(capture.can_remove());
        capture.remove();
        assert!(capture.is_empty());
        assert!(!capture.can_remove());
        assert_eq!(capture.representation()[0], PinCharacterRepresentation::UnsetActive);
    }

    #[test]
    fn test_add_beyond_max_is_contract_violation() {
        let mut capture = six_digit();
        for _ in 0..6 {
            capture.add("0");
        }
        assert!(matches!(
            capture.try_add("0"),
            Err(CaptureError::ContractViolation(_))
        ));
        assert_eq!(capture.len(), 6);
    }

    #[test]
    fn test_add_invalid_character_is_contract_violation() {
        let mut capture = six_digit();
        assert!(capture.try_add("a").is_err());
        assert!(capture.try_add("12").is_err());
        assert!(capture.try_add("").is_err());
        assert!(capture.is_empty());
    }

    #[test]
    #[should_panic(expected = "contract violation")]
    fn test_remove_on_empty_panics() {
        let mut capture = six_digit();
        capture.remove();
    }

    #[test]
    #[should_panic(expected = "contract violation")]
    fn test_commit_incomplete_panics() {
        let mut capture = six_digit();
        capture.add("1");
        let _ = capture.commit();
    }

    #[test]
    fn test_cancel_always_succeeds() {
        assert_eq!(six_digit().cancel(), PinResult::Cancelled);

        let mut capture = six_digit();
        for _ in 0..6 {
            capture.add("3");
        }
        assert_eq!(capture.cancel(), PinResult::Cancelled);
    }

    #[test]
    fn test_is_valid_pin_character() {
        let capture = six_digit();
        assert!(!capture.is_valid_pin_character("a"));
        assert!(capture.is_valid_pin_character("5"));
    }

    #[test]
    fn test_trivial_policy_blocks_commit() {
        let policy = PinPolicy {
            reject_trivial: true,
            ..Default::default()
        };
        let mut capture = PinCapture::new(PinCaptureConfig::initial(policy));
        for _ in 0..6 {
            capture.add("1");
        }
        assert!(!capture.can_commit());
        assert_eq!(capture.validation_error(), Some(PinValidationError::TooSimple));
    }

    #[test]
    fn test_variable_length_policy() {
        let mut capture = PinCapture::new(PinCaptureConfig::initial(PinPolicy::between(4, 6)));
        for digit in ["2", "8", "4"] {
            capture.add(digit);
        }
        assert!(!capture.can_commit());
        assert_eq!(capture.validation_error(), Some(PinValidationError::TooShort { min: 4 }));

        capture.add("7");
        assert!(capture.can_commit());
        assert!(capture.can_add());
        assert_eq!(capture.validation_error(), None);
    }

    #[test]
    fn test_confirmation_config_carries_attempts() {
        let config = PinCaptureConfig::confirmation(PinPolicy::default()).with_attempt(2, Some(5));
        let capture = PinCapture::new(config);
        assert_eq!(capture.mode(), EntryMode::Confirmation);
        assert_eq!(capture.attempt(), 2);
        assert_eq!(capture.max_attempts(), Some(5));
    }

    #[test]
    fn test_debug_does_not_leak_buffer() {
        let mut capture = six_digit();
        capture.add("7");
        capture.add("3");
        let debug_str = format!("{:?}", capture);
        assert!(!debug_str.contains("73"));
        assert!(debug_str.contains("len: 2"));
    }
}
