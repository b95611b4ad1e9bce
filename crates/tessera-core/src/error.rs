//! Error types for PIN capture

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Precondition breaches of the capture state machine.
///
/// These indicate a presentation-layer bug (an affordance was left enabled
/// when it should not have been) and are never shown to the user.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Capture contract violation: {0}")]
    ContractViolation(&'static str),
}

/// User-facing validation problems that drive retry prompts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PinValidationError {
    #[error("PIN must be at least {min} digits")]
    TooShort { min: usize },

    #[error("PIN must be at most {max} digits")]
    TooLong { max: usize },

    #[error("PIN is too simple")]
    TooSimple,

    // A single rejected character is not the secret, so it may be shown.
    #[error("Invalid PIN character: {0:?}")]
    InvalidCharacter(char),

    #[error("PINs do not match")]
    ConfirmationMismatch,
}
