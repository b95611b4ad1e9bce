//! Tessera Core - PIN capture and secret-holding types
//!
//! This crate provides the I/O-free pieces of PIN provisioning:
//! - A capture state machine that accumulates and validates digits
//! - The masked per-digit projection shown to the presentation layer
//! - Validation rules and user-facing validation errors
//! - Zeroizing wrappers for the clear-text PIN and the derived unlock key

pub mod capture;
pub mod error;
pub mod representation;
pub mod secret;
pub mod validation;

pub use capture::{EntryMode, PinCapture, PinCaptureConfig, PinResult};
pub use error::{CaptureError, PinValidationError, Result};
pub use representation::PinCharacterRepresentation;
pub use secret::{PinSecret, WalletUnlockKey};
pub use validation::{is_valid_pin_character, CharacterSet, PinPolicy};

/// Default PIN length (both minimum and maximum)
pub const DEFAULT_PIN_LENGTH: usize = 6;
