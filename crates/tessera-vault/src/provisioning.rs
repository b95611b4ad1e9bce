//! First-time PIN provisioning flow
//!
//! ```text
//! Onboarding -> Instructions -> InitialEntry -> ConfirmationEntry -> Deriving -> Success
//!                                     ^               |
//!                                     +--- retry --- Failure
//! ```
//!
//! The coordinator owns the PIN from the initial entry until the
//! confirmation arrives, compares the two, and runs key derivation on the
//! blocking pool. While the flow is in `Deriving`, `is_busy()` is true and
//! every other input is rejected with `VaultError::Busy`. The outcome of a
//! derivation is recorded by a detached task, so dropping the `submit`
//! future does not leave the flow stuck in `Deriving`.
//!
//! Cancelling the initial entry returns to `Onboarding`, not `Instructions`.
//! Cancelling the confirmation discards the first PIN and returns to
//! `InitialEntry`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tessera_core::{PinCapture, PinCaptureConfig, PinResult, PinSecret};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::config::PinSettings;
use crate::derivation::KeyDerivationPipeline;
use crate::error::{Result, VaultError};

/// Why provisioning stopped short of success
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    ConfirmationMismatch,
    Derivation(String),
}

/// Where the provisioning flow currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningState {
    Onboarding,
    Instructions,
    InitialEntry,
    ConfirmationEntry,
    Deriving,
    Success,
    Failure(FailureReason),
    Abandoned,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisioningState::Onboarding => "onboarding",
            ProvisioningState::Instructions => "instructions",
            ProvisioningState::InitialEntry => "initial entry",
            ProvisioningState::ConfirmationEntry => "confirmation entry",
            ProvisioningState::Deriving => "deriving",
            ProvisioningState::Success => "success",
            ProvisioningState::Failure(FailureReason::ConfirmationMismatch) => {
                "failure (confirmation mismatch)"
            }
            ProvisioningState::Failure(FailureReason::Derivation(_)) => "failure (derivation)",
            ProvisioningState::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// Notifications for a presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningEvent {
    StateChanged(ProvisioningState),
    Busy(bool),
    /// Wallet material has been written
    Provisioned,
}

/// What to do after a confirmation mismatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Stop,
}

/// Extension point for limiting confirmation attempts
pub trait AttemptPolicy: Send + Sync {
    fn after_mismatch(&self, attempts: u32, max_attempts: Option<u32>) -> RetryDecision;
}

/// Never stops retrying; `max_attempts` is informational only
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedRetries;

impl AttemptPolicy for UnlimitedRetries {
    fn after_mismatch(&self, _attempts: u32, _max_attempts: Option<u32>) -> RetryDecision {
        RetryDecision::Retry
    }
}

struct Inner {
    state: ProvisioningState,
    /// First PIN, held until the confirmation arrives
    pending: Option<PinSecret>,
    /// Confirmation PINs submitted so far
    attempts: u32,
}

impl Inner {
    fn ensure_idle(&self) -> Result<()> {
        if self.state == ProvisioningState::Deriving {
            return Err(VaultError::Busy);
        }
        Ok(())
    }
}

enum Step {
    Done(ProvisioningState),
    Derive(PinSecret),
}

/// Event sink shared with the derivation task
#[derive(Clone, Default)]
struct Notifier(Option<UnboundedSender<ProvisioningEvent>>);

impl Notifier {
    fn emit(&self, event: ProvisioningEvent) {
        if let Some(events) = &self.0 {
            // A dropped receiver just means nobody is listening
            let _ = events.send(event);
        }
    }

    fn transition(&self, inner: &mut Inner, next: ProvisioningState) {
        info!("Provisioning: {} -> {}", inner.state, next);
        inner.state = next.clone();
        self.emit(ProvisioningEvent::StateChanged(next));
    }
}

/// Drives initial entry, confirmation and key derivation
pub struct ProvisioningCoordinator {
    pipeline: Arc<KeyDerivationPipeline>,
    pin: PinSettings,
    attempt_policy: Box<dyn AttemptPolicy>,
    inner: Arc<Mutex<Inner>>,
    notifier: Notifier,
}

impl ProvisioningCoordinator {
    pub fn new(pipeline: Arc<KeyDerivationPipeline>, pin: PinSettings) -> Self {
        Self {
            pipeline,
            pin,
            attempt_policy: Box::new(UnlimitedRetries),
            inner: Arc::new(Mutex::new(Inner {
                state: ProvisioningState::Onboarding,
                pending: None,
                attempts: 0,
            })),
            notifier: Notifier::default(),
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<ProvisioningEvent>) -> Self {
        self.notifier = Notifier(Some(events));
        self
    }

    pub fn with_attempt_policy(mut self, policy: impl AttemptPolicy + 'static) -> Self {
        self.attempt_policy = Box::new(policy);
        self
    }

    pub fn state(&self) -> ProvisioningState {
        self.lock().state.clone()
    }

    /// Confirmation PINs submitted so far
    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    /// True while key derivation is running
    pub fn is_busy(&self) -> bool {
        self.lock().state == ProvisioningState::Deriving
    }

    /// Onboarding -> Instructions
    pub fn show_instructions(&self) -> Result<()> {
        self.advance(
            "show instructions",
            ProvisioningState::Onboarding,
            ProvisioningState::Instructions,
        )
    }

    /// Instructions -> InitialEntry
    pub fn begin_entry(&self) -> Result<()> {
        self.advance(
            "begin entry",
            ProvisioningState::Instructions,
            ProvisioningState::InitialEntry,
        )
    }

    /// Capture configuration for the current entry step
    pub fn capture_config(&self) -> Result<PinCaptureConfig> {
        let inner = self.lock();
        inner.ensure_idle()?;
        let policy = self.pin.policy();

        let config = match inner.state {
            ProvisioningState::InitialEntry => PinCaptureConfig::initial(policy),
            ProvisioningState::ConfirmationEntry => PinCaptureConfig::confirmation(policy),
            ref state => return Err(invalid("open a capture session", state)),
        };

        Ok(PinCaptureConfig {
            reveal_digits: self.pin.reveal_digits,
            show_optional_slots: self.pin.show_optional_slots,
            ..config.with_attempt(inner.attempts + 1, self.pin.max_attempts)
        })
    }

    /// Fresh capture session for the current entry step
    pub fn open_capture(&self) -> Result<PinCapture> {
        Ok(PinCapture::new(self.capture_config()?))
    }

    /// Feed the result of a capture session into the flow
    pub async fn submit(&self, result: PinResult) -> Result<ProvisioningState> {
        let pin = match self.accept(result)? {
            Step::Done(state) => return Ok(state),
            Step::Derive(pin) => pin,
        };

        info!("Deriving wallet material");
        let pipeline = self.pipeline.clone();
        let inner = self.inner.clone();
        let notifier = self.notifier.clone();

        // Runs to completion even if this future is dropped
        let task = tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || pipeline.save(&pin)).await;
            let next = match outcome {
                Ok(Ok(_key)) => ProvisioningState::Success,
                Ok(Err(e)) => {
                    warn!("Wallet provisioning failed: {}", e);
                    ProvisioningState::Failure(FailureReason::Derivation(e.to_string()))
                }
                Err(e) => {
                    warn!("Derivation task did not complete: {}", e);
                    ProvisioningState::Failure(FailureReason::Derivation(format!(
                        "derivation task failed: {}",
                        e
                    )))
                }
            };

            {
                let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
                notifier.transition(&mut inner, next.clone());
            }
            notifier.emit(ProvisioningEvent::Busy(false));
            if next == ProvisioningState::Success {
                notifier.emit(ProvisioningEvent::Provisioned);
            }
            next
        });

        task.await
            .map_err(|e| VaultError::Crypto(format!("Provisioning task failed: {}", e)))
    }

    /// Leave a failure state
    pub fn retry(&self) -> Result<ProvisioningState> {
        let mut inner = self.lock();
        inner.ensure_idle()?;

        let next = match &inner.state {
            ProvisioningState::Failure(FailureReason::ConfirmationMismatch) => {
                match self
                    .attempt_policy
                    .after_mismatch(inner.attempts, self.pin.max_attempts)
                {
                    RetryDecision::Retry => ProvisioningState::InitialEntry,
                    RetryDecision::Stop => ProvisioningState::Abandoned,
                }
            }
            ProvisioningState::Failure(FailureReason::Derivation(_)) => {
                ProvisioningState::InitialEntry
            }
            state => return Err(invalid("retry", state)),
        };

        self.notifier.transition(&mut inner, next.clone());
        Ok(next)
    }

    /// Give up on provisioning; refused while deriving
    pub fn abandon(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_idle()?;

        if matches!(inner.state, ProvisioningState::Success | ProvisioningState::Abandoned) {
            return Err(invalid("abandon", &inner.state));
        }

        inner.pending = None;
        self.notifier.transition(&mut inner, ProvisioningState::Abandoned);
        Ok(())
    }

    /// Synchronous half of `submit`; the guard never crosses an await
    fn accept(&self, result: PinResult) -> Result<Step> {
        let mut inner = self.lock();
        inner.ensure_idle()?;

        match (inner.state.clone(), result) {
            (ProvisioningState::InitialEntry, PinResult::Cancelled) => {
                self.notifier.transition(&mut inner, ProvisioningState::Onboarding);
                Ok(Step::Done(ProvisioningState::Onboarding))
            }
            (ProvisioningState::InitialEntry, PinResult::Pin(pin)) => {
                inner.pending = Some(pin);
                self.notifier
                    .transition(&mut inner, ProvisioningState::ConfirmationEntry);
                Ok(Step::Done(ProvisioningState::ConfirmationEntry))
            }

            (ProvisioningState::ConfirmationEntry, PinResult::Cancelled) => {
                inner.pending = None;
                self.notifier.transition(&mut inner, ProvisioningState::InitialEntry);
                Ok(Step::Done(ProvisioningState::InitialEntry))
            }
            (ProvisioningState::ConfirmationEntry, PinResult::Pin(confirmation)) => {
                inner.attempts += 1;
                let first = inner.pending.take().ok_or_else(|| VaultError::InvalidTransition {
                    action: "confirm a PIN",
                    state: "missing the initial PIN".to_string(),
                })?;

                if first != confirmation {
                    info!("PIN confirmation mismatch (attempt {})", inner.attempts);
                    let next = ProvisioningState::Failure(FailureReason::ConfirmationMismatch);
                    self.notifier.transition(&mut inner, next.clone());
                    return Ok(Step::Done(next));
                }

                self.notifier.emit(ProvisioningEvent::Busy(true));
                self.notifier.transition(&mut inner, ProvisioningState::Deriving);
                Ok(Step::Derive(first))
            }

            (state, PinResult::Cancelled) => Err(invalid("cancel entry", &state)),
            (state, PinResult::Pin(_)) => Err(invalid("submit a PIN", &state)),
        }
    }

    fn advance(
        &self,
        action: &'static str,
        from: ProvisioningState,
        to: ProvisioningState,
    ) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_idle()?;
        if inner.state != from {
            return Err(invalid(action, &inner.state));
        }
        self.notifier.transition(&mut inner, to);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn invalid(action: &'static str, state: &ProvisioningState) -> VaultError {
    VaultError::InvalidTransition {
        action,
        state: state.to_string(),
    }
}
