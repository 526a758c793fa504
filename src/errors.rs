use thiserror::Error;

use crate::android::AndroidError;
use crate::pool::DeviceStoreError;
use crate::wire::{CapabilitiesError, StatusCode};

// -----------------------------------------------------------------------------
// ----- HubError --------------------------------------------------------------

/// Crate-wide failure taxonomy. Classification decides two things: whether the
/// bring-up pipeline may retry, and which WebDriver status code reaches the
/// client.
#[derive(Debug, Error)]
pub enum HubError {
    /// Malformed capability or configuration input. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No matching or free device. Fails the attempt, triggers a bring-up
    /// retry with a fresh allocation.
    #[error("device allocation failed: {0}")]
    DeviceAllocation(#[from] DeviceStoreError),

    /// Emulator boot, app install or tooling failure. Retryable.
    #[error("device operation failed: {0}")]
    DeviceOperation(#[from] AndroidError),

    /// Terminal bring-up failure, used once the device server is confirmed up
    /// but WebDriver negotiation fails.
    #[error("session could not be created: {0}")]
    SessionCreation(String),

    /// The app under test crashed on the device. Carries the crash log.
    #[error("app under test crashed: {0}")]
    AppCrashed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

// -----------------------------------------------------------------------------
// ----- HubError: Public ------------------------------------------------------

impl HubError {
    /// Whether the bring-up pipeline may re-run with a fresh device after this
    /// failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HubError::DeviceAllocation(_) | HubError::DeviceOperation(_) | HubError::AppCrashed(_)
        )
    }

    /// The WebDriver status code this failure maps to outside of session
    /// creation (session creation always answers SESSION_NOT_CREATED).
    pub fn status_code(&self) -> StatusCode {
        match self {
            HubError::Configuration(_)
            | HubError::DeviceAllocation(_)
            | HubError::DeviceOperation(_)
            | HubError::SessionCreation(_) => StatusCode::SessionNotCreated,
            HubError::AppCrashed(_) | HubError::Internal(_) => StatusCode::UnknownError,
        }
    }
}

impl From<CapabilitiesError> for HubError {
    fn from(err: CapabilitiesError) -> Self {
        HubError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Internal(format!("json error: {err}"))
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
