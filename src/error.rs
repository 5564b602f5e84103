//! Fatal failure taxonomy for capture sessions.
//!
//! Only the four classes below abort a session. Optional-step failures
//! (secondary/tertiary screenshots, token localization, field extraction)
//! are skips, not errors: they shape the returned data and are surfaced
//! through the session's skip ledger and the event bus.

use thiserror::Error;

/// A fatal capture failure, reported to the caller as a single structured
/// error response. No error is retried automatically — retry policy belongs
/// to the caller.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Malformed or missing request fields. The browser engine is never
    /// touched on this path.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The browser engine could not be launched or refused a new context.
    #[error("browser driver unavailable: {0}")]
    DriverUnavailable(String),

    /// Navigation to the profile URL timed out or the host was unreachable.
    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    /// The mandatory primary screenshot could not be produced. A session
    /// with zero evidence has no value, so this aborts.
    #[error("primary screenshot failed: {0}")]
    Capture(String),
}

impl CaptureError {
    /// Stable error code reported at the service boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E_VALIDATION",
            Self::DriverUnavailable(_) => "E_DRIVER_UNAVAILABLE",
            Self::NavigationFailed(_) => "E_NAVIGATION_FAILED",
            Self::Capture(_) => "E_CAPTURE_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(CaptureError::Validation("x".into()).code(), "E_VALIDATION");
        assert_eq!(
            CaptureError::DriverUnavailable("x".into()).code(),
            "E_DRIVER_UNAVAILABLE"
        );
        assert_eq!(
            CaptureError::NavigationFailed("x".into()).code(),
            "E_NAVIGATION_FAILED"
        );
        assert_eq!(CaptureError::Capture("x".into()).code(), "E_CAPTURE_FAILED");
    }

    #[test]
    fn test_display_includes_cause() {
        let e = CaptureError::NavigationFailed("timed out after 30000ms".into());
        assert!(e.to_string().contains("timed out"));
    }
}
