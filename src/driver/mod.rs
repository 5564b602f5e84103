//! Browser driver abstraction for evidence capture.
//!
//! Defines the `Driver` and `BrowserContext` traits that hide the browser
//! engine (currently Chromium via chromiumoxide) behind a minimal capability
//! interface, so the orchestrator and its tests can run against a fake
//! in-memory driver.

pub mod chromium;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Viewport dimensions for a browsing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// Identity a browsing context presents to the target site.
#[derive(Debug, Clone)]
pub struct ContextIdentity {
    pub user_agent: String,
}

impl Default for ContextIdentity {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

/// Opaque handle to an element located on the current page.
///
/// Engine implementations resolve the handle back to a live element on use;
/// a handle may stop resolving if the page changes underneath it.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    selector: String,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }

    /// The selector this handle was located with.
    pub fn selector(&self) -> &str {
        &self.selector
    }
}

/// Engine-level failures, classified so the orchestrator can map them onto
/// the per-step fatal/skip policy.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The engine could not be launched or refused a new context.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// Navigation failed (DNS, connection refused, engine error).
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Navigation did not reach quiescence within the timeout.
    #[error("navigation timed out after {0}ms")]
    NavigationTimeout(u64),

    /// A non-navigation operation exceeded its timeout.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    /// Any other engine protocol error.
    #[error("browser protocol error: {0}")]
    Protocol(String),
}

/// A browser engine that can open isolated browsing contexts.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open an isolated, cookie-free browsing context with the given
    /// viewport and identity. Contexts are never shared across capture
    /// sessions.
    async fn open_context(
        &self,
        viewport: Viewport,
        identity: &ContextIdentity,
    ) -> Result<Box<dyn BrowserContext>, DriverError>;

    /// Shut down the engine.
    async fn shutdown(&self) -> Result<(), DriverError>;

    /// Number of currently open contexts.
    fn active_contexts(&self) -> usize;
}

/// One isolated browsing context, driving a single page.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    /// Load a URL, wait for network quiescence, then wait a short fixed
    /// settle period so client-side rendering can complete.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<(), DriverError>;

    /// Best-effort single-element lookup. Absence is a normal outcome,
    /// never an error.
    async fn locate(&self, selector: &str) -> Option<ElementHandle>;

    /// Click a previously located element.
    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Text content of a previously located element, if it still resolves.
    async fn read_text(&self, element: &ElementHandle) -> Option<String>;

    /// Capture the current viewport (not the full page) as PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// Scroll the viewport down by `dy` pixels.
    async fn scroll_by(&self, dy: i64) -> Result<(), DriverError>;

    /// Run a read-only extraction script against the rendered DOM and
    /// return its JSON value.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError>;

    /// Close this context. Invoked on every session exit path.
    async fn close(self: Box<Self>) -> Result<(), DriverError>;
}

/// A no-op driver used when Chromium is unavailable.
///
/// Keeps the service boundary up (health/status still answer) while every
/// capture fails fast with a driver-unavailable error.
pub struct NoopDriver;

#[async_trait]
impl Driver for NoopDriver {
    async fn open_context(
        &self,
        _viewport: Viewport,
        _identity: &ContextIdentity,
    ) -> Result<Box<dyn BrowserContext>, DriverError> {
        Err(DriverError::Launch(
            "Chromium not available — run `veriscope doctor`".to_string(),
        ))
    }

    async fn shutdown(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_viewport() {
        let v = Viewport::default();
        assert_eq!((v.width, v.height), (1280, 800));
    }

    #[tokio::test]
    async fn test_noop_driver_refuses_contexts() {
        let driver = NoopDriver;
        let err = driver
            .open_context(Viewport::default(), &ContextIdentity::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DriverError::Launch(_)));
        assert_eq!(driver.active_contexts(), 0);
    }
}
