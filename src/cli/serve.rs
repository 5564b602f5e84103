//! Start the Veriscope capture service.

use crate::capture::orchestrator::{CaptureLimits, Orchestrator};
use crate::driver::chromium::ChromiumDriver;
use crate::driver::{Driver, NoopDriver};
use crate::events::{CaptureEvent, EventBus};
use crate::rest::{self, AppState};
use crate::storage::ArtifactStore;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Bring up the driver, the orchestrator, and the REST boundary; serve
/// until interrupted.
pub async fn run(port: u16, max_concurrent: usize, capture_dir: Option<PathBuf>) -> Result<()> {
    info!("starting Veriscope v{}", env!("CARGO_PKG_VERSION"));

    let driver: Arc<dyn Driver> = match ChromiumDriver::new().await {
        Ok(d) => {
            info!("Chromium driver initialized");
            Arc::new(d)
        }
        Err(e) => {
            warn!("Failed to initialize Chromium: {e}");
            warn!("Serving in degraded mode — captures will fail until Chromium is installed");
            Arc::new(NoopDriver)
        }
    };

    let store = ArtifactStore::new(capture_dir.unwrap_or_else(ArtifactStore::default_dir))?;
    info!("capture directory: {}", store.dir().display());

    let events = Arc::new(EventBus::new(256));
    events.emit(CaptureEvent::RuntimeStarted {
        version: env!("CARGO_PKG_VERSION").to_string(),
        http_port: Some(port),
    });

    let orchestrator = Orchestrator::new(
        Arc::clone(&driver),
        store,
        Arc::clone(&events),
        CaptureLimits::default(),
        max_concurrent,
    );

    let state = Arc::new(AppState {
        orchestrator,
        events,
        started_at: Instant::now(),
    });

    let result = rest::start(port, state).await;

    let _ = driver.shutdown().await;
    info!("veriscope stopped");
    result
}
