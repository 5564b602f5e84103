//! `veriscope capture <url>` — one-shot capture from the command line.

use crate::capture::orchestrator::{CaptureLimits, Orchestrator};
use crate::capture::request::{CaptureMode, CaptureRequest};
use crate::driver::chromium::ChromiumDriver;
use crate::driver::{Driver, Viewport};
use crate::events::EventBus;
use crate::storage::ArtifactStore;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Run a single capture session and print the result as JSON.
pub async fn run(
    url: &str,
    mode: &str,
    token: Option<String>,
    max_screenshots: Option<i64>,
    viewport: Option<String>,
    capture_dir: Option<PathBuf>,
) -> Result<()> {
    let mode = CaptureMode::parse(mode)?;
    let viewport = viewport.as_deref().map(parse_viewport).transpose()?;
    let request = CaptureRequest::new(url, mode, token, max_screenshots, viewport)?;

    let driver = ChromiumDriver::new()
        .await
        .context("failed to start the browser driver")?;
    let driver: Arc<dyn Driver> = Arc::new(driver);

    let store = ArtifactStore::new(capture_dir.unwrap_or_else(ArtifactStore::default_dir))?;
    let events = Arc::new(EventBus::new(16));
    let orchestrator = Orchestrator::new(
        Arc::clone(&driver),
        store.clone(),
        events,
        CaptureLimits::default(),
        1,
    );

    let session = orchestrator.capture(request).await?;

    println!("{}", serde_json::to_string_pretty(&session)?);
    for artifact in &session.screenshots {
        eprintln!("  saved {}", store.path_of(artifact).display());
    }

    let _ = driver.shutdown().await;
    Ok(())
}

/// Parse a `WIDTHxHEIGHT` viewport argument, e.g. `1280x800`.
fn parse_viewport(s: &str) -> Result<Viewport> {
    let Some((w, h)) = s.split_once('x') else {
        bail!("viewport must be WIDTHxHEIGHT, e.g. 1280x800");
    };
    let width: u32 = w.trim().parse().context("invalid viewport width")?;
    let height: u32 = h.trim().parse().context("invalid viewport height")?;
    if width == 0 || height == 0 {
        bail!("viewport dimensions must be positive");
    }
    Ok(Viewport { width, height })
}
