//! Chromium-based driver using chromiumoxide.

use super::{BrowserContext, ContextIdentity, Driver, DriverError, ElementHandle, Viewport};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Settle period after load, so client-side rendering can finish before
/// anything is read or photographed.
const SETTLE_AFTER_LOAD: Duration = Duration::from_millis(1500);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. VERISCOPE_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("VERISCOPE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.veriscope/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".veriscope/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".veriscope/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".veriscope/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".veriscope/chromium/chrome-linux64/chrome"),
                home.join(".veriscope/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based driver. One headless browser process serves all capture
/// sessions; each session gets its own tab. The browser runs incognito with
/// no persisted profile, so contexts start cookie-free.
pub struct ChromiumDriver {
    browser: Browser,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumDriver {
    /// Launch a headless Chromium instance.
    pub async fn new() -> Result<Self, DriverError> {
        let chrome_path = find_chromium().ok_or_else(|| {
            DriverError::Launch("Chromium not found. Run `veriscope doctor`.".to_string())
        })?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--incognito")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| DriverError::Launch(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(format!("failed to launch Chromium: {e}")))?;

        // Spawn the handler task
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    async fn open_context(
        &self,
        viewport: Viewport,
        identity: &ContextIdentity,
    ) -> Result<Box<dyn BrowserContext>, DriverError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Launch(format!("failed to create new page: {e}")))?;

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(DriverError::Protocol)?;
        page.execute(metrics)
            .await
            .map_err(|e| DriverError::Protocol(format!("viewport override failed: {e}")))?;

        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(identity.user_agent.clone())
            .build()
            .map_err(DriverError::Protocol)?;
        page.execute(user_agent)
            .await
            .map_err(|e| DriverError::Protocol(format!("user agent override failed: {e}")))?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
            closed: false,
        }))
    }

    async fn shutdown(&self) -> Result<(), DriverError> {
        // Browser process exits when ChromiumDriver is dropped
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<(), DriverError> {
        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        match result {
            Ok(Ok(_response)) => {
                let _ = self.page.wait_for_navigation().await;
                // Dynamic content: give client-side rendering a moment
                tokio::time::sleep(SETTLE_AFTER_LOAD).await;
                Ok(())
            }
            Ok(Err(e)) => Err(DriverError::Navigation(e.to_string())),
            Err(_) => Err(DriverError::NavigationTimeout(timeout_ms)),
        }
    }

    async fn locate(&self, selector: &str) -> Option<ElementHandle> {
        self.page
            .find_element(selector)
            .await
            .ok()
            .map(|_| ElementHandle::new(selector))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let el = self
            .page
            .find_element(element.selector())
            .await
            .map_err(|e| DriverError::Protocol(format!("element no longer resolves: {e}")))?;
        el.click()
            .await
            .map_err(|e| DriverError::Protocol(format!("click failed: {e}")))?;
        Ok(())
    }

    async fn read_text(&self, element: &ElementHandle) -> Option<String> {
        let el = self.page.find_element(element.selector()).await.ok()?;
        el.inner_text().await.ok().flatten()
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(false)
                    .build(),
            )
            .await
            .map_err(|e| DriverError::Protocol(format!("screenshot failed: {e}")))
    }

    async fn scroll_by(&self, dy: i64) -> Result<(), DriverError> {
        self.page
            .evaluate(format!("window.scrollBy(0, {dy})"))
            .await
            .map_err(|e| DriverError::Protocol(format!("scroll failed: {e}")))?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Protocol(format!("evaluate failed: {e}")))?;

        result
            .into_value()
            .map_err(|e| DriverError::Protocol(format!("failed to convert result: {e:?}")))
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        let mut this = self;
        this.closed = true;
        this.active_count.fetch_sub(1, Ordering::Relaxed);
        let page = this.page.clone();
        page.close()
            .await
            .map_err(|e| DriverError::Protocol(format!("close failed: {e}")))?;
        Ok(())
    }
}

impl Drop for ChromiumContext {
    fn drop(&mut self) {
        // Dropped without an explicit close (cancelled session): the context
        // must not outlive the session, so close it in the background.
        if !self.closed {
            self.active_count.fetch_sub(1, Ordering::Relaxed);
            let page = self.page.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = page.close().await;
                });
            }
        }
    }
}
