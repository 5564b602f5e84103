//! Capture orchestrator — drives one evidence-capture session end to end.
//!
//! The step sequence is strictly linear with optional skips, never a retry
//! loop: navigate → main screenshot → optional secondary view → optional
//! scrolled view → token verification → field extraction → assemble. Each
//! step produces an explicit ok/skip/fatal result which is folded
//! left-to-right into the session outcome. Mandatory-step failures abort
//! the session; optional-step failures append to the skip ledger and the
//! pipeline continues with whatever evidence it already has.
//!
//! The one hard invariant of the resource model: no browsing context may
//! outlive the session that created it. The context is closed on every exit
//! path, and a close failure poisons the admission pool.

use crate::capture::request::{CaptureMode, CaptureRequest};
use crate::capture::session::{
    new_session_id, CaptureSession, ProfileData, ScreenshotArtifact, ScreenshotKind,
    SessionOutcome, StepSkip, TokenLocation, TokenVerification,
};
use crate::driver::{BrowserContext, ContextIdentity, Driver, DriverError};
use crate::error::CaptureError;
use crate::events::{CaptureEvent, EventBus};
use crate::platform::{self, PlatformProfile};
use crate::pool::ContextPool;
use crate::storage::ArtifactStore;
use anyhow::Result;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Reads the full rendered document text for token containment checks.
const PAGE_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

/// Read-only structured extraction: title, canonical URL, and a best-effort
/// username tried against an ordered candidate list, first non-empty hit.
const EXTRACT_SCRIPT: &str = r#"(() => {
    const candidates = [
        "[data-testid='UserName']",
        "[data-e2e='user-title']",
        "h1",
        ".username",
        "[itemprop='name']",
    ];
    let username = null;
    for (const sel of candidates) {
        const el = document.querySelector(sel);
        const text = el && el.textContent ? el.textContent.trim() : '';
        if (text) { username = text; break; }
    }
    const canonical = document.querySelector("link[rel='canonical']");
    return {
        pageTitle: document.title || null,
        canonicalUrl: canonical ? canonical.href : null,
        username,
    };
})()"#;

/// Tunable per-session limits.
#[derive(Debug, Clone)]
pub struct CaptureLimits {
    /// Timeout for each navigation, including the initial page load.
    pub navigation_timeout_ms: u64,
    /// Timeout for each non-navigation step (screenshot, click, evaluate).
    pub step_timeout_ms: u64,
    /// Settle period after a click or scroll before photographing.
    pub settle_ms: u64,
    /// Scroll offset for the third screenshot.
    pub scroll_offset_px: i64,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 30_000,
            step_timeout_ms: 10_000,
            settle_ms: 1_000,
            scroll_offset_px: 600,
        }
    }
}

/// The orchestrator. Stateless between calls; all session state lives in
/// the [`CaptureSession`] value created and discarded per invocation.
pub struct Orchestrator {
    driver: Arc<dyn Driver>,
    pool: ContextPool,
    store: ArtifactStore,
    events: Arc<EventBus>,
    limits: CaptureLimits,
    identity: ContextIdentity,
}

impl Orchestrator {
    pub fn new(
        driver: Arc<dyn Driver>,
        store: ArtifactStore,
        events: Arc<EventBus>,
        limits: CaptureLimits,
        max_concurrent: usize,
    ) -> Self {
        Self {
            driver,
            pool: ContextPool::new(max_concurrent),
            store,
            events,
            limits,
            identity: ContextIdentity::default(),
        }
    }

    /// Override the identity presented by capture contexts.
    pub fn with_identity(mut self, identity: ContextIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Execute one capture session for a validated request.
    pub async fn capture(&self, request: CaptureRequest) -> Result<CaptureSession, CaptureError> {
        let started = Instant::now();
        let platform = platform::classify(request.url());
        let session_id = new_session_id();

        info!(
            session_id,
            platform = platform.name,
            mode = request.mode().as_str(),
            url = %request.url(),
            "capture session started"
        );
        self.events.emit(CaptureEvent::SessionStarted {
            session_id: session_id.clone(),
            platform: platform.name.to_string(),
            mode: request.mode().as_str().to_string(),
            url: request.url().to_string(),
        });

        let result = self.capture_inner(&request, platform, &session_id).await;

        let total_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(session) => {
                info!(
                    session_id,
                    screenshots = session.screenshots.len(),
                    skipped = session.skips.len(),
                    total_ms,
                    "capture session completed"
                );
                self.events.emit(CaptureEvent::SessionCompleted {
                    session_id: session_id.clone(),
                    platform: platform.name.to_string(),
                    screenshots: session.screenshots.len(),
                    skipped_steps: session.skips.len(),
                    total_ms,
                });
            }
            Err(e) => {
                warn!(session_id, error = %e, total_ms, "capture session failed");
                self.events.emit(CaptureEvent::SessionFailed {
                    session_id: session_id.clone(),
                    error: e.code().to_string(),
                    total_ms,
                });
            }
        }
        result
    }

    /// Acquire admission, open the context, run the steps, and close the
    /// context unconditionally — success, failure, every path.
    async fn capture_inner(
        &self,
        request: &CaptureRequest,
        platform: &'static PlatformProfile,
        session_id: &str,
    ) -> Result<CaptureSession, CaptureError> {
        let _permit = self.pool.acquire().await?;

        let mut ctx = self
            .driver
            .open_context(request.viewport(), &self.identity)
            .await
            .map_err(|e| CaptureError::DriverUnavailable(e.to_string()))?;

        let result = self
            .run_steps(ctx.as_mut(), request, platform, session_id)
            .await;

        if let Err(e) = ctx.close().await {
            warn!(session_id, error = %e, "browsing context failed to close");
            self.pool.poison();
        }

        result
    }

    async fn run_steps(
        &self,
        ctx: &mut dyn BrowserContext,
        request: &CaptureRequest,
        platform: &'static PlatformProfile,
        session_id: &str,
    ) -> Result<CaptureSession, CaptureError> {
        // NavigateMain — fatal on failure, nothing to salvage yet.
        ctx.navigate(request.url().as_str(), self.limits.navigation_timeout_ms)
            .await
            .map_err(|e| match e {
                DriverError::Launch(msg) => CaptureError::DriverUnavailable(msg),
                other => CaptureError::NavigationFailed(other.to_string()),
            })?;

        let mut screenshots: Vec<ScreenshotArtifact> = Vec::new();
        let mut skips: Vec<StepSkip> = Vec::new();

        // CaptureMain — unconditional once navigation succeeded; a session
        // with zero evidence has no value, so failure here is fatal.
        let step_started = Instant::now();
        let bytes = self
            .step(ctx.screenshot())
            .await
            .map_err(|e| CaptureError::Capture(e.to_string()))?;
        let artifact = self
            .save_and_emit(session_id, ScreenshotKind::MainProfile, &bytes, step_started)
            .map_err(|e| CaptureError::Capture(e.to_string()))?;
        screenshots.push(artifact);

        // CaptureSecondary — applies only when the budget allows a second
        // shot and the platform knows where its reviews/feedback tab lives.
        let mut secondary_taken = false;
        if request.max_screenshots() >= 2 {
            if let Some(selector) = platform.secondary_view_selector {
                match self.capture_secondary(ctx, selector, session_id).await {
                    Ok(Some(artifact)) => {
                        screenshots.push(artifact);
                        secondary_taken = true;
                    }
                    Ok(None) => self.skip(
                        &mut skips,
                        session_id,
                        "reviews_tab",
                        "secondary view not present".to_string(),
                    ),
                    Err(e) => self.skip(&mut skips, session_id, "reviews_tab", e.to_string()),
                }
            }
        }

        // CaptureTertiary — scrolled view, non-fatal.
        if request.max_screenshots() >= 3 {
            match self
                .capture_scrolled(ctx, request.url(), secondary_taken, session_id)
                .await
            {
                Ok(artifact) => screenshots.push(artifact),
                Err(e) => self.skip(&mut skips, session_id, "scrolled_view", e.to_string()),
            }
        }

        // TokenVerify — only in TOKEN_IN_BIO mode.
        let token_verification = match request.mode() {
            CaptureMode::TokenInBio => {
                let token = request.token().unwrap_or_default();
                let verification = self
                    .verify_token(ctx, platform, token, session_id, &mut skips)
                    .await;
                self.events.emit(CaptureEvent::TokenChecked {
                    session_id: session_id.to_string(),
                    found: verification.found,
                    location: verification.location.map(|l| match l {
                        TokenLocation::Bio => "bio".to_string(),
                        TokenLocation::PageContent => "page_content".to_string(),
                    }),
                });
                Some(verification)
            }
            CaptureMode::ProfileExtraction => None,
        };

        // ExtractData — best-effort, never fails the session.
        let profile_data = self.extract_profile(ctx).await;

        let outcome = if skips.is_empty() {
            SessionOutcome::Success
        } else {
            SessionOutcome::PartialSuccess
        };

        Ok(CaptureSession {
            session_id: session_id.to_string(),
            platform: platform.name.to_string(),
            mode: request.mode(),
            screenshots,
            token_verification,
            profile_data,
            captured_at: Utc::now(),
            outcome,
            skips,
        })
    }

    /// Locate, open, and photograph the secondary reviews/feedback view.
    /// `Ok(None)` means the tab is simply not on the page.
    async fn capture_secondary(
        &self,
        ctx: &mut dyn BrowserContext,
        selector: &str,
        session_id: &str,
    ) -> Result<Option<ScreenshotArtifact>> {
        let started = Instant::now();
        let Some(tab) = ctx.locate(selector).await else {
            return Ok(None);
        };
        self.step(ctx.click(&tab)).await?;
        tokio::time::sleep(Duration::from_millis(self.limits.settle_ms)).await;
        let bytes = self.step(ctx.screenshot()).await?;
        let artifact = self.save_and_emit(session_id, ScreenshotKind::ReviewsTab, &bytes, started)?;
        Ok(Some(artifact))
    }

    /// Scroll the profile page and photograph the revealed region. If the
    /// secondary view replaced the page, re-navigate to the original URL
    /// first.
    async fn capture_scrolled(
        &self,
        ctx: &mut dyn BrowserContext,
        url: &Url,
        renavigate: bool,
        session_id: &str,
    ) -> Result<ScreenshotArtifact> {
        let started = Instant::now();
        if renavigate {
            ctx.navigate(url.as_str(), self.limits.navigation_timeout_ms)
                .await?;
        }
        self.step(ctx.scroll_by(self.limits.scroll_offset_px)).await?;
        tokio::time::sleep(Duration::from_millis(self.limits.settle_ms)).await;
        let bytes = self.step(ctx.screenshot()).await?;
        self.save_and_emit(session_id, ScreenshotKind::ScrolledView, &bytes, started)
    }

    /// Literal substring containment over the rendered document, refined to
    /// the bio region when the platform defines a bio locator.
    async fn verify_token(
        &self,
        ctx: &mut dyn BrowserContext,
        platform: &PlatformProfile,
        token: &str,
        session_id: &str,
        skips: &mut Vec<StepSkip>,
    ) -> TokenVerification {
        let page_text = match self.step(ctx.evaluate(PAGE_TEXT_SCRIPT)).await {
            Ok(value) => value.as_str().map(str::to_string).unwrap_or_default(),
            Err(e) => {
                self.skip(
                    skips,
                    session_id,
                    "token_verify",
                    format!("page text read failed: {e}"),
                );
                return TokenVerification {
                    token: token.to_string(),
                    found: false,
                    location: None,
                };
            }
        };

        if !page_text.contains(token) {
            return TokenVerification {
                token: token.to_string(),
                found: false,
                location: None,
            };
        }

        // The token is somewhere on the page; try to pin it to the bio.
        let location = match platform.bio_selector {
            Some(selector) => match ctx.locate(selector).await {
                Some(bio) => match ctx.read_text(&bio).await {
                    Some(text) if text.contains(token) => TokenLocation::Bio,
                    _ => TokenLocation::PageContent,
                },
                None => TokenLocation::PageContent,
            },
            None => TokenLocation::PageContent,
        };

        TokenVerification {
            token: token.to_string(),
            found: true,
            location: Some(location),
        }
    }

    /// Structured extraction. Any error is swallowed — the fields stay
    /// absent and the session proceeds.
    async fn extract_profile(&self, ctx: &mut dyn BrowserContext) -> ProfileData {
        match self.step(ctx.evaluate(EXTRACT_SCRIPT)).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_default(),
            Err(e) => {
                debug!("profile extraction failed: {e}");
                ProfileData::default()
            }
        }
    }

    /// Wrap a driver operation in the step timeout.
    async fn step<T>(
        &self,
        fut: impl Future<Output = Result<T, DriverError>>,
    ) -> Result<T> {
        match tokio::time::timeout(Duration::from_millis(self.limits.step_timeout_ms), fut).await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(DriverError::Timeout(self.limits.step_timeout_ms).into()),
        }
    }

    fn skip(
        &self,
        skips: &mut Vec<StepSkip>,
        session_id: &str,
        step: &'static str,
        reason: String,
    ) {
        warn!(session_id, step, reason, "optional step skipped");
        self.events.emit(CaptureEvent::StepSkipped {
            session_id: session_id.to_string(),
            step: step.to_string(),
            reason: reason.clone(),
        });
        skips.push(StepSkip { step, reason });
    }

    /// Persist screenshot bytes and announce the artifact on the bus.
    fn save_and_emit(
        &self,
        session_id: &str,
        kind: ScreenshotKind,
        bytes: &[u8],
        started: Instant,
    ) -> Result<ScreenshotArtifact> {
        let artifact = self.store.save(session_id, kind, bytes)?;
        self.events.emit(CaptureEvent::ScreenshotCaptured {
            session_id: session_id.to_string(),
            name: kind.as_str().to_string(),
            bytes: bytes.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        Ok(artifact)
    }
}
