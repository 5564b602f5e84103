//! End-to-end orchestrator tests against an instrumented fake driver.
//!
//! The fake driver scripts page behavior (element presence, body text,
//! failure injection) and counts context opens/closes/navigations, so the
//! cleanup invariant — every terminal session closes its context exactly
//! once — can be asserted directly.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use veriscope::capture::orchestrator::{CaptureLimits, Orchestrator};
use veriscope::capture::request::{CaptureMode, CaptureRequest};
use veriscope::capture::session::{ScreenshotKind, SessionOutcome, TokenLocation};
use veriscope::driver::{
    BrowserContext, ContextIdentity, Driver, DriverError, ElementHandle, Viewport,
};
use veriscope::events::{CaptureEvent, EventBus};
use veriscope::storage::ArtifactStore;

const EBAY_URL: &str = "https://www.ebay.com/usr/trusted_seller";
const EBAY_FEEDBACK_TAB: &str = "a[href*='feedback']";
const EBAY_BIO: &str = ".str-about-description";

// ── Fake driver ─────────────────────────────────────────────────

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    navigations: AtomicUsize,
}

impl Counters {
    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
    fn navigations(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }
}

/// Scripted behavior for the fake page.
#[derive(Clone, Default)]
struct PageScript {
    body_text: String,
    page_title: Option<String>,
    canonical_url: Option<String>,
    username: Option<String>,
    /// selector → element text
    elements: HashMap<String, String>,
    fail_navigation: bool,
    fail_screenshot: bool,
    fail_click: bool,
    fail_close: bool,
}

impl PageScript {
    fn with_element(mut self, selector: &str, text: &str) -> Self {
        self.elements.insert(selector.to_string(), text.to_string());
        self
    }
}

struct FakeDriver {
    script: PageScript,
    counters: Arc<Counters>,
}

#[async_trait]
impl Driver for FakeDriver {
    async fn open_context(
        &self,
        _viewport: Viewport,
        _identity: &ContextIdentity,
    ) -> Result<Box<dyn BrowserContext>, DriverError> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            script: self.script.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }

    async fn shutdown(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.counters.opened() - self.counters.closed()
    }
}

struct FakeContext {
    script: PageScript,
    counters: Arc<Counters>,
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn navigate(&mut self, _url: &str, timeout_ms: u64) -> Result<(), DriverError> {
        self.counters.navigations.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_navigation {
            return Err(DriverError::NavigationTimeout(timeout_ms));
        }
        Ok(())
    }

    async fn locate(&self, selector: &str) -> Option<ElementHandle> {
        self.script
            .elements
            .contains_key(selector)
            .then(|| ElementHandle::new(selector))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        if self.script.fail_click {
            return Err(DriverError::Protocol("click failed".into()));
        }
        if self.script.elements.contains_key(element.selector()) {
            Ok(())
        } else {
            Err(DriverError::Protocol("element no longer resolves".into()))
        }
    }

    async fn read_text(&self, element: &ElementHandle) -> Option<String> {
        self.script.elements.get(element.selector()).cloned()
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        if self.script.fail_screenshot {
            return Err(DriverError::Protocol("rendering error".into()));
        }
        Ok(b"fake-png".to_vec())
    }

    async fn scroll_by(&self, _dy: i64) -> Result<(), DriverError> {
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError> {
        if script.contains("innerText") {
            Ok(json!(self.script.body_text))
        } else {
            Ok(json!({
                "pageTitle": self.script.page_title,
                "canonicalUrl": self.script.canonical_url,
                "username": self.script.username,
            }))
        }
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_close {
            return Err(DriverError::Protocol("close failed".into()));
        }
        Ok(())
    }
}

// ── Fixture ─────────────────────────────────────────────────────

struct Fixture {
    orchestrator: Orchestrator,
    counters: Arc<Counters>,
    events: Arc<EventBus>,
    _tmp: TempDir,
}

fn fixture(script: PageScript) -> Fixture {
    let counters = Arc::new(Counters::default());
    let driver = Arc::new(FakeDriver {
        script,
        counters: Arc::clone(&counters),
    });
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::new(tmp.path().to_path_buf()).unwrap();
    let events = Arc::new(EventBus::new(64));
    let limits = CaptureLimits {
        navigation_timeout_ms: 1_000,
        step_timeout_ms: 500,
        settle_ms: 1,
        scroll_offset_px: 600,
    };
    let orchestrator = Orchestrator::new(driver, store, Arc::clone(&events), limits, 2);
    Fixture {
        orchestrator,
        counters,
        events,
        _tmp: tmp,
    }
}

fn extraction_request(url: &str, max_screenshots: Option<i64>) -> CaptureRequest {
    CaptureRequest::new(url, CaptureMode::ProfileExtraction, None, max_screenshots, None).unwrap()
}

fn token_request(url: &str, token: &str) -> CaptureRequest {
    CaptureRequest::new(
        url,
        CaptureMode::TokenInBio,
        Some(token.to_string()),
        Some(1),
        None,
    )
    .unwrap()
}

fn names(session: &veriscope::capture::session::CaptureSession) -> Vec<ScreenshotKind> {
    session.screenshots.iter().map(|s| s.name).collect()
}

// ── Happy paths ─────────────────────────────────────────────────

#[tokio::test]
async fn test_full_capture_takes_three_screenshots_in_order() {
    let f = fixture(
        PageScript::default().with_element(EBAY_FEEDBACK_TAB, "Feedback"),
    );
    let session = f
        .orchestrator
        .capture(extraction_request(EBAY_URL, Some(3)))
        .await
        .unwrap();

    assert_eq!(session.platform, "ebay");
    assert_eq!(
        names(&session),
        vec![
            ScreenshotKind::MainProfile,
            ScreenshotKind::ReviewsTab,
            ScreenshotKind::ScrolledView,
        ]
    );
    assert_eq!(session.outcome, SessionOutcome::Success);
    assert!(session.token_verification.is_none());
    assert_eq!(f.counters.opened(), 1);
    assert_eq!(f.counters.closed(), 1);
    // initial navigation + re-navigation before the scrolled shot
    assert_eq!(f.counters.navigations(), 2);
}

#[tokio::test]
async fn test_screenshots_are_written_to_the_store() {
    let f = fixture(PageScript::default());
    let session = f
        .orchestrator
        .capture(extraction_request(EBAY_URL, Some(1)))
        .await
        .unwrap();

    assert_eq!(session.screenshots.len(), 1);
    let artifact = &session.screenshots[0];
    assert!(artifact.filename.ends_with("_main_profile.png"));
    let path = f.orchestrator.store().path_of(artifact);
    assert_eq!(std::fs::read(path).unwrap(), b"fake-png");
}

#[tokio::test]
async fn test_secondary_tab_absent_yields_main_and_scrolled() {
    // Known platform with both locators defined, but no tab on the page.
    let f = fixture(PageScript::default());
    let mut rx = f.events.subscribe();

    let session = f
        .orchestrator
        .capture(extraction_request(EBAY_URL, Some(3)))
        .await
        .unwrap();

    assert_eq!(
        names(&session),
        vec![ScreenshotKind::MainProfile, ScreenshotKind::ScrolledView]
    );
    assert_eq!(session.outcome, SessionOutcome::PartialSuccess);
    assert_eq!(session.skips.len(), 1);
    assert_eq!(session.skips[0].step, "reviews_tab");
    // secondary never replaced the page, so no re-navigation
    assert_eq!(f.counters.navigations(), 1);

    let mut saw_skip = false;
    while let Ok(event) = rx.try_recv() {
        if let CaptureEvent::StepSkipped { step, .. } = event {
            assert_eq!(step, "reviews_tab");
            saw_skip = true;
        }
    }
    assert!(saw_skip, "StepSkipped event not emitted");
}

#[tokio::test]
async fn test_budget_of_one_takes_only_the_main_screenshot() {
    let f = fixture(
        PageScript::default().with_element(EBAY_FEEDBACK_TAB, "Feedback"),
    );
    let session = f
        .orchestrator
        .capture(extraction_request(EBAY_URL, Some(1)))
        .await
        .unwrap();

    assert_eq!(names(&session), vec![ScreenshotKind::MainProfile]);
    assert_eq!(session.outcome, SessionOutcome::Success);
}

#[tokio::test]
async fn test_unknown_platform_skips_locator_dependent_steps() {
    let f = fixture(PageScript::default());
    let session = f
        .orchestrator
        .capture(extraction_request("https://example.org/profile/1", Some(3)))
        .await
        .unwrap();

    assert_eq!(session.platform, "unknown");
    // No secondary locator → the step does not apply, and the session
    // still completes with the evidence that needs no locator.
    assert_eq!(
        names(&session),
        vec![ScreenshotKind::MainProfile, ScreenshotKind::ScrolledView]
    );
    assert_eq!(session.outcome, SessionOutcome::Success);
}

#[tokio::test]
async fn test_profile_extraction_populates_best_effort_fields() {
    let script = PageScript {
        page_title: Some("trusted_seller on eBay".into()),
        canonical_url: Some("https://www.ebay.com/usr/trusted_seller".into()),
        username: Some("trusted_seller".into()),
        ..Default::default()
    };
    let f = fixture(script);
    let session = f
        .orchestrator
        .capture(extraction_request(EBAY_URL, Some(1)))
        .await
        .unwrap();

    assert_eq!(session.profile_data.page_title.as_deref(), Some("trusted_seller on eBay"));
    assert_eq!(session.profile_data.username.as_deref(), Some("trusted_seller"));
    assert!(session.token_verification.is_none());
}

// ── Token verification ──────────────────────────────────────────

#[tokio::test]
async fn test_token_found_in_bio() {
    let script = PageScript {
        body_text: "seller page ... verify:ABC123 ... footer".into(),
        ..Default::default()
    }
    .with_element(EBAY_BIO, "About me: verify:ABC123");
    let f = fixture(script);

    let session = f
        .orchestrator
        .capture(token_request(EBAY_URL, "verify:ABC123"))
        .await
        .unwrap();

    let verification = session.token_verification.unwrap();
    assert!(verification.found);
    assert_eq!(verification.location, Some(TokenLocation::Bio));
    assert_eq!(verification.token, "verify:ABC123");
}

#[tokio::test]
async fn test_token_in_page_but_bio_absent_is_page_content() {
    let script = PageScript {
        body_text: "somewhere in the page: ABC123".into(),
        ..Default::default()
    };
    let f = fixture(script);

    let session = f
        .orchestrator
        .capture(token_request(EBAY_URL, "ABC123"))
        .await
        .unwrap();

    let verification = session.token_verification.unwrap();
    assert!(verification.found);
    assert_eq!(verification.location, Some(TokenLocation::PageContent));
}

#[tokio::test]
async fn test_token_in_page_but_not_in_bio_text_is_page_content() {
    let script = PageScript {
        body_text: "listing description mentions ABC123".into(),
        ..Default::default()
    }
    .with_element(EBAY_BIO, "About me: nothing relevant");
    let f = fixture(script);

    let session = f
        .orchestrator
        .capture(token_request(EBAY_URL, "ABC123"))
        .await
        .unwrap();

    let verification = session.token_verification.unwrap();
    assert!(verification.found);
    assert_eq!(verification.location, Some(TokenLocation::PageContent));
}

#[tokio::test]
async fn test_token_absent_reports_not_found() {
    let script = PageScript {
        body_text: "no token anywhere".into(),
        ..Default::default()
    };
    let f = fixture(script);

    let session = f
        .orchestrator
        .capture(token_request(EBAY_URL, "ABC123"))
        .await
        .unwrap();

    let verification = session.token_verification.unwrap();
    assert!(!verification.found);
    assert_eq!(verification.location, None);
}

#[test]
fn test_token_mode_without_token_is_rejected_before_any_navigation() {
    let err = CaptureRequest::new(EBAY_URL, CaptureMode::TokenInBio, None, None, None)
        .err()
        .unwrap();
    assert_eq!(err.code(), "E_VALIDATION");
    // No orchestrator, no driver: the request type cannot be constructed,
    // so navigation can never happen for this input.
}

// ── Failure paths ───────────────────────────────────────────────

#[tokio::test]
async fn test_navigation_failure_is_fatal_and_closes_the_context() {
    let script = PageScript {
        fail_navigation: true,
        ..Default::default()
    };
    let f = fixture(script);

    let err = f
        .orchestrator
        .capture(extraction_request(EBAY_URL, Some(3)))
        .await
        .err()
        .unwrap();

    assert_eq!(err.code(), "E_NAVIGATION_FAILED");
    assert_eq!(f.counters.opened(), 1);
    assert_eq!(f.counters.closed(), 1);
    // zero screenshots on the failure path
    assert_eq!(std::fs::read_dir(f.orchestrator.store().dir()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_primary_screenshot_failure_is_fatal() {
    let script = PageScript {
        fail_screenshot: true,
        ..Default::default()
    };
    let f = fixture(script);

    let err = f
        .orchestrator
        .capture(extraction_request(EBAY_URL, Some(3)))
        .await
        .err()
        .unwrap();

    assert_eq!(err.code(), "E_CAPTURE_FAILED");
    assert_eq!(f.counters.closed(), 1);
}

#[tokio::test]
async fn test_secondary_click_failure_is_non_fatal() {
    let script = PageScript {
        fail_click: true,
        ..Default::default()
    }
    .with_element(EBAY_FEEDBACK_TAB, "Feedback");
    let f = fixture(script);

    let session = f
        .orchestrator
        .capture(extraction_request(EBAY_URL, Some(3)))
        .await
        .unwrap();

    assert_eq!(
        names(&session),
        vec![ScreenshotKind::MainProfile, ScreenshotKind::ScrolledView]
    );
    assert_eq!(session.outcome, SessionOutcome::PartialSuccess);
    // the failed click never replaced the page, so no re-navigation
    assert_eq!(f.counters.navigations(), 1);
}

#[tokio::test]
async fn test_failed_close_poisons_the_pool() {
    let script = PageScript {
        fail_close: true,
        ..Default::default()
    };
    let f = fixture(script);

    // First capture succeeds but its context fails to close.
    let session = f
        .orchestrator
        .capture(extraction_request(EBAY_URL, Some(1)))
        .await
        .unwrap();
    assert_eq!(session.screenshots.len(), 1);
    assert!(f.orchestrator.pool().is_poisoned());

    // No new context may be started after a failed close.
    let err = f
        .orchestrator
        .capture(extraction_request(EBAY_URL, Some(1)))
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "E_DRIVER_UNAVAILABLE");
    assert_eq!(f.counters.opened(), 1);
}
