//! Session and result model for one capture.

use crate::capture::request::CaptureMode;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// The three screenshot slots, in capture order. Each occurs at most once
/// per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenshotKind {
    MainProfile,
    ReviewsTab,
    ScrolledView,
}

impl ScreenshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainProfile => "main_profile",
            Self::ReviewsTab => "reviews_tab",
            Self::ScrolledView => "scrolled_view",
        }
    }
}

/// A stored screenshot. `filename` is the reference to the image bytes,
/// relative to the capture directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotArtifact {
    pub name: ScreenshotKind,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
}

/// Where the token was found.
///
/// `Bio` is only assertable when the bio locator matched and its own text
/// contains the token; `PageContent` is the weaker fallback meaning the
/// token is somewhere in the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenLocation {
    Bio,
    PageContent,
}

/// Outcome of token-in-bio verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenVerification {
    pub token: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<TokenLocation>,
}

/// Best-effort extracted profile fields. Extraction failure never fails a
/// session; fields are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// An optional step that was skipped rather than failed. Retained on the
/// session for observability; not part of the boundary schema.
#[derive(Debug, Clone, Serialize)]
pub struct StepSkip {
    pub step: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Every applicable step completed.
    Success,
    /// One or more optional steps were skipped.
    PartialSuccess,
}

/// The unit of work for one request. Created at request entry, mutated only
/// by the orchestrator executing it, discarded after the result is returned.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSession {
    pub session_id: String,
    pub platform: String,
    pub mode: CaptureMode,
    pub screenshots: Vec<ScreenshotArtifact>,
    pub token_verification: Option<TokenVerification>,
    pub profile_data: ProfileData,
    pub captured_at: DateTime<Utc>,
    #[serde(skip)]
    pub outcome: SessionOutcome,
    #[serde(skip)]
    pub skips: Vec<StepSkip>,
}

/// Generate a session id: millisecond timestamp plus a random hex suffix.
/// Used only for screenshot file correlation within one session.
pub fn new_session_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x1000000);
    format!("{}-{:06x}", Utc::now().timestamp_millis(), suffix)
}
