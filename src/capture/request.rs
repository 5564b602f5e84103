//! Validated capture requests.

use crate::driver::Viewport;
use crate::error::CaptureError;
use serde::{Deserialize, Serialize};
use url::Url;

/// What the orchestrator is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureMode {
    /// Extract public profile fields.
    #[serde(rename = "PROFILE_EXTRACTION")]
    ProfileExtraction,
    /// Verify that an ownership token is published in the profile bio.
    #[serde(rename = "TOKEN_IN_BIO")]
    TokenInBio,
}

impl CaptureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProfileExtraction => "PROFILE_EXTRACTION",
            Self::TokenInBio => "TOKEN_IN_BIO",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CaptureError> {
        match s {
            "PROFILE_EXTRACTION" => Ok(Self::ProfileExtraction),
            "TOKEN_IN_BIO" => Ok(Self::TokenInBio),
            other => Err(CaptureError::Validation(format!(
                "'mode' must be PROFILE_EXTRACTION or TOKEN_IN_BIO, got '{other}'"
            ))),
        }
    }
}

/// Hard ceiling on visual artifacts per session.
pub const MAX_SCREENSHOT_BUDGET: u8 = 3;

/// A validated, immutable capture request. Construction is the validation
/// boundary: an instance of this type is always internally consistent.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    url: Url,
    mode: CaptureMode,
    token: Option<String>,
    max_screenshots: u8,
    viewport: Viewport,
}

impl CaptureRequest {
    /// Validate and construct a request.
    ///
    /// `max_screenshots` is silently clamped to `[1, 3]` and defaults to 3.
    /// A token supplied in extraction mode is dropped.
    pub fn new(
        url: &str,
        mode: CaptureMode,
        token: Option<String>,
        max_screenshots: Option<i64>,
        viewport: Option<Viewport>,
    ) -> Result<Self, CaptureError> {
        if url.trim().is_empty() {
            return Err(CaptureError::Validation("'url' must not be empty".into()));
        }
        let parsed = Url::parse(url)
            .map_err(|e| CaptureError::Validation(format!("'url' is not a valid URL: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            s => {
                return Err(CaptureError::Validation(format!(
                    "'url' must be http or https, got '{s}'"
                )))
            }
        }

        let token = match mode {
            CaptureMode::TokenInBio => match token {
                Some(t) if !t.trim().is_empty() => Some(t),
                _ => {
                    return Err(CaptureError::Validation(
                        "'token' is required for TOKEN_IN_BIO mode".into(),
                    ))
                }
            },
            CaptureMode::ProfileExtraction => None,
        };

        let max_screenshots = max_screenshots
            .unwrap_or(MAX_SCREENSHOT_BUDGET as i64)
            .clamp(1, MAX_SCREENSHOT_BUDGET as i64) as u8;

        Ok(Self {
            url: parsed,
            mode,
            token,
            max_screenshots,
            viewport: viewport.unwrap_or_default(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// The ownership token. Present exactly when mode is TOKEN_IN_BIO.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn max_screenshots(&self) -> u8 {
        self.max_screenshots
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }
}
