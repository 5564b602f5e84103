//! Screenshot artifact storage.
//!
//! Artifacts are plain PNG files under a capture directory, named
//! `{session_id}_{slot}.png`. The session id keys correlation; nothing else
//! about a session is persisted here.

use crate::capture::session::{ScreenshotArtifact, ScreenshotKind};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open a store rooted at `dir`, creating it if needed.
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create capture directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Default capture directory: ~/.veriscope/captures.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".veriscope")
            .join("captures")
    }

    /// Write screenshot bytes and return the artifact record.
    pub fn save(
        &self,
        session_id: &str,
        kind: ScreenshotKind,
        bytes: &[u8],
    ) -> Result<ScreenshotArtifact> {
        let filename = format!("{session_id}_{}.png", kind.as_str());
        let path = self.dir.join(&filename);
        std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write screenshot {}", path.display()))?;
        Ok(ScreenshotArtifact {
            name: kind,
            filename,
            timestamp: Utc::now(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute path of a stored artifact.
    pub fn path_of(&self, artifact: &ScreenshotArtifact) -> PathBuf {
        self.dir.join(&artifact.filename)
    }
}
