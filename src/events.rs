// Copyright 2026 Veriscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Veriscope event bus — typed events from the capture pipeline.
//!
//! The EventBus is a `tokio::sync::broadcast` channel carrying
//! [`CaptureEvent`] values. Any consumer — the REST SSE endpoint, log
//! sinks, dashboards — can subscribe independently. When no subscribers
//! exist, events are silently dropped (zero overhead).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event the capture pipeline emits. Serialized to JSON for SSE.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CaptureEvent {
    // ── Session Events ────────────────────
    /// A capture session has started.
    SessionStarted {
        session_id: String,
        platform: String,
        mode: String,
        url: String,
    },
    /// A screenshot was taken and stored.
    ScreenshotCaptured {
        session_id: String,
        name: String,
        bytes: usize,
        elapsed_ms: u64,
    },
    /// An optional step was skipped (non-fatal).
    StepSkipped {
        session_id: String,
        step: String,
        reason: String,
    },
    /// Token-in-bio verification ran.
    TokenChecked {
        session_id: String,
        found: bool,
        location: Option<String>,
    },
    /// The session completed with evidence.
    SessionCompleted {
        session_id: String,
        platform: String,
        screenshots: usize,
        skipped_steps: usize,
        total_ms: u64,
    },
    /// The session failed fatally.
    SessionFailed {
        session_id: String,
        error: String,
        total_ms: u64,
    },

    // ── System Events ─────────────────────
    /// Veriscope runtime started.
    RuntimeStarted {
        version: String,
        http_port: Option<u16>,
    },
}

/// The central event bus.
pub struct EventBus {
    sender: broadcast::Sender<CaptureEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: CaptureEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.sender.subscribe()
    }
}

/// Check if an event belongs to a specific session.
pub fn event_matches_session(event: &CaptureEvent, session_id: &str) -> bool {
    match event {
        CaptureEvent::SessionStarted { session_id: s, .. }
        | CaptureEvent::ScreenshotCaptured { session_id: s, .. }
        | CaptureEvent::StepSkipped { session_id: s, .. }
        | CaptureEvent::TokenChecked { session_id: s, .. }
        | CaptureEvent::SessionCompleted { session_id: s, .. }
        | CaptureEvent::SessionFailed { session_id: s, .. } => s == session_id,
        // System events are not session-specific — deliver to everyone
        CaptureEvent::RuntimeStarted { .. } => true,
    }
}
