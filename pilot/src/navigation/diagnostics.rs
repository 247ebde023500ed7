//! Best-effort diagnostic capture, invoked after each attempt's decision.
//!
//! Observers never return errors: a failed capture is logged and dropped so it
//! can never mask or replace the navigation outcome that triggered it.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::io::session::Session;

/// What the resolver decided for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub target: String,
    /// 0-based attempt index.
    pub attempt: u32,
    /// Short tag for the decision (`reached`, `container_missing`, ...).
    pub label: String,
    pub detail: Option<String>,
}

/// Hook invoked after the resolver decides an attempt's outcome.
#[async_trait]
pub trait DiagnosticObserver: Send + Sync {
    async fn on_success(&self, session: &dyn Session, event: &DiagnosticEvent);
    async fn on_failure(&self, session: &dyn Session, event: &DiagnosticEvent);
}

/// Observer that captures nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

#[async_trait]
impl DiagnosticObserver for NoopObserver {
    async fn on_success(&self, _session: &dyn Session, _event: &DiagnosticEvent) {}
    async fn on_failure(&self, _session: &dyn Session, _event: &DiagnosticEvent) {}
}

/// Observer that writes `<dir>/<target>-<attempt>-<label>.png` screenshots.
#[derive(Debug, Clone)]
pub struct ScreenshotObserver {
    dir: PathBuf,
    capture_timeout: Duration,
    capture_success: bool,
}

impl ScreenshotObserver {
    pub fn new(dir: impl Into<PathBuf>, capture_timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            capture_timeout,
            capture_success: true,
        }
    }

    /// Only capture failures.
    pub fn failures_only(mut self) -> Self {
        self.capture_success = false;
        self
    }

    pub fn path_for(&self, event: &DiagnosticEvent) -> PathBuf {
        self.dir.join(format!(
            "{}-{}-{}.png",
            event.target, event.attempt, event.label
        ))
    }

    async fn capture(&self, session: &dyn Session, event: &DiagnosticEvent) {
        let path = self.path_for(event);
        if let Err(err) = std::fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %err, "diagnostic dir unavailable");
            return;
        }
        match tokio::time::timeout(self.capture_timeout, session.screenshot(&path)).await {
            Ok(Ok(())) => debug!(path = %path.display(), "diagnostic captured"),
            Ok(Err(err)) => {
                warn!(
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "diagnostic capture failed"
                );
            }
            Err(_) => warn!(
                path = %path.display(),
                timeout_ms = self.capture_timeout.as_millis() as u64,
                "diagnostic capture timed out"
            ),
        }
    }
}

#[async_trait]
impl DiagnosticObserver for ScreenshotObserver {
    async fn on_success(&self, session: &dyn Session, event: &DiagnosticEvent) {
        if self.capture_success {
            self.capture(session, event).await;
        }
    }

    async fn on_failure(&self, session: &dyn Session, event: &DiagnosticEvent) {
        self.capture(session, event).await;
    }
}
