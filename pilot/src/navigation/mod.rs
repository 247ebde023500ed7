//! Cascading, deadline-bounded navigation toward a named UI target.
//!
//! Each attempt:
//! 1. waits for the container frame to exist and report a URL;
//! 2. walks the trigger cascade until one strategy succeeds;
//! 3. settles, then polls for the target frame (content marker required);
//! 4. if absent, clicks the secondary search/refresh control once and polls again;
//! 5. if still absent but a related page is visible, applies one grace
//!    extension and polls a final time.
//!
//! Lower-level failures never escape an attempt. Only exhausting the outer
//! retry budget produces [`TargetNotReached`]. Every wait and every session
//! call is bounded, so a stalled driver fails the attempt instead of hanging
//! it, and dropping the returned future at any await point cancels the
//! navigation.

pub mod diagnostics;
pub mod frames;
pub mod target;
pub mod triggers;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

use crate::core::budget::{next_poll_delay, remaining_budget};
use crate::io::session::{Frame, Session, bounded, reports_url};
use crate::navigation::diagnostics::{
    DiagnosticEvent, DiagnosticObserver, NoopObserver, ScreenshotObserver,
};
use crate::navigation::frames::{
    Resolution, ResolvedFrame, related_page_visible, resolve_target_frame,
};
use crate::navigation::target::UiTarget;
use crate::navigation::triggers::{TriggerContext, TriggerStrategy, cascade_for, click_first};

/// Timing knobs for navigation (TOML `[navigation]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSettings {
    /// Overall deadline for the container frame to appear.
    pub container_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Delay after a successful trigger before polling.
    pub settle_delay_ms: u64,
    /// Extra wait when a related page is visible but the target is not.
    pub grace_extension_ms: u64,
    pub click_timeout_ms: u64,
    /// Bound on each diagnostic screenshot.
    pub capture_timeout_ms: u64,
    /// Pause between failed attempts.
    pub retry_delay_ms: u64,
    pub max_retries: u32,
    pub per_attempt_timeout_ms: u64,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            container_timeout_ms: 15_000,
            poll_interval_ms: 500,
            settle_delay_ms: 1_500,
            grace_extension_ms: 5_000,
            click_timeout_ms: 5_000,
            capture_timeout_ms: 5_000,
            retry_delay_ms: 1_000,
            max_retries: 2,
            per_attempt_timeout_ms: 20_000,
        }
    }
}

impl NavigationSettings {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("container_timeout_ms", self.container_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("click_timeout_ms", self.click_timeout_ms),
            ("capture_timeout_ms", self.capture_timeout_ms),
            ("per_attempt_timeout_ms", self.per_attempt_timeout_ms),
        ];
        for (name, value) in required {
            if value == 0 {
                return Err(anyhow!("navigation.{name} must be > 0"));
            }
        }
        Ok(())
    }

    pub fn per_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.per_attempt_timeout_ms)
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }
}

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    ContainerMissing { frame: String },
    NoTriggerSucceeded { diagnostics: Vec<String> },
    TargetMissing,
    RelatedNotLoaded,
}

impl AttemptFailure {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptFailure::ContainerMissing { .. } => "container_missing",
            AttemptFailure::NoTriggerSucceeded { .. } => "no_trigger",
            AttemptFailure::TargetMissing => "target_missing",
            AttemptFailure::RelatedNotLoaded => "related_not_loaded",
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::ContainerMissing { frame } => {
                write!(f, "container frame '{frame}' did not report a URL")
            }
            AttemptFailure::NoTriggerSucceeded { diagnostics } => {
                write!(f, "no trigger strategy succeeded ({})", diagnostics.join("; "))
            }
            AttemptFailure::TargetMissing => {
                f.write_str("target frame with content marker not found")
            }
            AttemptFailure::RelatedNotLoaded => {
                f.write_str("related page visible but target never finished loading")
            }
        }
    }
}

/// Raised once, after every attempt in the retry budget has failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("target '{target}' not reached after {attempts} attempts: {last_failure}")]
pub struct TargetNotReached {
    pub target: String,
    pub attempts: u32,
    pub last_failure: AttemptFailure,
}

/// Handle to the validated target frame.
#[derive(Clone)]
pub struct ReachedTarget {
    pub target: String,
    pub frame: Arc<dyn Frame>,
    pub resolution: Resolution,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

impl fmt::Debug for ReachedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReachedTarget")
            .field("target", &self.target)
            .field("url", &self.frame.url())
            .field("resolution", &self.resolution)
            .field("attempts", &self.attempts)
            .finish()
    }
}

/// Drives a session toward a [`UiTarget`] and validates arrival.
#[derive(Clone)]
pub struct NavigationResolver {
    settings: NavigationSettings,
    observer: Arc<dyn DiagnosticObserver>,
}

impl NavigationResolver {
    pub fn new(settings: NavigationSettings) -> Self {
        Self {
            settings,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DiagnosticObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Capture a screenshot into `dir` after every attempt decision.
    pub fn with_screenshots(self, dir: impl Into<PathBuf>) -> Self {
        let capture_timeout = NavigationSettings::ms(self.settings.capture_timeout_ms);
        self.with_observer(Arc::new(ScreenshotObserver::new(dir, capture_timeout)))
    }

    pub fn settings(&self) -> &NavigationSettings {
        &self.settings
    }

    /// Reach `target` using the configured retry budget and attempt timeout.
    pub async fn reach_configured(
        &self,
        session: &dyn Session,
        target: &UiTarget,
    ) -> Result<ReachedTarget, TargetNotReached> {
        self.reach(
            session,
            target,
            self.settings.max_retries,
            self.settings.per_attempt_timeout(),
        )
        .await
    }

    /// Reach `target`, making at most `max_retries + 1` attempts.
    #[instrument(
        skip_all,
        fields(
            ui_target = %target.name,
            max_retries = max_retries,
            timeout_ms = per_attempt_timeout.as_millis() as u64
        )
    )]
    pub async fn reach(
        &self,
        session: &dyn Session,
        target: &UiTarget,
        max_retries: u32,
        per_attempt_timeout: Duration,
    ) -> Result<ReachedTarget, TargetNotReached> {
        let cascade = cascade_for(target);
        let mut last_failure = AttemptFailure::TargetMissing;

        for attempt in 0..=max_retries {
            info!(attempt, "navigation attempt");
            let outcome = self
                .attempt(session, target, &cascade, per_attempt_timeout)
                .await;

            match outcome {
                Ok(resolved) => {
                    let event = DiagnosticEvent {
                        target: target.name.clone(),
                        attempt,
                        label: "reached".to_string(),
                        detail: Some(resolved.resolution.to_string()),
                    };
                    self.observer.on_success(session, &event).await;
                    info!(attempt, resolution = %resolved.resolution, "target reached");
                    return Ok(ReachedTarget {
                        target: target.name.clone(),
                        frame: resolved.frame,
                        resolution: resolved.resolution,
                        attempts: attempt + 1,
                    });
                }
                Err(failure) => {
                    warn!(attempt, reason = %failure, "navigation attempt failed");
                    let event = DiagnosticEvent {
                        target: target.name.clone(),
                        attempt,
                        label: failure.label().to_string(),
                        detail: Some(failure.to_string()),
                    };
                    self.observer.on_failure(session, &event).await;
                    last_failure = failure;
                    if attempt < max_retries {
                        sleep(NavigationSettings::ms(self.settings.retry_delay_ms)).await;
                    }
                }
            }
        }

        Err(TargetNotReached {
            target: target.name.clone(),
            attempts: max_retries.saturating_add(1),
            last_failure,
        })
    }

    async fn attempt(
        &self,
        session: &dyn Session,
        target: &UiTarget,
        cascade: &[Box<dyn TriggerStrategy>],
        per_attempt_timeout: Duration,
    ) -> Result<ResolvedFrame, AttemptFailure> {
        let Some(container) = self
            .wait_for_container(session, &target.container_frame)
            .await
        else {
            return Err(AttemptFailure::ContainerMissing {
                frame: target.container_frame.clone(),
            });
        };

        let click_timeout = NavigationSettings::ms(self.settings.click_timeout_ms);
        let ctx = TriggerContext {
            container: container.as_ref(),
            click_timeout,
        };
        let mut diagnostics = Vec::new();
        let mut triggered = false;
        for strategy in cascade {
            let attempted = strategy.try_trigger(&ctx).await;
            if attempted.success {
                debug!(strategy = strategy.label(), "trigger succeeded");
                triggered = true;
                break;
            }
            let detail = attempted.diagnostic.unwrap_or_default();
            debug!(strategy = strategy.label(), detail = %detail, "trigger failed");
            diagnostics.push(format!("{}: {detail}", strategy.label()));
        }
        if !triggered {
            return Err(AttemptFailure::NoTriggerSucceeded { diagnostics });
        }

        sleep(NavigationSettings::ms(self.settings.settle_delay_ms)).await;
        if let Some(found) = self
            .poll_for_target(session, target, per_attempt_timeout)
            .await
        {
            return Ok(found);
        }

        if let Some(secondary) = &target.secondary_trigger {
            match click_first(container.as_ref(), secondary, click_timeout).await {
                Ok(()) => {
                    debug!(selector = %secondary, "secondary trigger clicked");
                    if let Some(found) = self
                        .poll_for_target(session, target, per_attempt_timeout)
                        .await
                    {
                        return Ok(found);
                    }
                }
                Err(err) => {
                    debug!(
                        selector = %secondary,
                        error = %format!("{err:#}"),
                        "secondary trigger failed"
                    );
                }
            }
        }

        let related_deadline = Instant::now() + per_attempt_timeout;
        if related_page_visible(session, target, related_deadline).await {
            let grace = NavigationSettings::ms(self.settings.grace_extension_ms);
            info!(
                grace_ms = grace.as_millis() as u64,
                "related page visible, applying grace extension"
            );
            sleep(grace).await;
            if let Some(found) = self
                .poll_for_target(session, target, per_attempt_timeout)
                .await
            {
                return Ok(found);
            }
            return Err(AttemptFailure::RelatedNotLoaded);
        }

        Err(AttemptFailure::TargetMissing)
    }

    async fn wait_for_container(
        &self,
        session: &dyn Session,
        name: &str,
    ) -> Option<Arc<dyn Frame>> {
        let interval = NavigationSettings::ms(self.settings.poll_interval_ms);
        let deadline = Instant::now() + NavigationSettings::ms(self.settings.container_timeout_ms);
        loop {
            let lookup = session.named_frame(name);
            match bounded(remaining_budget(deadline), "container lookup", lookup).await {
                Ok(Some(frame)) if reports_url(frame.as_ref()) => return Some(frame),
                Ok(_) => {}
                Err(err) => {
                    debug!(
                        frame = %name,
                        error = %format!("{err:#}"),
                        "container lookup failed"
                    );
                }
            }
            let delay = next_poll_delay(deadline, interval);
            if delay.is_zero() {
                return None;
            }
            sleep(delay).await;
        }
    }

    async fn poll_for_target(
        &self,
        session: &dyn Session,
        target: &UiTarget,
        timeout: Duration,
    ) -> Option<ResolvedFrame> {
        let interval = NavigationSettings::ms(self.settings.poll_interval_ms);
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(found) = resolve_target_frame(session, target, deadline).await {
                return Some(found);
            }
            let delay = next_poll_delay(deadline, interval);
            if delay.is_zero() {
                return None;
            }
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::session::Selector;
    use crate::test_support::{CountingObserver, FakeFrame, FakeSession};

    fn settings() -> NavigationSettings {
        NavigationSettings {
            container_timeout_ms: 2_000,
            poll_interval_ms: 100,
            settle_delay_ms: 200,
            grace_extension_ms: 1_000,
            click_timeout_ms: 500,
            capture_timeout_ms: 500,
            retry_delay_ms: 300,
            max_retries: 2,
            per_attempt_timeout_ms: 1_000,
        }
    }

    fn target() -> UiTarget {
        UiTarget::pending_documents()
    }

    fn grid_frame() -> FakeFrame {
        FakeFrame::new(Some("contenido"), "https://portal/doc/pendiente")
            .with_element(target().content_marker, 1)
    }

    fn container() -> FakeFrame {
        FakeFrame::new(Some("principal"), "https://portal/home")
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_target_through_direct_anchor() {
        let session = FakeSession::new();
        let anchor = Selector::css("a#menuDocPendiente");
        session.add_frame(container().with_element(anchor.clone(), 1));
        session.reveal_on_click(&anchor, grid_frame());

        let observer = Arc::new(CountingObserver::default());
        let resolver = NavigationResolver::new(settings()).with_observer(observer.clone());
        let reached = resolver
            .reach(&session, &target(), 2, Duration::from_secs(1))
            .await
            .expect("reached");

        assert_eq!(reached.attempts, 1);
        assert_eq!(
            reached.resolution,
            Resolution::NamedFrame {
                name: "contenido".to_string()
            }
        );
        assert_eq!(observer.successes(), 1);
        assert_eq!(observer.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_through_cascade_to_lateral_menu() {
        let session = FakeSession::new();
        let candidate = Selector::text("Pendiente de enviar");
        session.add_frame(
            container()
                .with_element(Selector::text("Documentación"), 1)
                .with_element(candidate.clone(), 1),
        );
        session.reveal_on_click(&candidate, grid_frame());

        let resolver = NavigationResolver::new(settings());
        let reached = resolver
            .reach(&session, &target(), 0, Duration::from_secs(1))
            .await
            .expect("reached");

        assert_eq!(reached.attempts, 1);
        assert_eq!(
            session.clicks(),
            vec![
                "text=Documentación".to_string(),
                "text=Pendiente de enviar".to_string()
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn secondary_trigger_loads_target() {
        let session = FakeSession::new();
        let anchor = Selector::css("a#menuDocPendiente");
        let search = target().secondary_trigger.expect("secondary");
        session.add_frame(
            container()
                .with_element(anchor, 1)
                .with_element(search.clone(), 1),
        );
        session.reveal_on_click(&search, grid_frame());

        let resolver = NavigationResolver::new(settings());
        let reached = resolver
            .reach(&session, &target(), 0, Duration::from_secs(1))
            .await
            .expect("reached");
        assert_eq!(reached.attempts, 1);
        assert!(session.clicks().contains(&search.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn grace_extension_waits_for_slow_target() {
        let session = FakeSession::new();
        let anchor = Selector::css("a#menuDocPendiente");
        session.add_frame(container().with_element(anchor.clone(), 1));
        session.add_frame(
            FakeFrame::new(None, "https://portal/loading")
                .with_element(Selector::css("div.cargando"), 1),
        );
        // Appears after the first poll window but inside the grace extension.
        session.reveal_after(Duration::from_millis(2_800), grid_frame());

        let observer = Arc::new(CountingObserver::default());
        let resolver = NavigationResolver::new(settings()).with_observer(observer.clone());
        let reached = resolver
            .reach(&session, &target(), 0, Duration::from_secs(1))
            .await
            .expect("reached after grace");
        assert_eq!(reached.attempts, 1);
        assert_eq!(observer.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn related_page_that_never_loads_fails_attempt() {
        let session = FakeSession::new();
        let anchor = Selector::css("a#menuDocPendiente");
        session.add_frame(container().with_element(anchor, 1));
        session.add_frame(
            FakeFrame::new(None, "https://portal/loading")
                .with_element(Selector::css("div.cargando"), 1),
        );

        let resolver = NavigationResolver::new(settings());
        let err = resolver
            .reach(&session, &target(), 0, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.last_failure, AttemptFailure::RelatedNotLoaded);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_budget_with_exactly_max_retries_plus_one_attempts() {
        let session = FakeSession::new();
        let anchor = Selector::css("a#menuDocPendiente");
        session.add_frame(container().with_element(anchor.clone(), 1));

        let observer = Arc::new(CountingObserver::default());
        let resolver = NavigationResolver::new(settings()).with_observer(observer.clone());
        let err = resolver
            .reach(&session, &target(), 2, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(err.target, "pending_documents");
        assert_eq!(err.last_failure, AttemptFailure::TargetMissing);
        assert_eq!(observer.failures(), 3);
        assert_eq!(observer.successes(), 0);
        let anchor_clicks = session
            .clicks()
            .iter()
            .filter(|click| **click == anchor.to_string())
            .count();
        assert_eq!(anchor_clicks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_container_fails_each_attempt() {
        let session = FakeSession::new();
        session.add_frame(FakeFrame::new(Some("principal"), "about:blank"));

        let resolver = NavigationResolver::new(settings());
        let started = Instant::now();
        let err = resolver
            .reach(&session, &target(), 1, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 2);
        assert!(matches!(err.last_failure, AttemptFailure::ContainerMissing { .. }));
        assert!(session.clicks().is_empty());
        // Two container deadlines plus one retry delay, nothing unbounded.
        assert!(started.elapsed() <= Duration::from_millis(2 * 2_000 + 300 + 100));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_frame_lookups_fail_attempts_instead_of_hanging() {
        let session = FakeSession::new();
        session.add_frame(container());
        session.stall_lookups();

        let resolver = NavigationResolver::new(settings());
        let started = Instant::now();
        let err = resolver
            .reach(&session, &target(), 1, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 2);
        assert!(matches!(err.last_failure, AttemptFailure::ContainerMissing { .. }));
        assert!(started.elapsed() <= Duration::from_millis(2 * 2_000 + 300));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_trigger_is_a_failed_strategy() {
        let session = FakeSession::new();
        let anchor = Selector::css("a#menuDocPendiente");
        session.add_frame(
            container()
                .with_element(anchor.clone(), 1)
                .stalling(anchor),
        );

        let resolver = NavigationResolver::new(settings());
        let started = Instant::now();
        let err = resolver
            .reach(&session, &target(), 0, Duration::from_secs(1))
            .await
            .unwrap_err();

        match err.last_failure {
            AttemptFailure::NoTriggerSucceeded { diagnostics } => {
                assert!(diagnostics[0].contains("timed out"), "{diagnostics:?}");
            }
            other => panic!("unexpected failure {other:?}"),
        }
        assert!(started.elapsed() <= Duration::from_millis(500));
        assert!(session.clicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_clickable_trigger_reports_each_strategy() {
        let session = FakeSession::new();
        session.add_frame(container());

        let resolver = NavigationResolver::new(settings());
        let err = resolver
            .reach(&session, &target(), 0, Duration::from_secs(1))
            .await
            .unwrap_err();
        match err.last_failure {
            AttemptFailure::NoTriggerSucceeded { diagnostics } => {
                assert_eq!(diagnostics.len(), 3);
                assert!(diagnostics[0].starts_with("direct_anchor"));
                assert!(diagnostics[2].starts_with("lateral_menu"));
            }
            other => panic!("unexpected failure {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn capture_failures_do_not_mask_navigation_outcome() {
        let temp = tempfile::tempdir().expect("tempdir");
        let session = FakeSession::new();
        session.fail_screenshots();
        session.add_frame(container());

        let resolver = NavigationResolver::new(settings()).with_screenshots(temp.path());
        let err = resolver
            .reach(&session, &target(), 1, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(matches!(err.last_failure, AttemptFailure::NoTriggerSucceeded { .. }));
    }

    #[test]
    fn settings_validate_rejects_zero_poll_interval() {
        let settings = NavigationSettings {
            poll_interval_ms: 0,
            ..NavigationSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }
}
