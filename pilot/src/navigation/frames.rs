//! Target frame resolution.
//!
//! Resolution prefers the most specific signal: a stable frame name, then a
//! URL pattern, then URL keyword hints in order, then a structural marker. A
//! candidate only counts when it also exposes the target's content marker.
//! Every session query is bounded by the caller's deadline.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::core::budget::remaining_budget;
use crate::io::session::{Frame, Selector, Session, bounded};
use crate::navigation::target::UiTarget;

/// Which signal located the target frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum Resolution {
    NamedFrame { name: String },
    UrlPattern { pattern: String },
    UrlKeyword { keyword: String },
    StructuralMarker,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::NamedFrame { name } => write!(f, "named frame '{name}'"),
            Resolution::UrlPattern { pattern } => write!(f, "url pattern '{pattern}'"),
            Resolution::UrlKeyword { keyword } => write!(f, "url keyword '{keyword}'"),
            Resolution::StructuralMarker => f.write_str("structural marker"),
        }
    }
}

/// A frame that exposes the target's content marker.
#[derive(Clone)]
pub struct ResolvedFrame {
    pub frame: Arc<dyn Frame>,
    pub resolution: Resolution,
}

impl fmt::Debug for ResolvedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedFrame")
            .field("url", &self.frame.url())
            .field("resolution", &self.resolution)
            .finish()
    }
}

/// True if `selector` matches at least one element before `deadline`; query
/// errors and stalls count as absent.
pub(crate) async fn has_element(frame: &dyn Frame, selector: &Selector, deadline: Instant) -> bool {
    let locator = frame.locator(selector);
    match bounded(remaining_budget(deadline), "element count", locator.count()).await {
        Ok(count) => count > 0,
        Err(err) => {
            debug!(selector = %selector, error = %format!("{err:#}"), "element query failed");
            false
        }
    }
}

/// Locate the target frame once, without polling.
pub async fn resolve_target_frame(
    session: &dyn Session,
    target: &UiTarget,
    deadline: Instant,
) -> Option<ResolvedFrame> {
    if let Some(name) = &target.frame_name {
        let lookup = session.named_frame(name);
        match bounded(remaining_budget(deadline), "named frame lookup", lookup).await {
            Ok(Some(frame)) => {
                if has_element(frame.as_ref(), &target.content_marker, deadline).await {
                    return Some(ResolvedFrame {
                        frame,
                        resolution: Resolution::NamedFrame { name: name.clone() },
                    });
                }
            }
            Ok(None) => {}
            Err(err) => {
                debug!(
                    frame = %name,
                    error = %format!("{err:#}"),
                    "named frame lookup failed"
                );
            }
        }
    }

    let listing = bounded(remaining_budget(deadline), "frame listing", session.frames());
    let frames = match listing.await {
        Ok(frames) => frames,
        Err(err) => {
            debug!(error = %format!("{err:#}"), "frame listing failed");
            return None;
        }
    };

    if let Some(pattern) = &target.url_pattern {
        match Regex::new(pattern) {
            Ok(re) => {
                for frame in &frames {
                    if re.is_match(&frame.url())
                        && has_element(frame.as_ref(), &target.content_marker, deadline).await
                    {
                        return Some(ResolvedFrame {
                            frame: Arc::clone(frame),
                            resolution: Resolution::UrlPattern {
                                pattern: pattern.clone(),
                            },
                        });
                    }
                }
            }
            Err(err) => debug!(pattern = %pattern, error = %err, "invalid url pattern"),
        }
    }

    for keyword in &target.url_keywords {
        let keyword_lower = keyword.to_lowercase();
        for frame in &frames {
            if frame.url().to_lowercase().contains(&keyword_lower)
                && has_element(frame.as_ref(), &target.content_marker, deadline).await
            {
                return Some(ResolvedFrame {
                    frame: Arc::clone(frame),
                    resolution: Resolution::UrlKeyword {
                        keyword: keyword.clone(),
                    },
                });
            }
        }
    }

    if let Some(marker) = &target.structural_marker {
        for frame in &frames {
            if has_element(frame.as_ref(), marker, deadline).await
                && has_element(frame.as_ref(), &target.content_marker, deadline).await
            {
                return Some(ResolvedFrame {
                    frame: Arc::clone(frame),
                    resolution: Resolution::StructuralMarker,
                });
            }
        }
    }

    None
}

/// True if any frame shows a marker of a related page still loading the target.
pub async fn related_page_visible(
    session: &dyn Session,
    target: &UiTarget,
    deadline: Instant,
) -> bool {
    if target.related_markers.is_empty() {
        return false;
    }
    let listing = bounded(remaining_budget(deadline), "frame listing", session.frames());
    let frames = match listing.await {
        Ok(frames) => frames,
        Err(err) => {
            debug!(error = %format!("{err:#}"), "frame listing failed");
            return false;
        }
    };
    for frame in &frames {
        for marker in &target.related_markers {
            if has_element(frame.as_ref(), marker, deadline).await {
                debug!(marker = %marker, url = %frame.url(), "related marker present");
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::{FakeFrame, FakeSession};

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(1)
    }

    fn target() -> UiTarget {
        UiTarget::pending_documents()
    }

    fn grid() -> Selector {
        target().content_marker
    }

    #[tokio::test]
    async fn named_frame_wins_over_weaker_signals() {
        let session = FakeSession::new();
        session.add_frame(
            FakeFrame::new(None, "https://portal/docs/pendiente").with_element(grid(), 1),
        );
        session.add_frame(
            FakeFrame::new(Some("contenido"), "https://portal/x").with_element(grid(), 1),
        );

        let resolved = resolve_target_frame(&session, &target(), soon())
            .await
            .expect("resolved");
        assert_eq!(
            resolved.resolution,
            Resolution::NamedFrame {
                name: "contenido".to_string()
            }
        );
    }

    #[tokio::test]
    async fn url_match_without_content_marker_is_not_found() {
        let session = FakeSession::new();
        session.add_frame(FakeFrame::new(None, "https://portal/documentacion/pendiente"));
        session.add_frame(FakeFrame::new(Some("contenido"), "https://portal/x"));

        let resolved = resolve_target_frame(&session, &target(), soon()).await;
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn url_pattern_precedes_keywords() {
        let session = FakeSession::new();
        session.add_frame(FakeFrame::new(None, "https://portal/docs/list").with_element(grid(), 1));
        session.add_frame(
            FakeFrame::new(None, "https://portal/doc/pendiente?id=4").with_element(grid(), 1),
        );

        let resolved = resolve_target_frame(&session, &target(), soon())
            .await
            .expect("resolved");
        assert!(matches!(resolved.resolution, Resolution::UrlPattern { .. }));
        assert_eq!(resolved.frame.url(), "https://portal/doc/pendiente?id=4");
    }

    #[tokio::test]
    async fn keywords_are_tried_in_order() {
        let session = FakeSession::new();
        session.add_frame(FakeFrame::new(None, "https://portal/docs/list").with_element(grid(), 1));

        let resolved = resolve_target_frame(&session, &target(), soon())
            .await
            .expect("resolved");
        assert_eq!(
            resolved.resolution,
            Resolution::UrlKeyword {
                keyword: "docs".to_string()
            }
        );
    }

    #[tokio::test]
    async fn structural_marker_is_the_last_resort() {
        let session = FakeSession::new();
        session.add_frame(
            FakeFrame::new(None, "https://portal/frame3")
                .with_element(Selector::css("form#filtroDocumentacion"), 1)
                .with_element(grid(), 1),
        );

        let resolved = resolve_target_frame(&session, &target(), soon())
            .await
            .expect("resolved");
        assert_eq!(resolved.resolution, Resolution::StructuralMarker);
    }

    #[tokio::test]
    async fn query_errors_count_as_absent() {
        let session = FakeSession::new();
        session.add_frame(
            FakeFrame::new(Some("contenido"), "https://portal/doc/pendiente").failing(grid()),
        );
        let resolved = resolve_target_frame(&session, &target(), soon()).await;
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn related_markers_are_detected_in_any_frame() {
        let session = FakeSession::new();
        session.add_frame(FakeFrame::new(Some("principal"), "https://portal/home"));
        assert!(!related_page_visible(&session, &target(), soon()).await);
        session.add_frame(
            FakeFrame::new(None, "https://portal/loading")
                .with_element(Selector::css("div.cargando"), 1),
        );
        assert!(related_page_visible(&session, &target(), soon()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_queries_count_as_absent_once_the_deadline_passes() {
        let session = FakeSession::new();
        session.add_frame(
            FakeFrame::new(Some("contenido"), "https://portal/doc/pendiente").stalling(grid()),
        );
        let started = Instant::now();
        let resolved = resolve_target_frame(&session, &target(), soon()).await;
        assert!(resolved.is_none());
        assert!(started.elapsed() <= Duration::from_secs(1));

        session.stall_lookups();
        assert!(!related_page_visible(&session, &target(), soon()).await);
    }
}
