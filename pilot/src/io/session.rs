//! Browser session capability.
//!
//! The [`Session`], [`Frame`], and [`Locator`] traits decouple navigation from
//! the concrete browser driver. Every call is fallible and may stall; callers
//! in this crate await it through [`bounded`] and treat an error or an elapsed
//! limit as "not found" or "strategy failed", never propagating it raw. Tests
//! use the scripted fakes in `test_support`.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How to locate an element inside a frame.
///
/// Prefer `Css` for stable anchors; `Role` matches an accessible role whose
/// name matches a case-insensitive regex; `Text` matches visible text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Selector {
    Css { value: String },
    Role { role: String, name: String },
    Text { value: String },
}

impl Selector {
    pub fn css(value: impl Into<String>) -> Self {
        Selector::Css {
            value: value.into(),
        }
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Selector::Role {
            role: role.into(),
            name: name.into(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Selector::Text {
            value: value.into(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css { value } => write!(f, "css={value}"),
            Selector::Role { role, name } => write!(f, "role={role}|{name}"),
            Selector::Text { value } => write!(f, "text={value}"),
        }
    }
}

/// Element state awaited by [`Locator::wait_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Attached,
    Visible,
    Hidden,
}

/// Lazy handle to the elements matching a selector.
#[async_trait]
pub trait Locator: Send + Sync {
    async fn count(&self) -> Result<usize>;
    async fn click(&self, timeout: Duration) -> Result<()>;
    async fn wait_for(&self, state: ElementState, timeout: Duration) -> Result<()>;
    async fn is_visible(&self, timeout: Duration) -> Result<bool>;
}

/// A frame (or the top-level page) inside the session.
pub trait Frame: Send + Sync {
    fn name(&self) -> Option<String>;
    /// Current URL; empty while the frame has not loaded anything.
    fn url(&self) -> String;
    fn locator(&self, selector: &Selector) -> Box<dyn Locator>;
}

/// Shared, exclusively-owned handle to a browser session.
#[async_trait]
pub trait Session: Send + Sync {
    async fn named_frame(&self, name: &str) -> Result<Option<Arc<dyn Frame>>>;
    async fn frames(&self) -> Result<Vec<Arc<dyn Frame>>>;
    async fn screenshot(&self, path: &Path) -> Result<()>;
}

/// Await a session call for at most `limit`; running out of time is an error.
pub async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{what} timed out after {}ms", limit.as_millis())),
    }
}

/// True if the frame reports a URL other than a blank placeholder.
pub fn reports_url(frame: &dyn Frame) -> bool {
    let url = frame.url();
    let url = url.trim();
    !url.is_empty() && url != "about:blank"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_display_is_stable() {
        assert_eq!(Selector::css("#menu a").to_string(), "css=#menu a");
        assert_eq!(
            Selector::role("link", "(?i)pendiente").to_string(),
            "role=link|(?i)pendiente"
        );
        assert_eq!(Selector::text("Buscar").to_string(), "text=Buscar");
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_turns_a_stalled_call_into_an_error() {
        let stalled = std::future::pending::<Result<usize>>();
        let err = bounded(Duration::from_millis(250), "element count", stalled)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "element count timed out after 250ms");

        let ready = bounded(Duration::ZERO, "element count", async { Ok(3) }).await;
        assert_eq!(ready.expect("ready"), 3);
    }

    #[test]
    fn selector_serializes_with_by_tag() {
        let json = serde_json::to_value(Selector::role("button", "Buscar")).expect("serialize");
        assert_eq!(json["by"], "role");
        assert_eq!(json["name"], "Buscar");
    }
}
