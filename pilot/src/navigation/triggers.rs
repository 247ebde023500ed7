//! Strategy cascade that triggers the transition toward a target.
//!
//! Each strategy reports an [`Attempted`] result instead of an error; the
//! resolver walks the cascade in order and stops at the first success.

use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tracing::debug;

use crate::io::session::{Frame, Selector, bounded};
use crate::navigation::target::UiTarget;

/// Outcome of one trigger strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted {
    pub success: bool,
    pub diagnostic: Option<String>,
}

impl Attempted {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            diagnostic: None,
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostic: Some(diagnostic.into()),
        }
    }

    fn from_click(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::succeeded(),
            Err(err) => Self::failed(format!("{err:#}")),
        }
    }
}

/// Inputs shared by every strategy in one attempt.
pub struct TriggerContext<'a> {
    pub container: &'a dyn Frame,
    pub click_timeout: Duration,
}

/// One way of triggering the transition toward the target.
#[async_trait]
pub trait TriggerStrategy: Send + Sync {
    fn label(&self) -> &str;
    async fn try_trigger(&self, ctx: &TriggerContext<'_>) -> Attempted;
}

/// Click the first element matching `selector` in `frame`.
///
/// The lookup and the click are each bounded by `timeout`, whether or not the
/// driver honours the timeout it is handed.
pub(crate) async fn click_first(
    frame: &dyn Frame,
    selector: &Selector,
    timeout: Duration,
) -> Result<()> {
    let locator = frame.locator(selector);
    if bounded(timeout, "element count", locator.count()).await? == 0 {
        bail!("no element matches {selector}");
    }
    bounded(timeout, "click", locator.click(timeout)).await
}

/// Direct handle to a known anchor or control.
pub struct DirectAnchor {
    pub selector: Selector,
}

#[async_trait]
impl TriggerStrategy for DirectAnchor {
    fn label(&self) -> &str {
        "direct_anchor"
    }

    async fn try_trigger(&self, ctx: &TriggerContext<'_>) -> Attempted {
        Attempted::from_click(click_first(ctx.container, &self.selector, ctx.click_timeout).await)
    }
}

/// The same control located by role and a fuzzy name pattern.
pub struct RoleTextMatch {
    pub role: String,
    pub name_pattern: String,
}

#[async_trait]
impl TriggerStrategy for RoleTextMatch {
    fn label(&self) -> &str {
        "role_text_match"
    }

    async fn try_trigger(&self, ctx: &TriggerContext<'_>) -> Attempted {
        let selector = Selector::role(&self.role, &self.name_pattern);
        Attempted::from_click(click_first(ctx.container, &selector, ctx.click_timeout).await)
    }
}

/// Open a menu section, then click the first clickable candidate sub-label.
pub struct LateralMenu {
    pub section: String,
    pub candidates: Vec<String>,
}

#[async_trait]
impl TriggerStrategy for LateralMenu {
    fn label(&self) -> &str {
        "lateral_menu"
    }

    async fn try_trigger(&self, ctx: &TriggerContext<'_>) -> Attempted {
        let section = Selector::text(&self.section);
        if let Err(err) = click_first(ctx.container, &section, ctx.click_timeout).await {
            return Attempted::failed(format!("section '{}': {err:#}", self.section));
        }

        let mut failures = Vec::with_capacity(self.candidates.len());
        for candidate in &self.candidates {
            let selector = Selector::text(candidate);
            match click_first(ctx.container, &selector, ctx.click_timeout).await {
                Ok(()) => {
                    debug!(
                        section = %self.section,
                        candidate = %candidate,
                        "menu candidate clicked"
                    );
                    return Attempted::succeeded();
                }
                Err(err) => failures.push(format!("'{candidate}': {err:#}")),
            }
        }
        Attempted::failed(format!(
            "no candidate under '{}' was clickable ({})",
            self.section,
            failures.join("; ")
        ))
    }
}

/// Ordered cascade for `target`: anchor, role match, then lateral menu.
pub fn cascade_for(target: &UiTarget) -> Vec<Box<dyn TriggerStrategy>> {
    let mut cascade: Vec<Box<dyn TriggerStrategy>> = Vec::new();
    if let Some(anchor) = &target.anchor {
        cascade.push(Box::new(DirectAnchor {
            selector: anchor.clone(),
        }));
    }
    if let Some(role_match) = &target.role_match {
        cascade.push(Box::new(RoleTextMatch {
            role: role_match.role.clone(),
            name_pattern: role_match.name_pattern.clone(),
        }));
    }
    if let Some(menu) = &target.menu {
        cascade.push(Box::new(LateralMenu {
            section: menu.section.clone(),
            candidates: menu.candidates.clone(),
        }));
    }
    cascade
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeFrame, FakeSession};

    const CLICK: Duration = Duration::from_secs(1);

    #[test]
    fn cascade_order_follows_specificity() {
        let labels: Vec<String> = cascade_for(&UiTarget::pending_documents())
            .iter()
            .map(|strategy| strategy.label().to_string())
            .collect();
        assert_eq!(
            labels,
            vec!["direct_anchor", "role_text_match", "lateral_menu"]
        );
    }

    #[tokio::test]
    async fn direct_anchor_fails_without_matching_element() {
        let session = FakeSession::new();
        let container =
            session.add_frame(FakeFrame::new(Some("principal"), "https://portal/home"));
        let ctx = TriggerContext {
            container: container.as_ref(),
            click_timeout: CLICK,
        };
        let attempted = DirectAnchor {
            selector: Selector::css("a#missing"),
        }
        .try_trigger(&ctx)
        .await;
        assert!(!attempted.success);
        assert!(attempted.diagnostic.expect("diagnostic").contains("a#missing"));
    }

    #[tokio::test]
    async fn lateral_menu_tries_candidates_in_order() {
        let session = FakeSession::new();
        let container = session.add_frame(
            FakeFrame::new(Some("principal"), "https://portal/home")
                .with_element(Selector::text("Documentación"), 1)
                .with_element(Selector::text("Enviar documentación"), 1),
        );
        let ctx = TriggerContext {
            container: container.as_ref(),
            click_timeout: CLICK,
        };
        let menu = LateralMenu {
            section: "Documentación".to_string(),
            candidates: vec![
                "Documentación pendiente".to_string(),
                "Enviar documentación".to_string(),
            ],
        };

        let attempted = menu.try_trigger(&ctx).await;
        assert!(attempted.success);
        assert_eq!(
            session.clicks(),
            vec![
                "text=Documentación".to_string(),
                "text=Enviar documentación".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn lateral_menu_fails_when_section_missing() {
        let session = FakeSession::new();
        let container =
            session.add_frame(FakeFrame::new(Some("principal"), "https://portal/home"));
        let ctx = TriggerContext {
            container: container.as_ref(),
            click_timeout: CLICK,
        };
        let attempted = LateralMenu {
            section: "Documentación".to_string(),
            candidates: vec!["Pendiente".to_string()],
        }
        .try_trigger(&ctx)
        .await;
        assert!(!attempted.success);
        assert!(session.clicks().is_empty());
    }
}
