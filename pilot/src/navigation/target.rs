//! Named UI target states and the signals used to recognise them.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::session::Selector;

/// Lateral menu route: a section label, then candidate sub-labels in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuRoute {
    pub section: String,
    pub candidates: Vec<String>,
}

/// Role plus fuzzy (regex) accessible-name pattern for the trigger control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMatch {
    pub role: String,
    pub name_pattern: String,
}

/// Externally-defined screen the resolver must reach and validate.
///
/// Frame resolution signals are listed from most to least specific:
/// `frame_name`, `url_pattern`, `url_keywords`, `structural_marker`. Every
/// level also requires `content_marker` inside the candidate frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiTarget {
    pub name: String,
    /// Frame that must exist (and report a URL) before triggering.
    pub container_frame: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_match: Option<RoleMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu: Option<MenuRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_name: Option<String>,
    /// Regex matched against frame URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,
    #[serde(default)]
    pub url_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structural_marker: Option<Selector>,
    pub content_marker: Selector,
    /// Search/refresh control tried once when the target does not appear.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_trigger: Option<Selector>,
    /// Markers of a related page that has not finished loading the target.
    #[serde(default)]
    pub related_markers: Vec<Selector>,
}

impl UiTarget {
    /// Pending-documents grid of the coordination portal.
    pub fn pending_documents() -> Self {
        Self {
            name: "pending_documents".to_string(),
            container_frame: "principal".to_string(),
            anchor: Some(Selector::css("a#menuDocPendiente")),
            role_match: Some(RoleMatch {
                role: "link".to_string(),
                name_pattern: r"(?i)documentaci[oó]n\s+pendiente".to_string(),
            }),
            menu: Some(MenuRoute {
                section: "Documentación".to_string(),
                candidates: vec![
                    "Documentación pendiente".to_string(),
                    "Pendiente de enviar".to_string(),
                    "Enviar documentación".to_string(),
                ],
            }),
            frame_name: Some("contenido".to_string()),
            url_pattern: Some(r"(?i)/doc(umentacion)?/pendiente".to_string()),
            url_keywords: vec![
                "pendiente".to_string(),
                "documentacion".to_string(),
                "docs".to_string(),
            ],
            structural_marker: Some(Selector::css("form#filtroDocumentacion")),
            content_marker: Selector::css("table.grid-documentos"),
            secondary_trigger: Some(Selector::role("button", r"(?i)buscar|actualizar")),
            related_markers: vec![
                Selector::css("div.cargando"),
                Selector::text("Documentación pendiente"),
            ],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("target name must be non-empty"));
        }
        if self.container_frame.trim().is_empty() {
            return Err(anyhow!(
                "target '{}' container_frame must be non-empty",
                self.name
            ));
        }
        if self.anchor.is_none() && self.role_match.is_none() && self.menu.is_none() {
            return Err(anyhow!(
                "target '{}' needs at least one trigger (anchor, role_match, or menu)",
                self.name
            ));
        }
        if let Some(menu) = &self.menu
            && menu.candidates.is_empty()
        {
            return Err(anyhow!(
                "target '{}' menu.candidates must be non-empty",
                self.name
            ));
        }
        if let Some(pattern) = &self.url_pattern {
            regex::Regex::new(pattern)
                .map_err(|err| anyhow!("target '{}' url_pattern invalid: {err}", self.name))?;
        }
        if let Some(role_match) = &self.role_match {
            regex::Regex::new(&role_match.name_pattern).map_err(|err| {
                anyhow!("target '{}' role_match.name_pattern invalid: {err}", self.name)
            })?;
        }
        Ok(())
    }
}
