//! Execution profiles controlling the depth and breadth of a goal run.
//!
//! A profile is constructed once per goal, either explicitly or inferred from
//! the goal text, and is read-only once execution starts.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::keywords::{KeywordCategory, KeywordTables};
use crate::core::strategy::{Strategy, infer_strategy};

/// Smallest accepted explicit step cap.
pub const MIN_STEP_CAP: u32 = 1;
/// Largest accepted explicit step cap.
pub const MAX_STEP_CAP: u32 = 20;

/// Named execution depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Fast,
    Balanced,
    Thorough,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Fast => "fast",
            ExecutionMode::Balanced => "balanced",
            ExecutionMode::Thorough => "thorough",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Toggles for auxiliary planning and learning subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    /// Decompose the goal into sub-goals before executing.
    pub use_planner: bool,
    /// Run the outcome judge after execution.
    pub use_outcome_judge: bool,
    /// Feed the previous judge report into the next run's profile.
    pub use_run_feedback: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            use_planner: true,
            use_outcome_judge: true,
            use_run_feedback: true,
        }
    }
}

/// Configuration bundle for one goal run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    pub mode: ExecutionMode,
    pub max_steps_per_subgoal: Option<u32>,
    pub allow_wikipedia: bool,
    pub allow_images: bool,
    pub stop_on_first_success: bool,
    pub confidence_threshold: Option<f64>,
    #[serde(default)]
    pub features: FeatureToggles,
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Balanced,
            max_steps_per_subgoal: None,
            allow_wikipedia: true,
            allow_images: true,
            stop_on_first_success: false,
            confidence_threshold: None,
            features: FeatureToggles::default(),
        }
    }
}

impl ExecutionProfile {
    pub fn fast() -> Self {
        Self {
            mode: ExecutionMode::Fast,
            max_steps_per_subgoal: Some(4),
            stop_on_first_success: true,
            ..Self::default()
        }
    }

    pub fn thorough() -> Self {
        Self {
            mode: ExecutionMode::Thorough,
            max_steps_per_subgoal: Some(12),
            stop_on_first_success: false,
            ..Self::default()
        }
    }

    /// Preset profile for `mode`.
    pub fn for_mode(mode: ExecutionMode) -> Self {
        match mode {
            ExecutionMode::Fast => Self::fast(),
            ExecutionMode::Balanced => Self::default(),
            ExecutionMode::Thorough => Self::thorough(),
        }
    }

    /// Infer a profile from keywords in the goal text.
    ///
    /// Scan order: fast keywords, thorough keywords (override fast), content
    /// source restrictions, then an explicit step count clamped to
    /// [`MIN_STEP_CAP`, `MAX_STEP_CAP`] that overrides the mode's cap.
    pub fn from_goal_text(goal: &str) -> Self {
        let tables = KeywordTables::global();
        let mut profile = Self::default();

        if tables.matches(KeywordCategory::Fast, goal) {
            profile = Self::fast();
        }
        if tables.matches(KeywordCategory::Thorough, goal) {
            profile = Self::thorough();
        }
        if tables.matches(KeywordCategory::OnlyWikipedia, goal) {
            profile.allow_images = false;
        }
        if tables.matches(KeywordCategory::OnlyImages, goal) {
            profile.allow_wikipedia = false;
        }
        if let Some(steps) = tables.step_cap(goal) {
            let clamped = steps.clamp(u64::from(MIN_STEP_CAP), u64::from(MAX_STEP_CAP));
            profile.max_steps_per_subgoal = Some(clamped as u32);
        }

        debug!(
            mode = %profile.mode,
            max_steps = ?profile.max_steps_per_subgoal,
            "inferred profile"
        );
        profile
    }

    /// Explicit step cap, or `fallback` when none is set.
    pub fn effective_max_steps(&self, fallback: u32) -> u32 {
        self.max_steps_per_subgoal.unwrap_or(fallback)
    }

    /// True if the profile disallows the primary content type of `sub_goal`.
    pub fn should_skip_goal(&self, sub_goal: &str) -> bool {
        match infer_strategy(sub_goal) {
            Strategy::Wikipedia => !self.allow_wikipedia,
            Strategy::Images => !self.allow_images,
            Strategy::Cae | Strategy::Other => false,
        }
    }

    /// Strategies the profile's content toggles permit.
    pub fn permits(&self, strategy: Strategy) -> bool {
        match strategy {
            Strategy::Wikipedia => self.allow_wikipedia,
            Strategy::Images => self.allow_images,
            Strategy::Cae | Strategy::Other => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_follow_mode_defaults() {
        let default = ExecutionProfile::default();
        assert_eq!(default.mode, ExecutionMode::Balanced);
        assert_eq!(default.max_steps_per_subgoal, None);
        assert!(default.allow_wikipedia && default.allow_images);
        assert!(!default.stop_on_first_success);

        let fast = ExecutionProfile::fast();
        assert_eq!(fast.max_steps_per_subgoal, Some(4));
        assert!(fast.stop_on_first_success);

        let thorough = ExecutionProfile::thorough();
        assert_eq!(thorough.max_steps_per_subgoal, Some(12));
        assert!(!thorough.stop_on_first_success);
    }

    #[test]
    fn goal_text_with_fast_wikipedia_and_step_cap() {
        let profile = ExecutionProfile::from_goal_text("rápido, solo Wikipedia, máx 3 pasos");
        assert_eq!(profile.mode, ExecutionMode::Fast);
        assert!(!profile.allow_images);
        assert!(profile.allow_wikipedia);
        assert_eq!(profile.max_steps_per_subgoal, Some(3));
    }

    #[test]
    fn goal_text_without_keywords_is_default() {
        let profile =
            ExecutionProfile::from_goal_text("Averigua quién diseñó el puente de Vizcaya");
        assert_eq!(profile, ExecutionProfile::default());
    }

    #[test]
    fn thorough_overrides_fast() {
        let profile = ExecutionProfile::from_goal_text("rápido pero exhaustivo");
        assert_eq!(profile.mode, ExecutionMode::Thorough);
        assert_eq!(profile.max_steps_per_subgoal, Some(12));
    }

    #[test]
    fn step_cap_is_clamped_and_overrides_mode() {
        let profile = ExecutionProfile::from_goal_text("exhaustivo, max 50 steps");
        assert_eq!(profile.max_steps_per_subgoal, Some(MAX_STEP_CAP));
        let profile = ExecutionProfile::from_goal_text("máx 0 pasos");
        assert_eq!(profile.max_steps_per_subgoal, Some(MIN_STEP_CAP));
        let profile =
            ExecutionProfile::from_goal_text("balanced run, max 99999999999999999999 steps");
        assert_eq!(profile.max_steps_per_subgoal, Some(MAX_STEP_CAP));
    }

    #[test]
    fn only_images_disables_wikipedia() {
        let profile = ExecutionProfile::from_goal_text("solo imágenes del Guggenheim");
        assert!(!profile.allow_wikipedia);
        assert!(profile.allow_images);
    }

    #[test]
    fn effective_max_steps_uses_fallback_without_cap() {
        assert_eq!(ExecutionProfile::default().effective_max_steps(8), 8);
        assert_eq!(ExecutionProfile::fast().effective_max_steps(8), 4);
    }

    #[test]
    fn should_skip_goal_follows_content_toggles() {
        let profile = ExecutionProfile::from_goal_text("solo wikipedia");
        assert!(profile.should_skip_goal("busca fotos de la catedral"));
        assert!(!profile.should_skip_goal("lee el artículo de Wikipedia"));
        assert!(!profile.should_skip_goal("sube el contrato al portal"));
    }
}
