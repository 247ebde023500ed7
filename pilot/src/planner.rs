//! Goal decomposition into an ordered, typed execution plan.
//!
//! The planner is pure apart from read-only repository lookups: it never
//! executes anything, and it never fails. Missing inputs degrade to a smaller
//! plan (no repository means no candidate files) rather than an error.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument};

use crate::core::keywords::{KeywordCategory, KeywordTables};
use crate::core::profile::ExecutionProfile;
use crate::core::strategy::{Strategy, classify};
use crate::core::types::{ActionKind, ExecutionPlan, PlannedSubGoal};
use crate::io::repository::{DocumentRepository, normalize_key};

static GOAL_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\n|;|\b(?:y\s+luego|y\s+despu[eé]s|and\s+then|then)\b|(?:^|\s)\d{1,2}[.)]\s",
    )
    .expect("goal separator regex should be valid")
});

static PERSON_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:del\s+trabajador|de\s+la\s+trabajadora|de|for|of)\s+(\p{Lu}[\p{L}'-]+(?:\s+\p{Lu}[\p{L}'-]+)*)",
    )
    .expect("person name regex should be valid")
});

/// Upload intent detected in a sub-goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadIntent {
    /// Normalised person key, when a name could be extracted.
    pub person_key: Option<String>,
    pub document_type: Option<String>,
}

/// Split free-text `goal` into sub-goal texts.
///
/// Splits on newlines, `;`, numbered-list markers, and sequencing connectors.
/// Falls back to the whole (trimmed) goal when no fragment survives.
pub fn split_goal(goal: &str) -> Vec<String> {
    let parts: Vec<String> = GOAL_SEPARATOR
        .split(goal)
        .map(|part| part.trim_matches(|ch: char| ch.is_whitespace() || ch == ',' || ch == '.'))
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();
    if parts.is_empty() {
        vec![goal.trim().to_string()]
    } else {
        parts
    }
}

/// Capitalised name after `de`, `del trabajador`, `for`, or `of`, normalised.
///
/// Candidates that are really document types ("certificado de Formación")
/// are skipped.
pub fn extract_person_key(text: &str) -> Option<String> {
    let tables = KeywordTables::global();
    PERSON_NAME
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str())
        .find(|name| {
            tables.document_type(name).is_none()
                && !tables.matches(KeywordCategory::DocumentNoun, name)
        })
        .map(normalize_key)
}

/// Upload intent requires both an upload verb and a document noun.
pub fn detect_upload_intent(text: &str) -> Option<UploadIntent> {
    let tables = KeywordTables::global();
    if !(tables.matches(KeywordCategory::UploadVerb, text)
        && tables.matches(KeywordCategory::DocumentNoun, text))
    {
        return None;
    }
    Some(UploadIntent {
        person_key: extract_person_key(text),
        document_type: tables.document_type(text),
    })
}

/// Reduce repository entries to bare, de-duplicated file names in order.
fn bare_names(entries: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter_map(|entry| {
            entry
                .rsplit(['/', '\\'])
                .next()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        })
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Build the plan for `goal`.
///
/// `sub_goals` overrides splitting when it contains any non-blank entry. A
/// profile with `use_planner` off keeps the whole goal as one sub-goal.
/// Strategies are classified against `allowed`; `context_strategies` records
/// the strategies both `allowed` and the profile's content toggles permit.
#[instrument(skip_all, fields(mode = %profile.mode, explicit = sub_goals.len()))]
pub fn build_plan(
    goal: &str,
    sub_goals: &[String],
    profile: &ExecutionProfile,
    allowed: &BTreeSet<Strategy>,
    repository: Option<&dyn DocumentRepository>,
) -> ExecutionPlan {
    let context_strategies: BTreeSet<Strategy> = allowed
        .iter()
        .copied()
        .filter(|strategy| profile.permits(*strategy))
        .collect();

    let explicit: Vec<String> = sub_goals
        .iter()
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect();
    let texts = if !explicit.is_empty() {
        explicit
    } else if profile.features.use_planner {
        split_goal(goal)
    } else {
        vec![goal.trim().to_string()]
    };

    let total = texts.len();
    let planned: Vec<PlannedSubGoal> = texts
        .into_iter()
        .enumerate()
        .map(|(position, text)| {
            let index = u32::try_from(position + 1).unwrap_or(u32::MAX);
            plan_sub_goal(
                goal,
                index,
                position + 1 == total,
                text,
                profile,
                allowed,
                repository,
            )
        })
        .collect();

    info!(sub_goals = planned.len(), "plan built");
    ExecutionPlan {
        goal: goal.to_string(),
        execution_profile: profile.clone(),
        context_strategies,
        sub_goals: planned,
    }
}

fn plan_sub_goal(
    goal: &str,
    index: u32,
    is_last: bool,
    text: String,
    profile: &ExecutionProfile,
    allowed: &BTreeSet<Strategy>,
    repository: Option<&dyn DocumentRepository>,
) -> PlannedSubGoal {
    let strategy = classify(&text, allowed);
    let mut expected_actions = strategy.default_actions();
    let mut documents_needed = Vec::new();

    if let (Some(intent), Some(repository)) = (detect_upload_intent(&text), repository) {
        // The person is often named once in the goal and omitted in later sub-goals.
        let person_key = intent.person_key.or_else(|| extract_person_key(goal));
        if let Some(person_key) = &person_key {
            documents_needed = bare_names(
                repository.resolve_candidate_files(person_key, intent.document_type.as_deref()),
            );
        }
        for action in [ActionKind::UploadFile, ActionKind::VerifyUpload] {
            if !expected_actions.contains(&action) {
                expected_actions.push(action);
            }
        }
        debug!(
            index,
            person_key = ?person_key,
            document_type = ?intent.document_type,
            candidates = documents_needed.len(),
            "upload intent"
        );
    }

    PlannedSubGoal {
        index,
        sub_goal: text,
        strategy,
        expected_actions,
        documents_needed,
        may_retry: !(profile.stop_on_first_success && !is_last),
    }
}
