//! Keyword classification of sub-goals into execution strategies.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::keywords::{KeywordCategory, KeywordTables};
use crate::core::types::ActionKind;

/// Content source / surface a sub-goal is executed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Wikipedia,
    Images,
    Cae,
    Other,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Wikipedia,
        Strategy::Images,
        Strategy::Cae,
        Strategy::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Wikipedia => "wikipedia",
            Strategy::Images => "images",
            Strategy::Cae => "cae",
            Strategy::Other => "other",
        }
    }

    /// Actions a sub-goal of this strategy performs by default.
    pub fn default_actions(self) -> Vec<ActionKind> {
        match self {
            Strategy::Wikipedia => vec![ActionKind::Search, ActionKind::ReadContent],
            Strategy::Images => vec![ActionKind::Search, ActionKind::CollectImages],
            Strategy::Cae => vec![ActionKind::Navigate, ActionKind::ReachTarget],
            Strategy::Other => vec![ActionKind::Answer],
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "wikipedia" => Ok(Strategy::Wikipedia),
            "images" => Ok(Strategy::Images),
            "cae" => Ok(Strategy::Cae),
            "other" => Ok(Strategy::Other),
            other => Err(anyhow::anyhow!("unknown strategy '{other}'")),
        }
    }
}

/// Infer the primary strategy of `text` without restrictions.
///
/// Priority: portal work, then images, then Wikipedia.
pub fn infer_strategy(text: &str) -> Strategy {
    let tables = KeywordTables::global();
    if tables.matches(KeywordCategory::Cae, text) {
        Strategy::Cae
    } else if tables.matches(KeywordCategory::Images, text) {
        Strategy::Images
    } else if tables.matches(KeywordCategory::Wikipedia, text) {
        Strategy::Wikipedia
    } else {
        Strategy::Other
    }
}

/// Infer the strategy of `text`, falling back to `Other` when not allowed.
pub fn classify(text: &str, allowed: &BTreeSet<Strategy>) -> Strategy {
    let inferred = infer_strategy(text);
    if inferred == Strategy::Other || allowed.contains(&inferred) {
        inferred
    } else {
        Strategy::Other
    }
}
