//! Document repository capability.
//!
//! The repository answers "which files exist for this person and document
//! type" with bare file names only; storage layout never leaves this module.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

/// Read-mostly source of candidate upload files.
pub trait DocumentRepository: Send + Sync {
    /// Bare file names for `person_key`, filtered by `document_type_hint`.
    ///
    /// Returns an empty list when nothing matches; never fails.
    fn resolve_candidate_files(
        &self,
        person_key: &str,
        document_type_hint: Option<&str>,
    ) -> Vec<String>;
}

/// Lowercase, fold Spanish accents, and join whitespace runs with `_`.
pub fn normalize_key(raw: &str) -> String {
    let folded: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|ch| match ch {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join("_")
}

/// True if `key` names a single directory entry: no separators, no `.`/`..`.
fn is_plain_component(key: &str) -> bool {
    if key.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(key).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Repository backed by `<root>/<person_key>/<file>` on disk.
///
/// Person keys that could leave `root` resolve to nothing.
#[derive(Debug, Clone)]
pub struct DirectoryRepository {
    root: PathBuf,
}

impl DirectoryRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn list_files(&self, dir: &Path) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl DocumentRepository for DirectoryRepository {
    fn resolve_candidate_files(
        &self,
        person_key: &str,
        document_type_hint: Option<&str>,
    ) -> Vec<String> {
        let person_key = normalize_key(person_key);
        if !is_plain_component(&person_key) {
            if !person_key.is_empty() {
                warn!(person_key, "rejected person key outside the document root");
            }
            return Vec::new();
        }
        let dir = self.root.join(&person_key);
        if !dir.is_dir() {
            debug!(person_key, "no document directory for person");
            return Vec::new();
        }
        let names = match self.list_files(&dir) {
            Ok(names) => names,
            Err(err) => {
                warn!(person_key, error = %err, "failed to list documents");
                return Vec::new();
            }
        };

        let hint = document_type_hint.map(normalize_key).filter(|h| !h.is_empty());
        names
            .into_iter()
            .filter(|name| match &hint {
                Some(hint) => {
                    let stem = Path::new(name)
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .unwrap_or(name);
                    normalize_key(stem).contains(hint.as_str())
                }
                None => true,
            })
            .collect()
    }
}
