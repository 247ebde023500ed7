//! Run artifacts written for operator review.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{ExecutionPlan, OutcomeJudgeReport, RunTrace};

/// Write `value` as pretty JSON with a trailing newline, creating parent dirs.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))?;
    debug!(path = %path.display(), "artifact written");
    Ok(())
}

/// Paths of the artifacts produced for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifacts {
    pub plan: PathBuf,
    pub trace: PathBuf,
    pub report: PathBuf,
}

impl RunArtifacts {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            plan: dir.join("plan.json"),
            trace: dir.join("trace.json"),
            report: dir.join("report.json"),
        }
    }

    /// Write `plan.json`, `trace.json`, and `report.json` under `dir`.
    pub fn write(
        dir: &Path,
        plan: &ExecutionPlan,
        trace: &RunTrace,
        report: &OutcomeJudgeReport,
    ) -> Result<Self> {
        let artifacts = Self::in_dir(dir);
        write_json(&artifacts.plan, plan)?;
        write_json(&artifacts.trace, trace)?;
        write_json(&artifacts.report, report)?;
        Ok(artifacts)
    }
}
