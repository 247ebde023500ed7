//! Pilot configuration stored as TOML (default `pilot.toml`).

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::retry::RetryPolicy;
use crate::core::strategy::Strategy;
use crate::navigation::NavigationSettings;
use crate::navigation::target::UiTarget;

/// Pilot configuration (TOML).
///
/// Intended to be edited by humans. Missing tables and fields fall back to
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PilotConfig {
    pub retry: RetryPolicy,
    pub navigation: NavigationSettings,
    pub judge: JudgeConfig,
    pub planner: PlannerConfig,
    /// Named UI targets, keyed by target name.
    pub targets: BTreeMap<String, UiTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JudgeConfig {
    /// Overall budget for the single oracle call.
    pub timeout_secs: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl JudgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Step budget per attempt when the profile sets no cap.
    pub default_max_steps: u32,
    pub allowed_strategies: BTreeSet<Strategy>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_max_steps: 8,
            allowed_strategies: Strategy::ALL.into_iter().collect(),
        }
    }
}

impl Default for PilotConfig {
    fn default() -> Self {
        let pending = UiTarget::pending_documents();
        Self {
            retry: RetryPolicy::default(),
            navigation: NavigationSettings::default(),
            judge: JudgeConfig::default(),
            planner: PlannerConfig::default(),
            targets: BTreeMap::from([(pending.name.clone(), pending)]),
        }
    }
}

impl PilotConfig {
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        self.navigation.validate()?;
        if self.judge.timeout_secs == 0 {
            return Err(anyhow!("judge.timeout_secs must be > 0"));
        }
        if self.planner.default_max_steps == 0 {
            return Err(anyhow!("planner.default_max_steps must be > 0"));
        }
        if self.planner.allowed_strategies.is_empty() {
            return Err(anyhow!("planner.allowed_strategies must be non-empty"));
        }
        for (key, target) in &self.targets {
            if key.trim().is_empty() {
                return Err(anyhow!("targets must not contain an empty name"));
            }
            target
                .validate()
                .with_context(|| format!("targets.{key}"))?;
            if target.name != *key {
                return Err(anyhow!(
                    "targets.{key}.name must match its key (found '{}')",
                    target.name
                ));
            }
        }
        Ok(())
    }

    /// Target named `name`.
    pub fn target(&self, name: &str) -> Result<&UiTarget> {
        self.targets.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.targets.keys().map(String::as_str).collect();
            anyhow!("unknown target '{name}' (known: {})", known.join(", "))
        })
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PilotConfig::default()`.
pub fn load_config(path: &Path) -> Result<PilotConfig> {
    if !path.exists() {
        let cfg = PilotConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PilotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PilotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Render config as TOML without writing it.
pub fn render_config(cfg: &PilotConfig) -> Result<String> {
    toml::to_string_pretty(cfg).context("serialize config toml")
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
