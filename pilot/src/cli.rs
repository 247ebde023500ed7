//! Command-line surface for inspecting profiles, plans, and configuration.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::core::profile::ExecutionProfile;
use crate::core::strategy::Strategy;
use crate::io::config::{load_config, render_config, write_config};
use crate::io::repository::{DirectoryRepository, DocumentRepository};
use crate::planner::build_plan;

#[derive(Debug, Parser)]
#[command(
    name = "pilot",
    version,
    about = "Plan and review resilient portal automation runs"
)]
pub struct Cli {
    /// Path to the TOML config (missing file means defaults).
    #[arg(long, global = true, default_value = "pilot.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the execution profile inferred from a goal.
    Profile {
        goal: String,
    },
    /// Print the execution plan for a goal.
    Plan {
        goal: String,
        /// Explicit sub-goal (repeatable); skips goal splitting.
        #[arg(long = "sub-goal")]
        sub_goals: Vec<String>,
        /// Document directory laid out as `<dir>/<person_key>/<file>`.
        #[arg(long)]
        documents: Option<PathBuf>,
        /// Allowed strategy (repeatable); defaults to `planner.allowed_strategies`.
        #[arg(long = "strategy")]
        strategies: Vec<Strategy>,
    },
    /// Print the effective config, or write it to a file.
    Config {
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("serialize json")
}

/// Execute `cli` and return what should be printed to stdout.
pub fn execute(cli: &Cli) -> Result<String> {
    let config = load_config(&cli.config)?;
    match &cli.command {
        Command::Profile { goal } => to_json(&ExecutionProfile::from_goal_text(goal)),
        Command::Plan {
            goal,
            sub_goals,
            documents,
            strategies,
        } => {
            let profile = ExecutionProfile::from_goal_text(goal);
            let allowed: BTreeSet<Strategy> = if strategies.is_empty() {
                config.planner.allowed_strategies.clone()
            } else {
                strategies.iter().copied().collect()
            };
            let repository = documents.as_ref().map(DirectoryRepository::new);
            let plan = build_plan(
                goal,
                sub_goals,
                &profile,
                &allowed,
                repository.as_ref().map(|repo| repo as &dyn DocumentRepository),
            );
            to_json(&plan)
        }
        Command::Config { write } => match write {
            Some(path) => {
                write_config(path, &config)?;
                Ok(format!("wrote {}", path.display()))
            }
            None => render_config(&config),
        },
    }
}
