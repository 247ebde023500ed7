//! Shared deterministic types for plans, evidence, traces, and judge reports.
//!
//! These types are the stable contracts between the planner, the execution
//! loop, and the outcome judge. Field names are part of the serialized JSON
//! contract consumed by review tooling and must not be renamed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::profile::{ExecutionMode, ExecutionProfile};
use crate::core::strategy::Strategy;

/// Kind of action a sub-goal is expected to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Search,
    ReadContent,
    CollectImages,
    Navigate,
    ReachTarget,
    UploadFile,
    VerifyUpload,
    Answer,
}

/// Outcome tag reported after an upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Success,
    NotConfirmed,
    NoInputFound,
    ErrorDetected,
    NoFile,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Success => "success",
            UploadStatus::NotConfirmed => "not_confirmed",
            UploadStatus::NoInputFound => "no_input_found",
            UploadStatus::ErrorDetected => "error_detected",
            UploadStatus::NoFile => "no_file",
        }
    }
}

/// Outcome tag reported after verifying a side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Confirmed,
    NotConfirmed,
    ErrorDetected,
    NotApplicable,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Confirmed => "confirmed",
            VerificationStatus::NotConfirmed => "not_confirmed",
            VerificationStatus::ErrorDetected => "error_detected",
            VerificationStatus::NotApplicable => "not_applicable",
        }
    }
}

/// Structured evidence produced after each attempt.
///
/// This is the only input retry decisions look at; free text never is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeEvidence {
    pub upload_status: Option<UploadStatus>,
    pub verification_status: Option<VerificationStatus>,
}

/// One planned unit of the decomposed goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSubGoal {
    /// 1-based position within the plan.
    pub index: u32,
    pub sub_goal: String,
    pub strategy: Strategy,
    pub expected_actions: Vec<ActionKind>,
    /// Bare file names only.
    pub documents_needed: Vec<String>,
    pub may_retry: bool,
}

impl PlannedSubGoal {
    pub fn expects(&self, action: ActionKind) -> bool {
        self.expected_actions.contains(&action)
    }
}

/// Ordered plan for one goal run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub goal: String,
    pub execution_profile: ExecutionProfile,
    pub context_strategies: BTreeSet<Strategy>,
    pub sub_goals: Vec<PlannedSubGoal>,
}

impl ExecutionPlan {
    pub fn contains_index(&self, index: u32) -> bool {
        self.sub_goals.iter().any(|sub_goal| sub_goal.index == index)
    }

    pub fn position_of(&self, index: u32) -> Option<usize> {
        self.sub_goals
            .iter()
            .position(|sub_goal| sub_goal.index == index)
    }
}

/// Final status of one sub-goal in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

/// Structured reason a sub-goal did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Navigation retries were exhausted before the target state appeared.
    TargetNotReached { target: String, attempts: u32 },
    /// Attempts ran out while the evidence still asked for another try.
    AttemptsExhausted {
        attempts: u32,
        evidence: OutcomeEvidence,
    },
    /// The attempt reported completion below the profile's confidence threshold.
    LowConfidence { confidence: f64, threshold: f64 },
    /// The sub-goal runner returned an error.
    ExecutionError { message: String },
    /// The profile disallows the sub-goal's content type.
    DisallowedByProfile { strategy: Strategy },
}

/// Result recorded for one planned sub-goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub sub_goal_index: u32,
    pub sub_goal: String,
    pub strategy: Strategy,
    pub status: StepStatus,
    pub attempts: u32,
    /// Evidence from every attempt, in order.
    pub evidence: Vec<OutcomeEvidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl StepResult {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Ordered trace of a goal run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTrace {
    pub steps: Vec<StepResult>,
    pub stopped_early: bool,
}

impl RunTrace {
    /// Answers of successful steps, joined in execution order.
    pub fn final_answer(&self) -> Option<String> {
        let answers: Vec<&str> = self
            .steps
            .iter()
            .filter(|step| step.succeeded())
            .filter_map(|step| step.answer.as_deref())
            .map(str::trim)
            .filter(|answer| !answer.is_empty())
            .collect();
        if answers.is_empty() {
            None
        } else {
            Some(answers.join("\n"))
        }
    }
}

/// Run-level review produced by the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalReview {
    pub overall_success: bool,
    pub global_score: f64,
    #[serde(default)]
    pub main_issues: Vec<String>,
    #[serde(default)]
    pub main_strengths: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Review of a single planned sub-goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubGoalReview {
    pub sub_goal_index: u32,
    pub success: bool,
    pub score: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
}

/// Structured post-hoc report for a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeJudgeReport {
    pub goal: String,
    pub execution_profile_name: ExecutionMode,
    pub context_strategies: BTreeSet<Strategy>,
    pub global_review: Option<GlobalReview>,
    pub sub_goals: Vec<SubGoalReview>,
    pub next_run_profile_suggestion: Option<ExecutionMode>,
    pub next_run_notes: Option<String>,
    pub llm_raw_notes: Option<String>,
}

impl OutcomeJudgeReport {
    /// Report with no review content, scoped to `plan`.
    pub fn minimal(plan: &ExecutionPlan, notes: impl Into<String>) -> Self {
        Self {
            goal: plan.goal.clone(),
            execution_profile_name: plan.execution_profile.mode,
            context_strategies: plan.context_strategies.clone(),
            global_review: None,
            sub_goals: Vec::new(),
            next_run_profile_suggestion: None,
            next_run_notes: None,
            llm_raw_notes: Some(notes.into()),
        }
    }

    /// Profile suggested for the next run, if the judge proposed one.
    pub fn next_profile(&self) -> Option<ExecutionProfile> {
        self.next_run_profile_suggestion
            .map(ExecutionProfile::for_mode)
    }

    /// Profile for the run after `current`.
    ///
    /// The suggested preset applies only when `current` accepts run feedback;
    /// feature toggles always carry over from `current`.
    pub fn next_profile_for(&self, current: &ExecutionProfile) -> ExecutionProfile {
        match self.next_profile() {
            Some(mut next) if current.features.use_run_feedback => {
                next.features = current.features;
                next
            }
            _ => current.clone(),
        }
    }
}
