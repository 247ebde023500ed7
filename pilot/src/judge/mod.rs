//! Post-hoc outcome judge.
//!
//! [`OutcomeJudge::build_report`] never fails. Every oracle, timeout, or schema
//! problem degrades to [`OutcomeJudgeReport::minimal`] with a note explaining
//! why the review is missing. Sub-goal reviews are scoped strictly to the plan:
//! indices that name no planned sub-goal (including ones no plan could hold)
//! are dropped, duplicates keep their first entry, and the survivors follow
//! plan order.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use jsonschema::{Draft, Validator};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::profile::ExecutionMode;
use crate::core::types::{
    ExecutionPlan, FailureReason, GlobalReview, OutcomeJudgeReport, RunTrace, StepStatus,
    SubGoalReview,
};
use crate::io::oracle::{OracleRequest, ReasoningOracle};

const JUDGE_TEMPLATE: &str = include_str!("judge.md");
const RESPONSE_SCHEMA: &str = include_str!("../../schemas/judge_response.schema.json");

/// Note recorded when the oracle's response does not match the schema.
pub const SCHEMA_FAILURE_NOTE: &str =
    "judge response failed schema validation; review omitted";

/// Note recorded when the execution profile turns the judge off.
pub const JUDGE_DISABLED_NOTE: &str = "outcome judge disabled by execution profile";

static SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    serde_json::from_str(RESPONSE_SCHEMA).expect("judge response schema should be valid JSON")
});

static VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&SCHEMA)
        .expect("judge response schema should compile")
});

/// Parsed oracle response, after schema validation.
#[derive(Debug, Deserialize)]
struct JudgeResponse {
    global_review: GlobalReview,
    sub_goals: Vec<RawReview>,
    #[serde(default)]
    next_run_profile_suggestion: Option<ExecutionMode>,
    #[serde(default)]
    next_run_notes: Option<String>,
    #[serde(default)]
    llm_raw_notes: Option<String>,
}

/// Sub-goal review as sent; the index is any JSON integer until scoped.
#[derive(Debug, Deserialize)]
struct RawReview {
    sub_goal_index: Number,
    success: bool,
    score: f64,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    strengths: Vec<String>,
}

impl RawReview {
    /// `None` when the index cannot name any sub-goal.
    fn into_review(self) -> Option<SubGoalReview> {
        let index = self
            .sub_goal_index
            .as_u64()
            .and_then(|index| u32::try_from(index).ok())?;
        Some(SubGoalReview {
            sub_goal_index: index,
            success: self.success,
            score: self.score,
            issues: self.issues,
            warnings: self.warnings,
            strengths: self.strengths,
        })
    }
}

#[derive(Debug, Serialize)]
struct StepContext {
    sub_goal_index: u32,
    status: &'static str,
    attempts: u32,
    failure: Option<String>,
}

fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Success => "success",
        StepStatus::Failed => "failed",
        StepStatus::Skipped => "skipped",
    }
}

fn describe_failure(failure: &FailureReason) -> String {
    match failure {
        FailureReason::TargetNotReached { target, attempts } => {
            format!("target '{target}' not reached after {attempts} attempts")
        }
        FailureReason::AttemptsExhausted { attempts, evidence } => format!(
            "attempts exhausted after {attempts}; upload={} verification={}",
            evidence.upload_status.map_or("none", |status| status.as_str()),
            evidence
                .verification_status
                .map_or("none", |status| status.as_str())
        ),
        FailureReason::LowConfidence {
            confidence,
            threshold,
        } => format!("confidence {confidence:.2} below threshold {threshold:.2}"),
        FailureReason::ExecutionError { message } => format!("execution error: {message}"),
        FailureReason::DisallowedByProfile { strategy } => {
            format!("{strategy} content disallowed by profile")
        }
    }
}

/// Keep reviews of planned sub-goals only, first entry per index, in plan order.
pub fn scope_reviews(plan: &ExecutionPlan, reviews: Vec<SubGoalReview>) -> Vec<SubGoalReview> {
    let raw = reviews.len();
    let mut seen = HashSet::new();
    let mut kept: Vec<(usize, SubGoalReview)> = reviews
        .into_iter()
        .filter_map(|review| {
            let position = plan.position_of(review.sub_goal_index)?;
            seen.insert(review.sub_goal_index).then_some((position, review))
        })
        .collect();
    kept.sort_by_key(|(position, _)| *position);
    if kept.len() < raw {
        debug!(raw, kept = kept.len(), "dropped out-of-plan or duplicate sub-goal reviews");
    }
    kept.into_iter().map(|(_, review)| review).collect()
}

/// Judge backed by a [`ReasoningOracle`], with a single bounded call per report.
pub struct OutcomeJudge {
    env: Environment<'static>,
    timeout: Duration,
}

impl OutcomeJudge {
    pub fn new(timeout: Duration) -> Self {
        let mut env = Environment::new();
        env.add_template("judge", JUDGE_TEMPLATE)
            .expect("judge template should be valid");
        Self { env, timeout }
    }

    /// JSON Schema the oracle response must satisfy.
    pub fn response_schema() -> &'static Value {
        &SCHEMA
    }

    /// Review a finished run. Never fails.
    #[instrument(
        skip_all,
        fields(
            sub_goals = plan.sub_goals.len(),
            timeout_ms = self.timeout.as_millis() as u64
        )
    )]
    pub async fn build_report(
        &self,
        goal: &str,
        plan: &ExecutionPlan,
        trace: &RunTrace,
        final_answer: Option<&str>,
        metrics_summary: Option<&Value>,
        oracle: &dyn ReasoningOracle,
    ) -> OutcomeJudgeReport {
        let fallback = |note: String| {
            let mut report = OutcomeJudgeReport::minimal(plan, note);
            report.goal = goal.to_string();
            report
        };

        if !plan.execution_profile.features.use_outcome_judge {
            info!("outcome judge disabled by profile");
            return fallback(JUDGE_DISABLED_NOTE.to_string());
        }

        let prompt = match self.render_prompt(goal, plan, trace, final_answer, metrics_summary) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "judge prompt rendering failed");
                return fallback(format!("judge prompt rendering failed: {err:#}"));
            }
        };
        let request = OracleRequest {
            prompt,
            payload: json!({
                "goal": goal,
                "plan": plan,
                "trace": trace,
                "final_answer": final_answer,
                "metrics_summary": metrics_summary,
            }),
            response_schema: SCHEMA.clone(),
            timeout: self.timeout,
        };

        let value = match tokio::time::timeout(self.timeout, oracle.complete(&request)).await {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                warn!(error = %err, "judge oracle failed");
                return fallback(format!("judge oracle failed: {err}"));
            }
            Err(_) => {
                warn!("judge oracle timed out");
                return fallback(format!("judge oracle timed out after {:?}", self.timeout));
            }
        };

        let messages: Vec<String> = VALIDATOR
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect();
        if !messages.is_empty() {
            warn!(errors = %messages.join("; "), "judge response failed schema validation");
            return fallback(SCHEMA_FAILURE_NOTE.to_string());
        }
        let response: JudgeResponse = match serde_json::from_value(value) {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "judge response did not deserialize");
                return fallback(SCHEMA_FAILURE_NOTE.to_string());
            }
        };

        let sent = response.sub_goals.len();
        let reviews: Vec<SubGoalReview> = response
            .sub_goals
            .into_iter()
            .filter_map(RawReview::into_review)
            .collect();
        if reviews.len() < sent {
            debug!(dropped = sent - reviews.len(), "dropped reviews with unrepresentable index");
        }
        let sub_goals = scope_reviews(plan, reviews);
        info!(
            overall_success = response.global_review.overall_success,
            score = response.global_review.global_score,
            reviews = sub_goals.len(),
            "judge report built"
        );
        OutcomeJudgeReport {
            goal: goal.to_string(),
            execution_profile_name: plan.execution_profile.mode,
            context_strategies: plan.context_strategies.clone(),
            global_review: Some(response.global_review),
            sub_goals,
            next_run_profile_suggestion: response.next_run_profile_suggestion,
            next_run_notes: response.next_run_notes,
            llm_raw_notes: response.llm_raw_notes,
        }
    }

    fn render_prompt(
        &self,
        goal: &str,
        plan: &ExecutionPlan,
        trace: &RunTrace,
        final_answer: Option<&str>,
        metrics_summary: Option<&Value>,
    ) -> Result<String> {
        let profile = &plan.execution_profile;
        let steps: Vec<StepContext> = trace
            .steps
            .iter()
            .map(|step| StepContext {
                sub_goal_index: step.sub_goal_index,
                status: status_label(step.status),
                attempts: step.attempts,
                failure: step.failure.as_ref().map(describe_failure),
            })
            .collect();
        let strategies: Vec<&str> = plan
            .context_strategies
            .iter()
            .map(|strategy| strategy.as_str())
            .collect();
        let metrics = metrics_summary
            .map(serde_json::to_string_pretty)
            .transpose()
            .context("serialize metrics summary")?;

        let template = self.env.get_template("judge")?;
        let rendered = template.render(context! {
            goal => goal.trim(),
            mode => profile.mode.as_str(),
            max_steps => profile.max_steps_per_subgoal,
            stop_on_first_success => profile.stop_on_first_success,
            strategies => strategies,
            sub_goals => &plan.sub_goals,
            steps => steps,
            stopped_early => trace.stopped_early,
            final_answer => final_answer.map(str::trim).filter(|s| !s.is_empty()),
            metrics => metrics,
        })?;
        Ok(rendered)
    }
}
