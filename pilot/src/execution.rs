//! Sequential, evidence-driven execution of a plan.
//!
//! Sub-goals run strictly in plan order. A sub-goal's failure is recorded in
//! the trace and execution moves on; nothing here aborts the whole run except
//! the profile's early stop after a success.

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::core::retry::RetryPolicy;
use crate::core::strategy::infer_strategy;
use crate::core::types::{
    ActionKind, ExecutionPlan, FailureReason, OutcomeEvidence, PlannedSubGoal, RunTrace,
    StepResult, StepStatus,
};
use crate::io::session::Session;
use crate::navigation::target::UiTarget;
use crate::navigation::{NavigationResolver, ReachedTarget, TargetNotReached};

/// Inputs for one attempt of a sub-goal.
pub struct AttemptContext<'a> {
    /// 0-based attempt index.
    pub attempt: u32,
    pub max_steps: u32,
    /// Reached UI target, for sub-goals that expect `reach_target`.
    pub target: Option<&'a ReachedTarget>,
}

/// What an attempt reported back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptReport {
    pub success: bool,
    pub evidence: OutcomeEvidence,
    pub answer: Option<String>,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: Option<f64>,
}

/// Executes single attempts of a sub-goal (browsing, searching, uploading).
///
/// Returning [`TargetNotReached`] (wrapped in `anyhow`) ends the sub-goal
/// without further attempts; any other error counts as a failed attempt.
#[async_trait]
pub trait SubGoalRunner: Send + Sync {
    async fn run_attempt(
        &self,
        sub_goal: &PlannedSubGoal,
        ctx: &AttemptContext<'_>,
    ) -> Result<AttemptReport>;
}

/// Navigation performed before sub-goals that expect `reach_target`.
pub struct NavigationStage<'a> {
    pub resolver: &'a NavigationResolver,
    pub session: &'a dyn Session,
    pub target: &'a UiTarget,
}

impl NavigationStage<'_> {
    async fn reach(&self) -> Result<ReachedTarget, TargetNotReached> {
        self.resolver
            .reach_configured(self.session, self.target)
            .await
    }
}

struct Attempted {
    succeeded: bool,
    evidence: OutcomeEvidence,
    answer: Option<String>,
    failure: Option<FailureReason>,
}

fn step(sub_goal: &PlannedSubGoal, status: StepStatus) -> StepResult {
    StepResult {
        sub_goal_index: sub_goal.index,
        sub_goal: sub_goal.sub_goal.clone(),
        strategy: sub_goal.strategy,
        status,
        attempts: 0,
        evidence: Vec::new(),
        answer: None,
        failure: None,
    }
}

fn target_failure(sub_goal: &PlannedSubGoal, err: &TargetNotReached, attempts: u32) -> StepResult {
    StepResult {
        attempts,
        failure: Some(FailureReason::TargetNotReached {
            target: err.target.clone(),
            attempts: err.attempts,
        }),
        ..step(sub_goal, StepStatus::Failed)
    }
}

/// Run every sub-goal of `plan` in order and collect the trace.
///
/// `default_max_steps` is the step budget used when the profile sets no cap.
#[instrument(
    skip_all,
    fields(sub_goals = plan.sub_goals.len(), mode = %plan.execution_profile.mode)
)]
pub async fn run_plan(
    plan: &ExecutionPlan,
    runner: &dyn SubGoalRunner,
    policy: &RetryPolicy,
    default_max_steps: u32,
    navigation: Option<&NavigationStage<'_>>,
) -> RunTrace {
    let profile = &plan.execution_profile;
    let mut trace = RunTrace::default();

    for sub_goal in &plan.sub_goals {
        let result = run_sub_goal(
            plan,
            sub_goal,
            runner,
            policy,
            default_max_steps,
            navigation,
        )
        .await;
        let succeeded = result.succeeded();
        trace.steps.push(result);
        if succeeded && profile.stop_on_first_success {
            info!(index = sub_goal.index, "stopping after first success");
            trace.stopped_early = true;
            break;
        }
    }

    trace
}

async fn run_sub_goal(
    plan: &ExecutionPlan,
    sub_goal: &PlannedSubGoal,
    runner: &dyn SubGoalRunner,
    policy: &RetryPolicy,
    default_max_steps: u32,
    navigation: Option<&NavigationStage<'_>>,
) -> StepResult {
    let profile = &plan.execution_profile;
    if profile.should_skip_goal(&sub_goal.sub_goal) {
        let strategy = infer_strategy(&sub_goal.sub_goal);
        info!(index = sub_goal.index, %strategy, "sub-goal skipped by profile");
        return StepResult {
            failure: Some(FailureReason::DisallowedByProfile { strategy }),
            ..step(sub_goal, StepStatus::Skipped)
        };
    }

    let reached = if sub_goal.expects(ActionKind::ReachTarget) {
        match navigation {
            Some(stage) => match stage.reach().await {
                Ok(reached) => Some(reached),
                Err(err) => {
                    warn!(index = sub_goal.index, error = %err, "sub-goal target not reached");
                    return target_failure(sub_goal, &err, 0);
                }
            },
            None => {
                debug!(index = sub_goal.index, "no navigation stage configured");
                None
            }
        }
    } else {
        None
    };

    let max_steps = profile.effective_max_steps(default_max_steps);
    let mut evidence_log = Vec::new();
    let mut attempt = 0u32;
    loop {
        let ctx = AttemptContext {
            attempt,
            max_steps,
            target: reached.as_ref(),
        };
        let attempted = match runner.run_attempt(sub_goal, &ctx).await {
            Ok(report) => judge_attempt(report, profile.confidence_threshold),
            Err(err) => {
                if let Some(not_reached) = err.downcast_ref::<TargetNotReached>() {
                    warn!(
                        index = sub_goal.index,
                        error = %not_reached,
                        "runner could not reach target"
                    );
                    let mut result = target_failure(sub_goal, not_reached, attempt + 1);
                    result.evidence = evidence_log;
                    return result;
                }
                warn!(
                    index = sub_goal.index,
                    attempt,
                    error = %format!("{err:#}"),
                    "attempt failed"
                );
                Attempted {
                    succeeded: false,
                    evidence: OutcomeEvidence::default(),
                    answer: None,
                    failure: Some(FailureReason::ExecutionError {
                        message: format!("{err:#}"),
                    }),
                }
            }
        };
        evidence_log.push(attempted.evidence);
        let attempts = attempt + 1;

        if attempted.succeeded && !policy.evidence_requests_retry(&attempted.evidence) {
            info!(index = sub_goal.index, attempts, "sub-goal succeeded");
            return StepResult {
                attempts,
                evidence: evidence_log,
                answer: attempted.answer,
                ..step(sub_goal, StepStatus::Success)
            };
        }

        let retry = sub_goal.may_retry
            && policy.should_retry(attempt, &attempted.evidence, attempted.succeeded);
        if !retry {
            warn!(index = sub_goal.index, attempts, "sub-goal failed");
            let failure = attempted.failure.unwrap_or(FailureReason::AttemptsExhausted {
                attempts,
                evidence: attempted.evidence,
            });
            return StepResult {
                attempts,
                evidence: evidence_log,
                failure: Some(failure),
                ..step(sub_goal, StepStatus::Failed)
            };
        }

        debug!(
            index = sub_goal.index,
            attempt,
            backoff_ms = policy.backoff().as_millis() as u64,
            "retrying sub-goal"
        );
        sleep(policy.backoff()).await;
        attempt += 1;
    }
}

fn judge_attempt(report: AttemptReport, threshold: Option<f64>) -> Attempted {
    if report.success
        && let (Some(confidence), Some(threshold)) = (report.confidence, threshold)
        && confidence < threshold
    {
        debug!(confidence, threshold, "attempt below confidence threshold");
        return Attempted {
            succeeded: false,
            evidence: report.evidence,
            answer: None,
            failure: Some(FailureReason::LowConfidence {
                confidence,
                threshold,
            }),
        };
    }
    Attempted {
        succeeded: report.success,
        evidence: report.evidence,
        answer: report.answer,
        failure: None,
    }
}
