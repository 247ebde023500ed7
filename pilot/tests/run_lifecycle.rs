use std::time::Duration;

use serde_json::{Value, json};

use pilot::core::profile::{ExecutionMode, ExecutionProfile};
use pilot::core::types::{
    ActionKind, OutcomeEvidence, StepStatus, UploadStatus, VerificationStatus,
};
use pilot::execution::{AttemptReport, NavigationStage, run_plan};
use pilot::io::artifacts::RunArtifacts;
use pilot::io::config::PilotConfig;
use pilot::io::oracle::OracleError;
use pilot::io::session::Selector;
use pilot::judge::OutcomeJudge;
use pilot::navigation::NavigationResolver;
use pilot::planner::build_plan;
use pilot::test_support::{
    FakeFrame, FakeSession, ScriptedAttempt, ScriptedOracle, ScriptedRunner, answered,
    document_tree,
};

fn portal_session() -> FakeSession {
    let session = FakeSession::new();
    let anchor = Selector::css("a#menuDocPendiente");
    session.add_frame(
        FakeFrame::new(Some("principal"), "https://portal.example/inicio")
            .with_element(anchor.clone(), 1),
    );
    session.reveal_on_click(
        &anchor,
        FakeFrame::new(Some("contenido"), "https://portal.example/doc/pendiente")
            .with_element(Selector::css("table.grid-documentos"), 1),
    );
    session
}

fn uploaded() -> AttemptReport {
    AttemptReport {
        success: true,
        evidence: OutcomeEvidence {
            upload_status: Some(UploadStatus::Success),
            verification_status: Some(VerificationStatus::Confirmed),
        },
        answer: Some("DNI de Ana López enviado".to_string()),
        confidence: Some(0.9),
    }
}

#[tokio::test(start_paused = true)]
async fn goal_is_planned_executed_judged_and_written() {
    let config = PilotConfig::default();
    let (_docs, repository) = document_tree(&[
        ("Ana López", "dni_ana.pdf"),
        ("Ana López", "contrato.pdf"),
    ])
    .expect("docs");

    let goal = "Busca en Wikipedia qué es la coordinación empresarial \
                y luego sube el dni de Ana López al portal";
    let profile = ExecutionProfile::from_goal_text(goal);
    let plan = build_plan(
        goal,
        &[],
        &profile,
        &config.planner.allowed_strategies,
        Some(&repository),
    );
    assert_eq!(plan.sub_goals.len(), 2);
    let upload = &plan.sub_goals[1];
    assert!(upload.expects(ActionKind::ReachTarget));
    assert!(upload.expects(ActionKind::UploadFile));
    assert_eq!(upload.documents_needed, vec!["dni_ana.pdf"]);

    let session = portal_session();
    let resolver = NavigationResolver::new(config.navigation.clone());
    let target = config.target("pending_documents").expect("target");
    let stage = NavigationStage {
        resolver: &resolver,
        session: &session,
        target,
    };
    let runner = ScriptedRunner::new()
        .script(
            1,
            vec![ScriptedAttempt::Report(answered(
                "Coordinación de actividades empresariales",
            ))],
        )
        .script(2, vec![ScriptedAttempt::Report(uploaded())]);

    let trace = run_plan(
        &plan,
        &runner,
        &config.retry,
        config.planner.default_max_steps,
        Some(&stage),
    )
    .await;
    assert!(trace.steps.iter().all(|step| step.status == StepStatus::Success));
    let calls = runner.calls();
    assert_eq!(calls[1].reached_target.as_deref(), Some("pending_documents"));

    let oracle = ScriptedOracle::responding(json!({
        "global_review": { "overall_success": true, "global_score": 0.85 },
        "sub_goals": [
            { "sub_goal_index": 2, "success": true, "score": 0.9 },
            { "sub_goal_index": 1, "success": true, "score": 0.8 },
            { "sub_goal_index": 5, "success": false, "score": 0.0 }
        ],
        "next_run_profile_suggestion": "fast",
        "next_run_notes": null
    }));
    let final_answer = trace.final_answer();
    let report = OutcomeJudge::new(config.judge.timeout())
        .build_report(goal, &plan, &trace, final_answer.as_deref(), None, &oracle)
        .await;
    let indices: Vec<u32> = report.sub_goals.iter().map(|r| r.sub_goal_index).collect();
    assert_eq!(indices, vec![1, 2]);
    assert_eq!(report.next_profile().map(|p| p.mode), Some(ExecutionMode::Fast));

    let out = tempfile::tempdir().expect("tempdir");
    let artifacts = RunArtifacts::write(out.path(), &plan, &trace, &report).expect("artifacts");
    let trace_text = std::fs::read_to_string(&artifacts.trace).expect("read");
    let written: Value = serde_json::from_str(&trace_text).expect("json");
    assert_eq!(written["steps"].as_array().expect("steps").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unreachable_portal_and_failing_judge_still_produce_a_report() {
    let config = PilotConfig::default();
    let goal = "Revisa la documentación pendiente en el portal; resume el estado";
    let profile = ExecutionProfile::default();
    let plan = build_plan(goal, &[], &profile, &config.planner.allowed_strategies, None);

    let session = FakeSession::new();
    session.add_frame(FakeFrame::new(Some("principal"), "about:blank"));
    let resolver = NavigationResolver::new(config.navigation.clone());
    let target = config.target("pending_documents").expect("target");
    let stage = NavigationStage {
        resolver: &resolver,
        session: &session,
        target,
    };
    let runner =
        ScriptedRunner::new().script(2, vec![ScriptedAttempt::Report(answered("sin datos"))]);

    let trace = run_plan(
        &plan,
        &runner,
        &config.retry,
        config.planner.default_max_steps,
        Some(&stage),
    )
    .await;
    assert_eq!(trace.steps.len(), 2);
    assert_eq!(trace.steps[0].status, StepStatus::Failed);
    assert_eq!(trace.steps[1].status, StepStatus::Success);

    let oracle = ScriptedOracle::failing(OracleError::Timeout(Duration::from_secs(60)));
    let report = OutcomeJudge::new(config.judge.timeout())
        .build_report(goal, &plan, &trace, None, Some(&json!({"latency_ms": 1200})), &oracle)
        .await;
    assert!(report.global_review.is_none());
    assert!(report.sub_goals.is_empty());
    assert!(report.llm_raw_notes.is_some());
}
