use brokerflow_core::audit::TracingAuditSink;
use brokerflow_core::workflow::{
    resume_workflow, StageCompletion, WorkflowEngine, WorkflowPersistence,
};
use brokerflow_db::SqlWorkflowStore;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::commands::session::{
    load_config, open_persistence, runtime, save_label, state_view, workflow_failure,
    SessionTarget, EXIT_INVALID_ARGUMENT,
};
use crate::commands::{CommandFailure, CommandResult};
use crate::RecordArgs;

const COMMAND: &str = "complete";

pub fn run(args: &RecordArgs, stage_id: &str, data: &str) -> CommandResult {
    let outcome = (|| -> Result<(String, Value), CommandFailure> {
        let config = load_config()?;
        let target = SessionTarget::parse(args)?;
        let payload = parse_payload(data)?;
        let threshold = config.workflow.checklist_threshold_pct;
        runtime()?.block_on(async {
            let persistence = open_persistence(&config).await?;
            complete(&target, &persistence, threshold, stage_id, payload).await
        })
    })();

    CommandResult::from_outcome(COMMAND, outcome)
}

fn parse_payload(raw: &str) -> Result<Value, CommandFailure> {
    serde_json::from_str(raw).map_err(|error| {
        ("invalid_argument", format!("--data must be valid JSON: {error}"), EXIT_INVALID_ARGUMENT)
    })
}

async fn complete(
    target: &SessionTarget,
    persistence: &WorkflowPersistence<SqlWorkflowStore>,
    checklist_threshold_pct: Decimal,
    stage_id: &str,
    payload: Value,
) -> Result<(String, Value), CommandFailure> {
    let audit = target.audit_context();
    let engine = WorkflowEngine::with_default_gates(target.family, checklist_threshold_pct);
    let resumed = resume_workflow(target.family, target.status(), &target.key, persistence).await;

    let completion = engine
        .complete_stage_with_audit(&resumed.state, stage_id, payload, &TracingAuditSink, &audit)
        .map_err(|error| workflow_failure(error, &audit.correlation_id))?;

    let message = match &completion {
        StageCompletion::Advanced { from, to, .. } => format!("completed `{from}`, now on `{to}`"),
        StageCompletion::Recorded { state } => {
            format!("updated `{stage_id}`, still on `{}`", state.current_stage_id)
        }
        StageCompletion::WorkflowComplete { .. } => {
            format!("completed `{stage_id}`, {} workflow finished", target.family)
        }
    };
    let workflow_complete = completion.is_workflow_complete();
    let state = completion.into_state();
    let saved = persistence.save(&state, &target.key).await;
    let view = state_view(&state, target.status())
        .map_err(|error| workflow_failure(error, &audit.correlation_id))?;

    Ok((
        message,
        json!({
            "session_key": target.key.as_str(),
            "workflow_complete": workflow_complete,
            "persistence": save_label(&saved),
            "state": view,
        }),
    ))
}
