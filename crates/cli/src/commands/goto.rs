use brokerflow_core::workflow::{resume_workflow, WorkflowEngine, WorkflowPersistence};
use brokerflow_db::SqlWorkflowStore;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::commands::session::{
    load_config, open_persistence, runtime, save_label, state_view, workflow_failure,
    SessionTarget,
};
use crate::commands::{CommandFailure, CommandResult};
use crate::RecordArgs;

const COMMAND: &str = "goto";

pub fn run(args: &RecordArgs, stage_id: &str) -> CommandResult {
    let outcome = (|| -> Result<(String, Value), CommandFailure> {
        let config = load_config()?;
        let target = SessionTarget::parse(args)?;
        let threshold = config.workflow.checklist_threshold_pct;
        runtime()?.block_on(async {
            let persistence = open_persistence(&config).await?;
            goto(&target, &persistence, threshold, stage_id).await
        })
    })();

    CommandResult::from_outcome(COMMAND, outcome)
}

async fn goto(
    target: &SessionTarget,
    persistence: &WorkflowPersistence<SqlWorkflowStore>,
    checklist_threshold_pct: Decimal,
    stage_id: &str,
) -> Result<(String, Value), CommandFailure> {
    let audit = target.audit_context();
    let engine = WorkflowEngine::with_default_gates(target.family, checklist_threshold_pct);
    let resumed = resume_workflow(target.family, target.status(), &target.key, persistence).await;

    let from = resumed.state.current_stage_id.clone();
    let state = engine
        .navigate_to(&resumed.state, stage_id)
        .map_err(|error| workflow_failure(error, &audit.correlation_id))?;
    let saved = persistence.save(&state, &target.key).await;
    let view = state_view(&state, target.status())
        .map_err(|error| workflow_failure(error, &audit.correlation_id))?;
    tracing::info!(
        event_name = "cli.goto.navigated",
        correlation_id = %audit.correlation_id,
        session_key = %target.key,
        from = %from,
        to = %state.current_stage_id,
        "navigated workflow stage"
    );

    Ok((
        format!("moved from `{from}` to `{}`", state.current_stage_id),
        json!({
            "session_key": target.key.as_str(),
            "persistence": save_label(&saved),
            "state": view,
        }),
    ))
}
