use brokerflow_core::workflow::{reset, WorkflowPersistence};
use brokerflow_db::SqlWorkflowStore;
use serde_json::{json, Value};

use crate::commands::session::{
    load_config, open_persistence, runtime, save_label, state_view, workflow_failure,
    SessionTarget,
};
use crate::commands::{CommandFailure, CommandResult};
use crate::RecordArgs;

const COMMAND: &str = "reset";

pub fn run(args: &RecordArgs) -> CommandResult {
    let outcome = (|| -> Result<(String, Value), CommandFailure> {
        let config = load_config()?;
        let target = SessionTarget::parse(args)?;
        runtime()?.block_on(async {
            let persistence = open_persistence(&config).await?;
            reset_session(&target, &persistence).await
        })
    })();

    CommandResult::from_outcome(COMMAND, outcome)
}

async fn reset_session(
    target: &SessionTarget,
    persistence: &WorkflowPersistence<SqlWorkflowStore>,
) -> Result<(String, Value), CommandFailure> {
    let audit = target.audit_context();
    let state = reset(target.family);
    let saved = persistence.save(&state, &target.key).await;
    let view = state_view(&state, None)
        .map_err(|error| workflow_failure(error, &audit.correlation_id))?;
    tracing::info!(
        event_name = "cli.reset.restarted",
        correlation_id = %audit.correlation_id,
        session_key = %target.key,
        revision = state.revision,
        "restarted workflow session"
    );

    Ok((
        format!("{} restarted on `{}`", target.record_id, state.current_stage_id),
        json!({
            "session_key": target.key.as_str(),
            "persistence": save_label(&saved),
            "state": view,
        }),
    ))
}
