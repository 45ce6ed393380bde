use brokerflow_core::workflow::{resume_workflow, WorkflowPersistence};
use brokerflow_db::SqlWorkflowStore;
use serde_json::{json, Value};

use crate::commands::session::{
    entry_view, load_config, open_persistence, restore_notice, runtime, source_label, state_view,
    workflow_failure, SessionTarget,
};
use crate::commands::{CommandFailure, CommandResult};
use crate::RecordArgs;

const COMMAND: &str = "show";

pub fn run(args: &RecordArgs) -> CommandResult {
    let outcome = (|| -> Result<(String, Value), CommandFailure> {
        let config = load_config()?;
        let target = SessionTarget::parse(args)?;
        runtime()?.block_on(async {
            let persistence = open_persistence(&config).await?;
            show(&target, &persistence).await
        })
    })();

    CommandResult::from_outcome(COMMAND, outcome)
}

async fn show(
    target: &SessionTarget,
    persistence: &WorkflowPersistence<SqlWorkflowStore>,
) -> Result<(String, Value), CommandFailure> {
    let audit = target.audit_context();
    let resumed = resume_workflow(target.family, target.status(), &target.key, persistence).await;
    let view = state_view(&resumed.state, target.status())
        .map_err(|error| workflow_failure(error, &audit.correlation_id))?;

    Ok((
        format!("{} is on `{}`", target.record_id, resumed.state.current_stage_id),
        json!({
            "session_key": target.key.as_str(),
            "source": source_label(resumed.source),
            "entry_mode": entry_view(resumed.entry_mode),
            "notice": restore_notice(&resumed, &audit.correlation_id),
            "state": view,
        }),
    ))
}
