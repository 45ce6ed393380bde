use brokerflow_core::workflow::{
    apply_choice, resume_workflow, EntryDecision, EntryMode, ResumeChoice, WorkflowPersistence,
};
use brokerflow_db::SqlWorkflowStore;
use serde_json::{json, Value};

use crate::commands::session::{
    entry_view, load_config, open_persistence, restore_notice, runtime, save_label, source_label,
    state_view, workflow_failure, SessionTarget,
};
use crate::commands::{CommandFailure, CommandResult};
use crate::RecordArgs;

const COMMAND: &str = "resolve";

pub fn run(args: &RecordArgs, edit: bool) -> CommandResult {
    let outcome = (|| -> Result<(String, Value), CommandFailure> {
        let config = load_config()?;
        let target = SessionTarget::parse(args)?;
        runtime()?.block_on(async {
            let persistence = open_persistence(&config).await?;
            resolve(&target, &persistence, edit).await
        })
    })();

    CommandResult::from_outcome(COMMAND, outcome)
}

async fn resolve(
    target: &SessionTarget,
    persistence: &WorkflowPersistence<SqlWorkflowStore>,
    edit: bool,
) -> Result<(String, Value), CommandFailure> {
    let audit = target.audit_context();
    let resumed = resume_workflow(target.family, target.status(), &target.key, persistence).await;
    let notice = restore_notice(&resumed, &audit.correlation_id);
    let entry = entry_view(resumed.entry_mode);

    let choice = match resumed.entry_mode {
        EntryMode::OfferEditOrResume { .. } if edit => ResumeChoice::EditRecord,
        _ => ResumeChoice::Resume,
    };
    let source = source_label(resumed.source);

    match apply_choice(resumed.state, choice) {
        EntryDecision::EditRecord => Ok((
            format!("editing {} record {}", target.family, target.record_id),
            json!({
                "session_key": target.key.as_str(),
                "decision": "edit_record",
                "entry_mode": entry,
                "notice": notice,
            }),
        )),
        EntryDecision::Workflow(state) => {
            let saved = persistence.save(&state, &target.key).await;
            let view = state_view(&state, target.status())
                .map_err(|error| workflow_failure(error, &audit.correlation_id))?;
            tracing::info!(
                event_name = "cli.resolve.completed",
                correlation_id = %audit.correlation_id,
                session_key = %target.key,
                stage = %state.current_stage_id,
                source,
                "resolved workflow session"
            );

            Ok((
                format!("{} resumes on `{}`", target.record_id, state.current_stage_id),
                json!({
                    "session_key": target.key.as_str(),
                    "decision": "workflow",
                    "source": source,
                    "entry_mode": entry,
                    "persistence": save_label(&saved),
                    "notice": notice,
                    "state": view,
                }),
            ))
        }
    }
}
