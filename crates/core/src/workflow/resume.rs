use serde::Serialize;

use crate::workflow::persistence::{LoadOutcome, SessionKey, WorkflowPersistence, WorkflowStore};
use crate::workflow::stages::{
    first_stage, stage_for_status, stages_for, StageDescriptor, WorkflowFamily,
};
use crate::workflow::state::WorkflowState;

/// Landing stage for a record with the given external status. Unknown or
/// missing statuses land on the first stage.
pub fn resolve_initial_stage(
    family: WorkflowFamily,
    external_status: Option<&str>,
) -> &'static StageDescriptor {
    external_status
        .and_then(|status| stage_for_status(family, status))
        .unwrap_or_else(|| first_stage(family))
}

/// State positioned on the resolved stage with every earlier stage already
/// marked complete, so backward navigation works straight away.
pub fn state_for_status(family: WorkflowFamily, external_status: Option<&str>) -> WorkflowState {
    let initial = resolve_initial_stage(family, external_status);
    let mut state = WorkflowState::initial(family);
    state.current_stage_id = initial.id.to_owned();
    state.completed_stage_ids.extend(
        stages_for(family)
            .iter()
            .take_while(|stage| stage.order < initial.order)
            .map(|stage| stage.id.to_owned()),
    );
    state
}

pub fn create_workflow(family: WorkflowFamily) -> WorkflowState {
    WorkflowState::initial(family)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EntryMode {
    Direct,
    /// Presentation step shown before entering the chain; not a stage.
    OfferEditOrResume { resume_stage: &'static str },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeChoice {
    Resume,
    EditRecord,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EntryDecision {
    Workflow(WorkflowState),
    EditRecord,
}

pub fn entry_mode(family: WorkflowFamily, external_status: Option<&str>) -> EntryMode {
    let initial = resolve_initial_stage(family, external_status);
    if family.supports_edit_mode() && initial.id != first_stage(family).id {
        EntryMode::OfferEditOrResume { resume_stage: initial.id }
    } else {
        EntryMode::Direct
    }
}

pub fn apply_choice(state: WorkflowState, choice: ResumeChoice) -> EntryDecision {
    match choice {
        ResumeChoice::Resume => EntryDecision::Workflow(state),
        ResumeChoice::EditRecord => EntryDecision::EditRecord,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeSource {
    Persisted,
    ExternalStatus,
    Fresh,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResumedWorkflow {
    pub state: WorkflowState,
    pub source: ResumeSource,
    /// A stored session existed but had to be thrown away.
    pub restore_failed: bool,
    pub entry_mode: EntryMode,
}

pub async fn resume_workflow<S>(
    family: WorkflowFamily,
    external_status: Option<&str>,
    key: &SessionKey,
    persistence: &WorkflowPersistence<S>,
) -> ResumedWorkflow
where
    S: WorkflowStore,
{
    let entry_mode = entry_mode(family, external_status);
    let mut restore_failed = false;

    match persistence.load(key).await {
        LoadOutcome::Restored(state) if state.family == family => {
            tracing::debug!(
                event_name = "workflow.resume.resolved",
                session_key = %key,
                source = "persisted",
                stage = %state.current_stage_id,
                "resumed workflow from stored session"
            );
            return ResumedWorkflow {
                state,
                source: ResumeSource::Persisted,
                restore_failed,
                entry_mode,
            };
        }
        LoadOutcome::Restored(_) => {
            persistence.discard(key).await;
            restore_failed = true;
        }
        LoadOutcome::Discarded { .. } => restore_failed = true,
        LoadOutcome::Missing => {}
    }

    let state = state_for_status(family, external_status);
    let source = if state.current_stage_id == first_stage(family).id {
        ResumeSource::Fresh
    } else {
        ResumeSource::ExternalStatus
    };
    tracing::debug!(
        event_name = "workflow.resume.resolved",
        session_key = %key,
        source = ?source,
        stage = %state.current_stage_id,
        external_status = external_status.unwrap_or("none"),
        "resolved workflow entry stage"
    );

    ResumedWorkflow { state, source, restore_failed, entry_mode }
}
