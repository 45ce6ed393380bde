use serde::Serialize;
use serde_json::Value;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::errors::WorkflowError;
use crate::workflow::gate::{CompletionGate, Readiness, StageGates};
use crate::workflow::resume;
use crate::workflow::stages::{position, stages_for, StageDescriptor, WorkflowFamily};
use crate::workflow::state::{merge_payload, StageStatus, WorkflowState};

#[derive(Clone, Debug, PartialEq)]
pub enum StageCompletion {
    Advanced { state: WorkflowState, from: String, to: String },
    /// An already passed stage was completed again; the current stage is kept.
    Recorded { state: WorkflowState },
    /// The terminal stage was completed. `current_stage_id` stays on it.
    WorkflowComplete { state: WorkflowState },
}

impl StageCompletion {
    pub fn state(&self) -> &WorkflowState {
        match self {
            Self::Advanced { state, .. }
            | Self::Recorded { state }
            | Self::WorkflowComplete { state } => state,
        }
    }

    pub fn into_state(self) -> WorkflowState {
        match self {
            Self::Advanced { state, .. }
            | Self::Recorded { state }
            | Self::WorkflowComplete { state } => state,
        }
    }

    pub fn is_workflow_complete(&self) -> bool {
        matches!(self, Self::WorkflowComplete { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageOverview {
    pub id: &'static str,
    pub name: &'static str,
    pub status: StageStatus,
    pub marked_complete: bool,
    pub navigable: bool,
}

pub fn index_of(state: &WorkflowState, stage_id: &str) -> Result<usize, WorkflowError> {
    position(state.family, stage_id)
        .ok_or_else(|| WorkflowError::unknown_stage(state.family, stage_id))
}

pub fn status_of(state: &WorkflowState, stage_id: &str) -> Result<StageStatus, WorkflowError> {
    let target = index_of(state, stage_id)?;
    let current = index_of(state, &state.current_stage_id)?;

    if target == current {
        return Ok(StageStatus::Active);
    }
    if target < current && state.is_completed(stage_id) {
        return Ok(StageStatus::Completed);
    }
    Ok(StageStatus::Pending)
}

/// Independent completion flag. Unlike [`status_of`] this can be true for the
/// active stage, e.g. after the last stage was completed, and for completed
/// stages ahead of current after navigating back.
pub fn is_marked_complete(state: &WorkflowState, stage_id: &str) -> Result<bool, WorkflowError> {
    index_of(state, stage_id)?;
    Ok(state.is_completed(stage_id))
}

/// Completed stages, anything up to the current one, and the one right after
/// it are reachable.
pub fn can_navigate_to(
    state: &WorkflowState,
    target_stage_id: &str,
) -> Result<bool, WorkflowError> {
    let target = index_of(state, target_stage_id)?;
    let current = index_of(state, &state.current_stage_id)?;

    Ok(state.is_completed(target_stage_id) || target <= current || target == current + 1)
}

pub fn complete_stage<G>(
    state: &WorkflowState,
    stage_id: &str,
    payload: Value,
    gate: &G,
) -> Result<StageCompletion, WorkflowError>
where
    G: CompletionGate + ?Sized,
{
    let target = index_of(state, stage_id)?;
    let current = index_of(state, &state.current_stage_id)?;
    if target > current {
        return Err(WorkflowError::StageNotVisited {
            stage_id: stage_id.to_owned(),
            current: state.current_stage_id.clone(),
        });
    }

    let merged = merge_payload(state.stage_data.get(stage_id), payload);
    if let Readiness::Blocked { reason } = gate.check(state.family, stage_id, &merged) {
        return Err(WorkflowError::StageNotReady { stage_id: stage_id.to_owned(), reason });
    }

    let mut next = state.clone();
    store_payload(&mut next, stage_id, merged);
    next.completed_stage_ids.insert(stage_id.to_owned());
    next.loading = false;
    next.last_error = None;
    next.revision += 1;

    if target < current {
        return Ok(StageCompletion::Recorded { state: next });
    }

    match stages_for(state.family).get(current + 1) {
        Some(following) => {
            next.current_stage_id = following.id.to_owned();
            Ok(StageCompletion::Advanced {
                state: next,
                from: stage_id.to_owned(),
                to: following.id.to_owned(),
            })
        }
        None => Ok(StageCompletion::WorkflowComplete { state: next }),
    }
}

pub fn set_stage(state: &WorkflowState, stage_id: &str) -> Result<WorkflowState, WorkflowError> {
    index_of(state, stage_id)?;

    let mut next = state.clone();
    next.current_stage_id = stage_id.to_owned();
    next.revision += 1;
    Ok(next)
}

pub fn navigate_to(state: &WorkflowState, stage_id: &str) -> Result<WorkflowState, WorkflowError> {
    if !can_navigate_to(state, stage_id)? {
        return Err(WorkflowError::StageNotReachable {
            stage_id: stage_id.to_owned(),
            current: state.current_stage_id.clone(),
        });
    }
    set_stage(state, stage_id)
}

pub fn set_data(
    state: &WorkflowState,
    stage_id: &str,
    payload: Value,
) -> Result<WorkflowState, WorkflowError> {
    index_of(state, stage_id)?;

    let mut next = state.clone();
    let merged = merge_payload(next.stage_data.get(stage_id), payload);
    store_payload(&mut next, stage_id, merged);
    next.revision += 1;
    Ok(next)
}

// A null merge result only happens when there was no prior entry.
fn store_payload(state: &mut WorkflowState, stage_id: &str, merged: Value) {
    if !merged.is_null() {
        state.stage_data.insert(stage_id.to_owned(), merged);
    }
}

pub fn set_loading(state: &WorkflowState, loading: bool) -> WorkflowState {
    let mut next = state.clone();
    next.loading = loading;
    next.revision += 1;
    next
}

/// Records a failed stage operation. The stage is left where it was so the
/// operation can be retried in full.
pub fn set_error(state: &WorkflowState, message: impl Into<String>) -> WorkflowState {
    let mut next = state.clone();
    next.loading = false;
    next.last_error = Some(message.into());
    next.revision += 1;
    next
}

pub fn clear_error(state: &WorkflowState) -> WorkflowState {
    let mut next = state.clone();
    next.last_error = None;
    next.revision += 1;
    next
}

pub fn reset(family: WorkflowFamily) -> WorkflowState {
    WorkflowState::initial(family)
}

/// Display-only badge: true when the record's external status sits past the
/// stage, regardless of whether the stage was filled in. `completed_stage_ids`
/// stays the source of truth for navigation.
pub fn implied_complete(
    state: &WorkflowState,
    external_status: Option<&str>,
    stage_id: &str,
) -> Result<bool, WorkflowError> {
    let target = index_of(state, stage_id)?;
    let resolved = resume::resolve_initial_stage(state.family, external_status);
    let status_position = index_of(state, resolved.id)?;
    Ok(target < status_position)
}

pub fn progress(state: &WorkflowState) -> Progress {
    let stages = stages_for(state.family);
    let completed = stages.iter().filter(|stage| state.is_completed(stage.id)).count();
    let total = stages.len();
    let percent = if total == 0 { 0 } else { (completed * 100 / total) as u8 };
    Progress { completed, total, percent }
}

pub fn stage_overview(state: &WorkflowState) -> Result<Vec<StageOverview>, WorkflowError> {
    stages_for(state.family)
        .iter()
        .map(|stage| {
            Ok(StageOverview {
                id: stage.id,
                name: stage.name,
                status: status_of(state, stage.id)?,
                marked_complete: is_marked_complete(state, stage.id)?,
                navigable: can_navigate_to(state, stage.id)?,
            })
        })
        .collect()
}

/// Binds a family to the gate that guards its stages.
pub struct WorkflowEngine<G> {
    family: WorkflowFamily,
    gate: G,
}

impl<G> WorkflowEngine<G>
where
    G: CompletionGate,
{
    pub fn new(family: WorkflowFamily, gate: G) -> Self {
        Self { family, gate }
    }

    pub fn family(&self) -> WorkflowFamily {
        self.family
    }

    pub fn gate(&self) -> &G {
        &self.gate
    }

    pub fn stages(&self) -> &'static [StageDescriptor] {
        stages_for(self.family)
    }

    pub fn create(&self) -> WorkflowState {
        reset(self.family)
    }

    pub fn reset(&self) -> WorkflowState {
        reset(self.family)
    }

    pub fn status_of(
        &self,
        state: &WorkflowState,
        stage_id: &str,
    ) -> Result<StageStatus, WorkflowError> {
        self.ensure_family(state)?;
        status_of(state, stage_id)
    }

    pub fn can_navigate_to(
        &self,
        state: &WorkflowState,
        stage_id: &str,
    ) -> Result<bool, WorkflowError> {
        self.ensure_family(state)?;
        can_navigate_to(state, stage_id)
    }

    pub fn set_stage(
        &self,
        state: &WorkflowState,
        stage_id: &str,
    ) -> Result<WorkflowState, WorkflowError> {
        self.ensure_family(state)?;
        set_stage(state, stage_id)
    }

    pub fn navigate_to(
        &self,
        state: &WorkflowState,
        stage_id: &str,
    ) -> Result<WorkflowState, WorkflowError> {
        self.ensure_family(state)?;
        navigate_to(state, stage_id)
    }

    pub fn set_data(
        &self,
        state: &WorkflowState,
        stage_id: &str,
        payload: Value,
    ) -> Result<WorkflowState, WorkflowError> {
        self.ensure_family(state)?;
        set_data(state, stage_id, payload)
    }

    pub fn complete_stage(
        &self,
        state: &WorkflowState,
        stage_id: &str,
        payload: Value,
    ) -> Result<StageCompletion, WorkflowError> {
        self.ensure_family(state)?;
        complete_stage(state, stage_id, payload, &self.gate)
    }

    pub fn complete_stage_with_audit<S>(
        &self,
        state: &WorkflowState,
        stage_id: &str,
        payload: Value,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<StageCompletion, WorkflowError>
    where
        S: AuditSink + ?Sized,
    {
        let payload_keys = payload
            .as_object()
            .map(|fields| fields.keys().cloned().collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        let result = self.complete_stage(state, stage_id, payload);

        match &result {
            Ok(completion) => {
                let to = match completion {
                    StageCompletion::Advanced { to, .. } => to.clone(),
                    StageCompletion::Recorded { state } => state.current_stage_id.clone(),
                    StageCompletion::WorkflowComplete { .. } => "complete".to_owned(),
                };
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "workflow.stage_completed",
                        AuditCategory::Workflow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("family", self.family.as_str())
                    .with_metadata("from", state.current_stage_id.clone())
                    .with_metadata("stage", stage_id)
                    .with_metadata("to", to)
                    .with_metadata("payload_keys", payload_keys),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "workflow.stage_rejected",
                        AuditCategory::Gate,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("family", self.family.as_str())
                    .with_metadata("stage", stage_id)
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    fn ensure_family(&self, state: &WorkflowState) -> Result<(), WorkflowError> {
        if state.family != self.family {
            return Err(WorkflowError::FamilyMismatch {
                expected: self.family,
                actual: state.family,
            });
        }
        Ok(())
    }
}

impl WorkflowEngine<StageGates> {
    pub fn with_default_gates(
        family: WorkflowFamily,
        checklist_threshold_pct: rust_decimal::Decimal,
    ) -> Self {
        Self::new(family, StageGates::for_family(family, checklist_threshold_pct))
    }
}
