pub mod engine;
pub mod gate;
pub mod persistence;
pub mod resume;
pub mod stages;
pub mod state;

pub use engine::{
    can_navigate_to, clear_error, complete_stage, implied_complete, index_of, navigate_to,
    progress, reset, set_data, set_error, set_loading, set_stage, stage_overview,
    status_of, Progress, StageCompletion, StageOverview, WorkflowEngine,
};
pub use gate::{CompletionGate, GateRule, OpenGate, Readiness, StageGates};
pub use persistence::{
    InMemoryWorkflowStore, LoadOutcome, PersistedWorkflow, PutOutcome, SaveOutcome, SessionKey,
    StoreError, StoredWorkflow, WorkflowPersistence, WorkflowStore,
};
pub use resume::{
    apply_choice, create_workflow, entry_mode, resolve_initial_stage, resume_workflow,
    state_for_status, EntryDecision, EntryMode, ResumeChoice, ResumeSource, ResumedWorkflow,
};
pub use stages::{external_status_mapping, stages_for, StageDescriptor, WorkflowFamily};
pub use state::{StageStatus, WorkflowState};
