use brokerflow_core::audit::AuditContext;
use brokerflow_core::config::{AppConfig, LoadOptions};
use brokerflow_core::domain::record::RecordId;
use brokerflow_core::errors::{ApplicationError, WorkflowError};
use brokerflow_core::workflow::{
    implied_complete, progress, stage_overview, EntryMode, ResumeSource, ResumedWorkflow,
    SaveOutcome, SessionKey, WorkflowFamily, WorkflowPersistence, WorkflowState,
};
use brokerflow_db::{connection::connect_with_config, migrations, DbPool, SqlWorkflowStore};
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use uuid::Uuid;

use super::CommandFailure;
use crate::RecordArgs;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_INVALID_ARGUMENT: u8 = 6;
pub const EXIT_REJECTED: u8 = 7;
pub const EXIT_WORKFLOW: u8 = 8;

/// Session a record-scoped command operates on.
pub struct SessionTarget {
    pub family: WorkflowFamily,
    pub record_id: RecordId,
    pub key: SessionKey,
    pub external_status: Option<String>,
}

impl SessionTarget {
    pub fn parse(args: &RecordArgs) -> Result<Self, CommandFailure> {
        let family = parse_family(&args.family)?;
        let record = args.record.trim();
        if record.is_empty() {
            return Err((
                "invalid_argument",
                "record identifier must not be empty".to_string(),
                EXIT_INVALID_ARGUMENT,
            ));
        }

        let record_id = RecordId::new(record);
        let key = SessionKey::for_record(family, &record_id);
        let external_status = args
            .status
            .as_deref()
            .map(str::trim)
            .filter(|status| !status.is_empty())
            .map(str::to_owned);

        Ok(Self { family, record_id, key, external_status })
    }

    pub fn status(&self) -> Option<&str> {
        self.external_status.as_deref()
    }

    pub fn audit_context(&self) -> AuditContext {
        AuditContext::new(
            Some(self.record_id.clone()),
            Some(self.key.to_string()),
            Uuid::new_v4().to_string(),
            "cli",
        )
    }
}

pub fn parse_family(raw: &str) -> Result<WorkflowFamily, CommandFailure> {
    WorkflowFamily::parse(raw).ok_or_else(|| {
        (
            "invalid_argument",
            format!("unknown workflow family `{raw}` (expected quote|claims)"),
            EXIT_INVALID_ARGUMENT,
        )
    })
}

pub fn load_config() -> Result<AppConfig, CommandFailure> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        ("config_validation", format!("configuration issue: {error}"), EXIT_CONFIG)
    })
}

pub fn runtime() -> Result<Runtime, CommandFailure> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        ("runtime_init", format!("failed to initialize async runtime: {error}"), EXIT_RUNTIME)
    })
}

pub async fn open_pool(config: &AppConfig) -> Result<DbPool, CommandFailure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
    Ok(pool)
}

pub async fn open_persistence(
    config: &AppConfig,
) -> Result<WorkflowPersistence<SqlWorkflowStore>, CommandFailure> {
    let pool = open_pool(config).await?;
    Ok(WorkflowPersistence::new(SqlWorkflowStore::new(pool))
        .with_enabled(config.workflow.persistence_enabled))
}

pub fn workflow_failure(error: WorkflowError, correlation_id: &str) -> CommandFailure {
    let recoverable = error.is_recoverable();
    tracing::warn!(
        event_name = "cli.workflow.rejected",
        correlation_id,
        recoverable,
        error = %error,
        "workflow operation rejected"
    );

    if recoverable {
        let interface = ApplicationError::from(error).into_interface(correlation_id);
        ("workflow_rejected", interface.user_message().to_string(), EXIT_REJECTED)
    } else {
        ("workflow", error.to_string(), EXIT_WORKFLOW)
    }
}

pub fn save_label(outcome: &SaveOutcome) -> String {
    match outcome {
        SaveOutcome::Saved => "saved".to_string(),
        SaveOutcome::Stale => "stale".to_string(),
        SaveOutcome::Disabled => "disabled".to_string(),
        SaveOutcome::Failed { reason } => format!("failed: {reason}"),
    }
}

/// Shown when a stored session existed but could not be restored.
pub fn restore_notice(resumed: &ResumedWorkflow, correlation_id: &str) -> Option<String> {
    resumed.restore_failed.then(|| {
        ApplicationError::Persistence("stored session discarded".to_string())
            .into_interface(correlation_id)
            .user_message()
            .to_string()
    })
}

pub fn source_label(source: ResumeSource) -> &'static str {
    match source {
        ResumeSource::Persisted => "persisted",
        ResumeSource::ExternalStatus => "external_status",
        ResumeSource::Fresh => "fresh",
    }
}

pub fn state_view(
    state: &WorkflowState,
    external_status: Option<&str>,
) -> Result<Value, WorkflowError> {
    let stages = stage_overview(state)?
        .into_iter()
        .map(|stage| {
            Ok(json!({
                "id": stage.id,
                "name": stage.name,
                "status": stage.status,
                "marked_complete": stage.marked_complete,
                "implied_complete": implied_complete(state, external_status, stage.id)?,
                "navigable": stage.navigable,
            }))
        })
        .collect::<Result<Vec<_>, WorkflowError>>()?;

    Ok(json!({
        "family": state.family,
        "current_stage_id": state.current_stage_id,
        "completed_stage_ids": state.completed_stage_ids,
        "stage_data": state.stage_data,
        "revision": state.revision,
        "progress": progress(state),
        "stages": stages,
    }))
}

pub fn entry_view(entry_mode: EntryMode) -> Value {
    serde_json::to_value(entry_mode).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use brokerflow_core::workflow::{state_for_status, SaveOutcome, WorkflowFamily};

    use super::{parse_family, save_label, state_view, SessionTarget, EXIT_INVALID_ARGUMENT};
    use crate::RecordArgs;

    fn args(family: &str, record: &str, status: Option<&str>) -> RecordArgs {
        RecordArgs {
            family: family.to_string(),
            record: record.to_string(),
            status: status.map(str::to_string),
        }
    }

    #[test]
    fn target_builds_family_scoped_session_key() {
        let target = SessionTarget::parse(&args("Claims", " CLM-9 ", Some(" investigating ")))
            .expect("valid target");

        assert_eq!(target.family, WorkflowFamily::Claims);
        assert_eq!(target.key.as_str(), "claims:CLM-9");
        assert_eq!(target.status(), Some("investigating"));
    }

    #[test]
    fn blank_record_and_unknown_family_are_rejected() {
        let (class, _, code) = match SessionTarget::parse(&args("quote", "  ", None)) {
            Ok(_) => panic!("blank record should be rejected"),
            Err(failure) => failure,
        };
        assert_eq!(class, "invalid_argument");
        assert_eq!(code, EXIT_INVALID_ARGUMENT);

        assert!(parse_family("motor").is_err());
    }

    #[test]
    fn state_view_reports_implied_and_marked_completion_separately() {
        let state = state_for_status(WorkflowFamily::Claims, Some("investigating"));
        let view = state_view(&state, Some("under_review")).expect("view");

        assert_eq!(view["current_stage_id"], "review");
        let stages = view["stages"].as_array().expect("stages array");
        assert_eq!(stages.len(), 9);
        assert_eq!(stages[4]["id"], "review");
        assert_eq!(stages[4]["status"], "active");
        assert_eq!(stages[4]["marked_complete"], false);
        assert_eq!(stages[4]["implied_complete"], true);
        assert_eq!(view["progress"]["completed"], 4);
    }

    #[test]
    fn save_labels_distinguish_stale_writes() {
        assert_eq!(save_label(&SaveOutcome::Saved), "saved");
        assert_eq!(save_label(&SaveOutcome::Stale), "stale");
        assert_eq!(save_label(&SaveOutcome::Failed { reason: "disk".into() }), "failed: disk");
    }
}
