use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::stages::{first_stage, WorkflowFamily};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Active,
    Pending,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Active => "active",
            Self::Pending => "pending",
        }
    }
}

/// Progress of one open quote or claim through its family's stages.
///
/// Values are only changed through the functions in
/// [`crate::workflow::engine`], which return a new state and leave the input
/// untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub family: WorkflowFamily,
    pub current_stage_id: String,
    pub completed_stage_ids: BTreeSet<String>,
    pub stage_data: BTreeMap<String, Value>,
    pub loading: bool,
    pub last_error: Option<String>,
    /// Bumped by every mutating operation. Stored alongside the blob for
    /// diagnostics; stores order sessions by save time, not by revision.
    pub revision: u64,
}

impl WorkflowState {
    pub fn initial(family: WorkflowFamily) -> Self {
        Self {
            family,
            current_stage_id: first_stage(family).id.to_owned(),
            completed_stage_ids: BTreeSet::new(),
            stage_data: BTreeMap::new(),
            loading: false,
            last_error: None,
            revision: 0,
        }
    }

    pub fn is_completed(&self, stage_id: &str) -> bool {
        self.completed_stage_ids.contains(stage_id)
    }

    pub fn data_for(&self, stage_id: &str) -> Option<&Value> {
        self.stage_data.get(stage_id)
    }
}

/// Shallow merge: object keys from `incoming` win, anything that is not an
/// object on both sides is replaced outright.
pub(crate) fn merge_payload(existing: Option<&Value>, incoming: Value) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(current)), Value::Object(patch)) => {
            let mut merged = current.clone();
            for (key, value) in patch {
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (Some(current), Value::Null) => current.clone(),
        (_, incoming) => incoming,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{merge_payload, WorkflowState};
    use crate::workflow::stages::WorkflowFamily;

    #[test]
    fn initial_state_starts_on_first_stage() {
        let state = WorkflowState::initial(WorkflowFamily::Quote);
        assert_eq!(state.current_stage_id, "client_selection");
        assert!(state.completed_stage_ids.is_empty());
        assert!(state.stage_data.is_empty());
        assert!(!state.loading);
        assert!(state.last_error.is_none());
        assert_eq!(state.revision, 0);
    }

    #[test]
    fn merge_keeps_existing_keys_and_lets_new_keys_win() {
        let existing = json!({ "policy_id": "POL-1", "incident_date": "2026-01-03" });
        let merged =
            merge_payload(Some(&existing), json!({ "incident_date": "2026-01-04", "notes": "x" }));

        assert_eq!(
            merged,
            json!({ "policy_id": "POL-1", "incident_date": "2026-01-04", "notes": "x" })
        );
    }

    #[test]
    fn null_payload_does_not_erase_collected_data() {
        let existing = json!({ "client_id": "C-9" });
        assert_eq!(merge_payload(Some(&existing), serde_json::Value::Null), existing);
    }

    #[test]
    fn non_object_payload_replaces_previous_value() {
        let existing = json!({ "a": 1 });
        assert_eq!(merge_payload(Some(&existing), json!(["x"])), json!(["x"]));
        assert_eq!(merge_payload(None, json!({ "a": 2 })), json!({ "a": 2 }));
    }
}
