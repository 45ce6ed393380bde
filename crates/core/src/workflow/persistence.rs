use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::record::RecordId;
use crate::errors::PersistenceError;
use crate::workflow::stages::{position, WorkflowFamily};
use crate::workflow::state::WorkflowState;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn for_record(family: WorkflowFamily, record_id: &RecordId) -> Self {
        Self(format!("{}:{}", family.as_str(), record_id.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// JSON document written to the store. Loading flag and last error are
/// session-only and never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedWorkflow {
    pub schema_version: u32,
    pub family: WorkflowFamily,
    pub current_stage_id: String,
    pub completed_stage_ids: Vec<String>,
    pub stage_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub revision: u64,
    pub saved_at: DateTime<Utc>,
}

impl PersistedWorkflow {
    pub fn from_state(state: &WorkflowState, saved_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            family: state.family,
            current_stage_id: state.current_stage_id.clone(),
            completed_stage_ids: state.completed_stage_ids.iter().cloned().collect(),
            stage_data: state.stage_data.clone(),
            revision: state.revision,
            saved_at,
        }
    }

    /// Rebuilds the state, rejecting anything the current registry does not
    /// know about.
    pub fn into_state(self) -> Result<WorkflowState, PersistenceError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(PersistenceError::SchemaDrift(format!(
                "unsupported schema version {}",
                self.schema_version
            )));
        }
        if position(self.family, &self.current_stage_id).is_none() {
            return Err(PersistenceError::SchemaDrift(format!(
                "unknown current stage `{}`",
                self.current_stage_id
            )));
        }
        if let Some(unknown) =
            self.completed_stage_ids.iter().find(|id| position(self.family, id).is_none())
        {
            return Err(PersistenceError::SchemaDrift(format!(
                "unknown completed stage `{unknown}`"
            )));
        }

        Ok(WorkflowState {
            family: self.family,
            current_stage_id: self.current_stage_id,
            completed_stage_ids: self.completed_stage_ids.into_iter().collect(),
            stage_data: self.stage_data,
            loading: false,
            last_error: None,
            revision: self.revision,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredWorkflow {
    pub key: SessionKey,
    pub family: WorkflowFamily,
    pub revision: u64,
    pub payload_json: String,
    pub saved_at: DateTime<Utc>,
}

impl StoredWorkflow {
    pub fn raw(
        key: impl Into<String>,
        family: WorkflowFamily,
        revision: u64,
        payload_json: impl Into<String>,
    ) -> Self {
        Self {
            key: SessionKey::new(key),
            family,
            revision,
            payload_json: payload_json.into(),
            saved_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workflow store backend error: {0}")]
    Backend(String),
    #[error("workflow store returned an unreadable row: {0}")]
    Decode(String),
}

/// Result of a single `put`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// The stored row was saved later than the incoming one and was kept.
    Stale,
}

/// Durable key-value store for workflow sessions.
///
/// Rows are ordered by `saved_at`: `put` must keep a stored row that was saved
/// after the incoming one and report [`PutOutcome::Stale`].
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn put(&self, record: StoredWorkflow) -> Result<PutOutcome, StoreError>;
    async fn get(&self, key: &SessionKey) -> Result<Option<StoredWorkflow>, StoreError>;
    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryWorkflowStore {
    records: Arc<Mutex<HashMap<SessionKey, StoredWorkflow>>>,
}

impl InMemoryWorkflowStore {
    pub fn len(&self) -> usize {
        match self.records.lock() {
            Ok(records) => records.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn put(&self, record: StoredWorkflow) -> Result<PutOutcome, StoreError> {
        let mut records = match self.records.lock() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        };
        if records.get(&record.key).is_some_and(|existing| existing.saved_at > record.saved_at) {
            return Ok(PutOutcome::Stale);
        }
        records.insert(record.key.clone(), record);
        Ok(PutOutcome::Written)
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<StoredWorkflow>, StoreError> {
        let records = match self.records.lock() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(records.get(key).cloned())
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        let mut records = match self.records.lock() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.remove(key);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The store already holds a session saved later than this one.
    Stale,
    Disabled,
    Failed { reason: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoadOutcome {
    Restored(WorkflowState),
    Missing,
    Discarded { reason: String },
}

impl LoadOutcome {
    pub fn into_state(self) -> Option<WorkflowState> {
        match self {
            Self::Restored(state) => Some(state),
            Self::Missing | Self::Discarded { .. } => None,
        }
    }
}

/// Best-effort mirror of workflow state into a [`WorkflowStore`]. Failures are
/// logged and reported as outcomes; they never reach the caller as errors.
pub struct WorkflowPersistence<S> {
    store: S,
    enabled: bool,
}

impl<S> WorkflowPersistence<S>
where
    S: WorkflowStore,
{
    pub fn new(store: S) -> Self {
        Self { store, enabled: true }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn save(&self, state: &WorkflowState, key: &SessionKey) -> SaveOutcome {
        if !self.enabled {
            return SaveOutcome::Disabled;
        }

        let saved_at = Utc::now();
        let result = match encode(state, saved_at) {
            Ok(payload_json) => self
                .store
                .put(StoredWorkflow {
                    key: key.clone(),
                    family: state.family,
                    revision: state.revision,
                    payload_json,
                    saved_at,
                })
                .await
                .map_err(|error| PersistenceError::Store(error.to_string())),
            Err(error) => Err(error),
        };

        match result {
            Ok(PutOutcome::Written) => SaveOutcome::Saved,
            Ok(PutOutcome::Stale) => {
                tracing::warn!(
                    event_name = "workflow.persistence.save_stale",
                    session_key = %key,
                    revision = state.revision,
                    "a later save already holds this session; write ignored"
                );
                SaveOutcome::Stale
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "workflow.persistence.save_failed",
                    session_key = %key,
                    revision = state.revision,
                    error = %error,
                    "could not persist workflow state"
                );
                SaveOutcome::Failed { reason: error.to_string() }
            }
        }
    }

    pub async fn load(&self, key: &SessionKey) -> LoadOutcome {
        if !self.enabled {
            return LoadOutcome::Missing;
        }

        let record = match self.store.get(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return LoadOutcome::Missing,
            Err(error) => {
                return discarded(key, PersistenceError::Store(error.to_string()));
            }
        };

        match decode(&record) {
            Ok(state) => LoadOutcome::Restored(state),
            Err(error) => {
                // An unreadable row is removed so the fallback session can be saved.
                let outcome = discarded(key, error);
                self.discard(key).await;
                outcome
            }
        }
    }

    pub async fn load_state(&self, key: &SessionKey) -> Option<WorkflowState> {
        self.load(key).await.into_state()
    }

    pub async fn discard(&self, key: &SessionKey) {
        if !self.enabled {
            return;
        }
        if let Err(error) = self.store.delete(key).await {
            tracing::warn!(
                event_name = "workflow.persistence.discard_failed",
                session_key = %key,
                error = %error,
                "could not remove stored workflow state"
            );
        }
    }
}

fn discarded(key: &SessionKey, error: PersistenceError) -> LoadOutcome {
    tracing::warn!(
        event_name = "workflow.persistence.load_discarded",
        session_key = %key,
        error = %error,
        "stored workflow state could not be restored; starting over"
    );
    LoadOutcome::Discarded { reason: error.to_string() }
}

pub fn encode(state: &WorkflowState, saved_at: DateTime<Utc>) -> Result<String, PersistenceError> {
    serde_json::to_string(&PersistedWorkflow::from_state(state, saved_at))
        .map_err(PersistenceError::Encode)
}

pub fn decode(record: &StoredWorkflow) -> Result<WorkflowState, PersistenceError> {
    let persisted: PersistedWorkflow =
        serde_json::from_str(&record.payload_json).map_err(PersistenceError::Decode)?;
    if persisted.family != record.family {
        return Err(PersistenceError::SchemaDrift(format!(
            "payload family {} does not match stored family {}",
            persisted.family, record.family
        )));
    }
    persisted.into_state()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};

    use super::{
        encode, InMemoryWorkflowStore, LoadOutcome, PutOutcome, SaveOutcome, SessionKey,
        StoreError, StoredWorkflow, WorkflowPersistence, WorkflowStore,
    };
    use crate::domain::record::RecordId;
    use crate::workflow::engine::{complete_stage, reset, set_data, set_error, set_stage};
    use crate::workflow::gate::OpenGate;
    use crate::workflow::stages::WorkflowFamily;
    use crate::workflow::state::WorkflowState;

    struct BrokenStore;

    #[async_trait]
    impl WorkflowStore for BrokenStore {
        async fn put(&self, _record: StoredWorkflow) -> Result<PutOutcome, StoreError> {
            Err(StoreError::Backend("disk full".to_owned()))
        }

        async fn get(&self, _key: &SessionKey) -> Result<Option<StoredWorkflow>, StoreError> {
            Err(StoreError::Backend("connection reset".to_owned()))
        }

        async fn delete(&self, _key: &SessionKey) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection reset".to_owned()))
        }
    }

    fn worked_claim() -> WorkflowState {
        let state = WorkflowState::initial(WorkflowFamily::Claims);
        let state = complete_stage(&state, "notification", json!({ "channel": "email" }), &OpenGate)
            .expect("notification")
            .into_state();
        let state = complete_stage(
            &state,
            "registration",
            json!({ "policy_id": "POL-55", "incident_date": "2026-09-30", "tags": ["storm"] }),
            &OpenGate,
        )
        .expect("registration")
        .into_state();
        let state = set_data(&state, "documents", json!({ "uploaded": { "photos": 3 } }))
            .expect("documents draft");
        set_stage(&state, "notification").expect("navigate back")
    }

    #[test]
    fn session_keys_combine_family_and_record() {
        let key = SessionKey::for_record(WorkflowFamily::Claims, &RecordId::new("CLM-7"));
        assert_eq!(key.as_str(), "claims:CLM-7");
    }

    #[test]
    fn blob_uses_documented_field_names() {
        let blob = encode(&worked_claim(), Utc::now()).expect("encode");
        let value: Value = serde_json::from_str(&blob).expect("valid json");

        assert_eq!(value["family"], "claims");
        assert_eq!(value["currentStageId"], "notification");
        assert_eq!(value["completedStageIds"], json!(["notification", "registration"]));
        assert!(value["stageData"].is_object());
        assert!(value["savedAt"].is_string());
        assert_eq!(value["schemaVersion"], 1);
    }

    #[tokio::test]
    async fn save_then_load_round_trips_state() {
        let persistence = WorkflowPersistence::new(InMemoryWorkflowStore::default());
        let key = SessionKey::new("claims:CLM-1");
        let state = worked_claim();

        assert_eq!(persistence.save(&state, &key).await, SaveOutcome::Saved);
        let loaded = persistence.load_state(&key).await.expect("restored");

        assert_eq!(loaded.current_stage_id, state.current_stage_id);
        assert_eq!(loaded.completed_stage_ids, state.completed_stage_ids);
        assert_eq!(loaded.stage_data, state.stage_data);
        assert_eq!(loaded.revision, state.revision);
    }

    #[tokio::test]
    async fn session_only_fields_are_not_restored() {
        let persistence = WorkflowPersistence::new(InMemoryWorkflowStore::default());
        let key = SessionKey::new("claims:CLM-2");
        let state = set_error(&worked_claim(), "upload failed");

        persistence.save(&state, &key).await;
        let loaded = persistence.load_state(&key).await.expect("restored");

        assert!(loaded.last_error.is_none());
        assert!(!loaded.loading);
    }

    #[tokio::test]
    async fn missing_key_loads_nothing() {
        let persistence = WorkflowPersistence::new(InMemoryWorkflowStore::default());
        assert_eq!(persistence.load(&SessionKey::new("quote:none")).await, LoadOutcome::Missing);
    }

    #[tokio::test]
    async fn malformed_or_drifted_payloads_are_discarded() {
        let store = InMemoryWorkflowStore::default();
        let drifted = json!({
            "schemaVersion": 1,
            "family": "claims",
            "currentStageId": "triage",
            "completedStageIds": ["notification"],
            "stageData": {},
            "revision": 4,
            "savedAt": "2026-10-01T09:00:00Z"
        });
        let unknown_completed = json!({
            "schemaVersion": 1,
            "family": "claims",
            "currentStageId": "documents",
            "completedStageIds": ["notification", "intake"],
            "stageData": {},
            "savedAt": "2026-10-01T09:00:00Z"
        });
        store.put(StoredWorkflow::raw("claims:bad-json", WorkflowFamily::Claims, 1, "[1,2")).await.ok();
        store
            .put(StoredWorkflow::raw("claims:drift", WorkflowFamily::Claims, 1, drifted.to_string()))
            .await
            .ok();
        store
            .put(StoredWorkflow::raw(
                "claims:unknown-completed",
                WorkflowFamily::Claims,
                1,
                unknown_completed.to_string(),
            ))
            .await
            .ok();
        store
            .put(StoredWorkflow::raw("claims:wrong-family", WorkflowFamily::Quote, 1, drifted.to_string()))
            .await
            .ok();
        let persistence = WorkflowPersistence::new(store);

        for key in ["claims:bad-json", "claims:drift", "claims:unknown-completed", "claims:wrong-family"] {
            let outcome = persistence.load(&SessionKey::new(key)).await;
            assert!(matches!(outcome, LoadOutcome::Discarded { .. }), "{key}: {outcome:?}");
        }
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        let persistence = WorkflowPersistence::new(BrokenStore);
        let key = SessionKey::new("quote:Q-3");
        let state = WorkflowState::initial(WorkflowFamily::Quote);

        assert!(matches!(persistence.save(&state, &key).await, SaveOutcome::Failed { .. }));
        assert!(matches!(persistence.load(&key).await, LoadOutcome::Discarded { .. }));
        persistence.discard(&key).await;
    }

    #[tokio::test]
    async fn reset_state_replaces_a_further_advanced_session() {
        let persistence = WorkflowPersistence::new(InMemoryWorkflowStore::default());
        let key = SessionKey::new("claims:CLM-4");
        let mut state = WorkflowState::initial(WorkflowFamily::Claims);
        for stage in ["notification", "registration", "documents"] {
            state = complete_stage(&state, stage, json!({}), &OpenGate)
                .expect("stage completes")
                .into_state();
        }
        assert_eq!(persistence.save(&state, &key).await, SaveOutcome::Saved);

        let fresh = reset(WorkflowFamily::Claims);
        assert!(fresh.revision < state.revision);
        assert_eq!(persistence.save(&fresh, &key).await, SaveOutcome::Saved);

        let loaded = persistence.load_state(&key).await.expect("restored");
        assert_eq!(loaded.current_stage_id, "notification");
        assert!(loaded.completed_stage_ids.is_empty());
    }

    #[tokio::test]
    async fn write_older_than_stored_session_is_reported_stale() {
        let store = InMemoryWorkflowStore::default();
        let key = SessionKey::new("claims:CLM-8");
        let later = encode(&worked_claim(), Utc::now() + Duration::hours(1)).expect("encode");
        let stored = StoredWorkflow {
            saved_at: Utc::now() + Duration::hours(1),
            ..StoredWorkflow::raw("claims:CLM-8", WorkflowFamily::Claims, 4, later)
        };
        assert_eq!(store.put(stored).await.expect("put"), PutOutcome::Written);
        let persistence = WorkflowPersistence::new(store);

        let outcome = persistence.save(&WorkflowState::initial(WorkflowFamily::Claims), &key).await;

        assert_eq!(outcome, SaveOutcome::Stale);
        let loaded = persistence.load_state(&key).await.expect("restored");
        assert_eq!(loaded.current_stage_id, "notification");
        assert!(loaded.is_completed("registration"));
    }

    #[tokio::test]
    async fn unreadable_row_is_removed_so_the_next_save_sticks() {
        let store = InMemoryWorkflowStore::default();
        let key = SessionKey::new("claims:CLM-9");
        let corrupt = StoredWorkflow {
            saved_at: Utc::now() + Duration::hours(1),
            ..StoredWorkflow::raw("claims:CLM-9", WorkflowFamily::Claims, 5, "{not json")
        };
        store.put(corrupt).await.expect("raw write");
        let persistence = WorkflowPersistence::new(store.clone());

        assert!(matches!(persistence.load(&key).await, LoadOutcome::Discarded { .. }));
        assert!(store.is_empty());

        let state = complete_stage(
            &WorkflowState::initial(WorkflowFamily::Claims),
            "notification",
            json!({}),
            &OpenGate,
        )
        .expect("notification")
        .into_state();
        assert_eq!(persistence.save(&state, &key).await, SaveOutcome::Saved);
        let loaded = persistence.load_state(&key).await.expect("restored");
        assert_eq!(loaded.current_stage_id, "registration");
    }

    #[tokio::test]
    async fn blob_and_row_share_one_save_timestamp() {
        let store = InMemoryWorkflowStore::default();
        let persistence = WorkflowPersistence::new(store.clone());
        let key = SessionKey::new("quote:Q-7");

        persistence.save(&WorkflowState::initial(WorkflowFamily::Quote), &key).await;

        let row = store.get(&key).await.expect("get").expect("row exists");
        let blob: Value = serde_json::from_str(&row.payload_json).expect("valid json");
        let blob_saved_at: chrono::DateTime<Utc> =
            serde_json::from_value(blob["savedAt"].clone()).expect("savedAt timestamp");
        assert_eq!(blob_saved_at, row.saved_at);
    }

    #[tokio::test]
    async fn disabled_persistence_never_touches_the_store() {
        let store = InMemoryWorkflowStore::default();
        let persistence = WorkflowPersistence::new(store.clone()).with_enabled(false);
        let key = SessionKey::new("quote:Q-5");

        assert_eq!(
            persistence.save(&WorkflowState::initial(WorkflowFamily::Quote), &key).await,
            SaveOutcome::Disabled
        );
        assert!(store.is_empty());
        assert_eq!(persistence.load(&key).await, LoadOutcome::Missing);
    }

    #[tokio::test]
    async fn discard_removes_the_session() {
        let store = InMemoryWorkflowStore::default();
        let persistence = WorkflowPersistence::new(store.clone());
        let key = SessionKey::new("quote:Q-6");

        persistence.save(&WorkflowState::initial(WorkflowFamily::Quote), &key).await;
        assert_eq!(store.len(), 1);
        persistence.discard(&key).await;
        assert!(store.is_empty());
    }
}
