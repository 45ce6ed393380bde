use thiserror::Error;

use crate::workflow::stages::WorkflowFamily;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("stage `{stage_id}` is not registered for the {family} workflow")]
    UnknownStage { family: WorkflowFamily, stage_id: String },
    #[error("stage `{stage_id}` is not ready: {reason}")]
    StageNotReady { stage_id: String, reason: String },
    #[error("stage `{stage_id}` cannot be completed before it is reached (current: `{current}`)")]
    StageNotVisited { stage_id: String, current: String },
    #[error("stage `{stage_id}` is not reachable from `{current}`")]
    StageNotReachable { stage_id: String, current: String },
    #[error("workflow state belongs to the {actual} family, expected {expected}")]
    FamilyMismatch { expected: WorkflowFamily, actual: WorkflowFamily },
}

impl WorkflowError {
    pub fn unknown_stage(family: WorkflowFamily, stage_id: &str) -> Self {
        Self::UnknownStage { family, stage_id: stage_id.to_owned() }
    }

    /// Gate rejections are expected and shown inline; the rest point at host
    /// integration bugs.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StageNotReady { .. } | Self::StageNotReachable { .. })
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::StageNotReady { reason, .. } => reason.clone(),
            Self::StageNotReachable { .. } => {
                "Finish the current stage before moving further ahead.".to_owned()
            }
            Self::UnknownStage { .. }
            | Self::StageNotVisited { .. }
            | Self::FamilyMismatch { .. } => {
                "This workflow step is not available.".to_owned()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("workflow store failure: {0}")]
    Store(String),
    #[error("could not encode workflow state: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("could not decode workflow state: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("stored workflow state is incompatible: {0}")]
    SchemaDrift(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<PersistenceError> for ApplicationError {
    fn from(value: PersistenceError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. } => message,
            Self::ServiceUnavailable { .. } => {
                "Your previous session could not be restored. Work continues from here."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Workflow(error) if error.is_recoverable() => Self::BadRequest {
                message: error.user_message(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Workflow(error) => Self::Internal {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, InterfaceError, WorkflowError};
    use crate::workflow::stages::WorkflowFamily;

    #[test]
    fn gate_rejection_maps_to_bad_request_with_inline_reason() {
        let interface = ApplicationError::from(WorkflowError::StageNotReady {
            stage_id: "review".to_owned(),
            reason: "complete 4 more checklist items before continuing".to_owned(),
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(interface.user_message(), "complete 4 more checklist items before continuing");
    }

    #[test]
    fn unknown_stage_is_an_integration_error() {
        let error = WorkflowError::unknown_stage(WorkflowFamily::Claims, "underwriting");
        assert!(!error.is_recoverable());

        let interface = ApplicationError::from(error).into_interface("req-2");
        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface =
            ApplicationError::Persistence("database is locked".to_owned()).into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "Your previous session could not be restored. Work continues from here."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("bad threshold".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
    }
}
