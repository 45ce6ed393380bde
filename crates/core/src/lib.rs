pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod workflow;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::record::RecordId;
pub use errors::{ApplicationError, InterfaceError, PersistenceError, WorkflowError};
pub use workflow::{
    StageDescriptor, StageGates, WorkflowEngine, WorkflowFamily, WorkflowPersistence,
    WorkflowState,
};
