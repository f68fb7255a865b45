//! Shared types for the approval workflow engine
//!
//! Everything here is plain data: identifiers, status enumerations, the
//! workflow definition snapshot, the instance/step aggregate and the
//! read-only projections handed back to callers. The rules that move these
//! records between states live in `approval-core`.

pub mod action;
pub mod definition;
pub mod entity;
pub mod ids;
pub mod status;
pub mod view;

pub use action::{ApprovalAction, DecisionRequest, ParseActionError, WorkflowAction};
pub use definition::{StepTemplate, WorkflowDefinition};
pub use entity::{Approver, ApprovalInstance, ApprovalStep, AuditRecord, Metadata};
pub use ids::{InstanceId, StepId, UserId};
pub use status::{InstanceStatus, ParseStatusError, StepStatus};
pub use view::{Page, Progress, WorkflowState};
