//! The approval aggregate: an instance together with its steps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::action::WorkflowAction;
use crate::definition::{StepTemplate, WorkflowDefinition};
use crate::ids::{InstanceId, StepId, UserId};
use crate::status::{InstanceStatus, StepStatus};

/// Opaque key/value data attached to an instance by its creator
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// The user acting on a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub id: UserId,
    pub name: String,
}

impl Approver {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            name: name.into(),
        }
    }
}

/// One in-flight approval for a target entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalInstance {
    pub id: InstanceId,
    pub target_type: String,
    pub target_id: String,
    pub status: InstanceStatus,
    /// Order of the step currently active, or last activated
    pub current_step_index: usize,
    pub workflow_config: WorkflowDefinition,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ApprovalInstance {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_completed(&self) -> bool {
        self.status == InstanceStatus::Completed
    }
}

/// One stage of an instance's workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: StepId,
    pub instance_id: InstanceId,
    pub step_key: String,
    pub step_name: String,
    pub step_order: usize,
    pub status: StepStatus,
    pub approver_roles: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_name: Option<String>,
    pub is_required: bool,
    pub can_skip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApprovalStep {
    /// Materialize a NOT_STARTED step from its template
    pub fn from_template(
        id: StepId,
        instance_id: InstanceId,
        step_order: usize,
        template: &StepTemplate,
    ) -> Self {
        Self {
            id,
            instance_id,
            step_key: template.step_key.clone(),
            step_name: template.name.clone(),
            step_order,
            status: StepStatus::NotStarted,
            approver_roles: template.roles.clone(),
            approver_user_id: None,
            approver_name: None,
            is_required: template.required,
            can_skip: template.can_skip,
            processed_at: None,
            reason: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == StepStatus::Pending
    }

    /// True when at least one of `roles` is eligible for this step
    pub fn accepts_any_role(&self, roles: &BTreeSet<String>) -> bool {
        !self.approver_roles.is_disjoint(roles)
    }

    /// Move the step out of PENDING and stamp who decided it
    pub fn record_decision(
        &mut self,
        status: StepStatus,
        approver: &Approver,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        self.approver_user_id = Some(approver.id.clone());
        self.approver_name = Some(approver.name.clone());
        self.processed_at = Some(at);
        self.reason = reason;
    }
}

/// Append-only record of an action taken on an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub instance_id: InstanceId,
    pub action: WorkflowAction,
    pub actor_id: UserId,
    pub actor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
