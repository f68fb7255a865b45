//! Read-only projections returned to callers

use serde::{Deserialize, Serialize};

use crate::action::ApprovalAction;
use crate::entity::{ApprovalInstance, ApprovalStep};
use crate::status::StepStatus;

/// Snapshot of a workflow after an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub instance: ApprovalInstance,
    pub steps: Vec<ApprovalStep>,
    /// The PENDING step, if any
    pub current_step: Option<ApprovalStep>,
    /// The step advancement would activate after `current_step`
    pub next_step: Option<ApprovalStep>,
    pub is_completed: bool,
    pub available_actions: Vec<ApprovalAction>,
    pub progress: Progress,
}

/// Approved steps over total steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percentage: u8,
}

impl Progress {
    pub fn from_steps(steps: &[ApprovalStep]) -> Self {
        let completed = steps
            .iter()
            .filter(|s| s.status == StepStatus::Approved)
            .count();
        let total = steps.len();
        let percentage = if total > 0 {
            ((completed as f64 / total as f64) * 100.0).round() as u8
        } else {
            0
        };

        Self {
            completed,
            total,
            percentage,
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub pages: usize,
}
