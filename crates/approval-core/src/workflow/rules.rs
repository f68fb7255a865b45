//! Transition rules of the approval state machine
//!
//! Pure functions over an in-memory aggregate. Nothing here performs I/O or
//! checks permissions; the caller validates first and then applies.

use approval_types::{
    ApprovalAction, ApprovalInstance, ApprovalStep, Approver, InstanceId, InstanceStatus,
    Metadata, Progress, StepId, StepStatus, UserId, WorkflowDefinition, WorkflowState,
};
use chrono::{DateTime, Utc};

use super::traits::IdGenerator;

/// Index of the first NOT_STARTED required step with order strictly greater
/// than `after`, or at any order when `after` is `None`.
///
/// Non-required steps are never selected, so they stay dormant.
pub fn find_next_step(steps: &[ApprovalStep], after: Option<usize>) -> Option<usize> {
    steps
        .iter()
        .enumerate()
        .filter(|(_, step)| after.map_or(true, |order| step.step_order > order))
        .filter(|(_, step)| step.status == StepStatus::NotStarted && step.is_required)
        .min_by_key(|(_, step)| step.step_order)
        .map(|(idx, _)| idx)
}

/// Index of the PENDING step carrying `step_key`
pub fn find_pending_step(steps: &[ApprovalStep], step_key: &str) -> Option<usize> {
    steps
        .iter()
        .position(|step| step.step_key == step_key && step.is_pending())
}

/// The PENDING step, if any
pub fn current_step(steps: &[ApprovalStep]) -> Option<&ApprovalStep> {
    steps.iter().find(|step| step.is_pending())
}

/// Materialize a new aggregate from a definition snapshot.
///
/// The first required step becomes PENDING. A definition with no required
/// step (including an empty one) yields an instance that is COMPLETED on
/// creation.
pub fn build_aggregate(
    ids: &dyn IdGenerator,
    definition: &WorkflowDefinition,
    target_id: &str,
    created_by: &UserId,
    metadata: Metadata,
    now: DateTime<Utc>,
) -> (ApprovalInstance, Vec<ApprovalStep>) {
    let instance_id = InstanceId::new(ids.generate_id());

    let mut steps: Vec<ApprovalStep> = definition
        .steps
        .iter()
        .enumerate()
        .map(|(order, template)| {
            ApprovalStep::from_template(
                StepId::new(ids.generate_id()),
                instance_id.clone(),
                order,
                template,
            )
        })
        .collect();

    let mut instance = ApprovalInstance {
        id: instance_id,
        target_type: definition.target_type.clone(),
        target_id: target_id.to_string(),
        status: InstanceStatus::NotStarted,
        current_step_index: 0,
        workflow_config: definition.clone(),
        metadata,
        created_by: created_by.clone(),
        created_at: now,
        updated_at: now,
        completed_at: None,
    };

    instance.status = InstanceStatus::InProgress;
    match find_next_step(&steps, None) {
        Some(idx) => activate(&mut instance, &mut steps[idx], now),
        None => complete(&mut instance, now),
    }

    (instance, steps)
}

/// Apply an already validated decision to the step at `step_idx`
pub fn apply_decision(
    instance: &mut ApprovalInstance,
    steps: &mut [ApprovalStep],
    step_idx: usize,
    action: ApprovalAction,
    approver: &Approver,
    reason: Option<String>,
    now: DateTime<Utc>,
) {
    steps[step_idx].record_decision(action.step_status(), approver, reason, now);

    match action {
        ApprovalAction::Approve | ApprovalAction::Skip => advance(instance, steps, now),
        ApprovalAction::Reject => {
            instance.status = InstanceStatus::Rejected;
            instance.updated_at = now;
        }
    }
}

/// Activate the next eligible step after `current_step_index`, or complete
/// the instance when none remains
pub fn advance(instance: &mut ApprovalInstance, steps: &mut [ApprovalStep], now: DateTime<Utc>) {
    match find_next_step(steps, Some(instance.current_step_index)) {
        Some(idx) => activate(instance, &mut steps[idx], now),
        None => complete(instance, now),
    }
}

/// Administrative cancellation. Steps are left as they are.
pub fn cancel(instance: &mut ApprovalInstance, now: DateTime<Utc>) {
    instance.status = InstanceStatus::Cancelled;
    instance.updated_at = now;
}

fn activate(instance: &mut ApprovalInstance, step: &mut ApprovalStep, now: DateTime<Utc>) {
    step.status = StepStatus::Pending;
    instance.current_step_index = step.step_order;
    instance.updated_at = now;
}

fn complete(instance: &mut ApprovalInstance, now: DateTime<Utc>) {
    instance.status = InstanceStatus::Completed;
    instance.completed_at = Some(now);
    instance.updated_at = now;
}

/// Build the caller-facing view of an aggregate
pub fn project(instance: ApprovalInstance, steps: Vec<ApprovalStep>) -> WorkflowState {
    let current = current_step(&steps).cloned();
    let next = current
        .as_ref()
        .and_then(|c| find_next_step(&steps, Some(c.step_order)))
        .map(|idx| steps[idx].clone());

    let available_actions = match (&current, instance.status) {
        (Some(step), InstanceStatus::InProgress) => {
            let mut actions = vec![ApprovalAction::Approve, ApprovalAction::Reject];
            if step.can_skip {
                actions.push(ApprovalAction::Skip);
            }
            actions
        }
        _ => Vec::new(),
    };

    WorkflowState {
        is_completed: instance.is_completed(),
        progress: Progress::from_steps(&steps),
        current_step: current,
        next_step: next,
        available_actions,
        instance,
        steps,
    }
}
