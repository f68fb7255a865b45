mod common;

use approval_core::catalog::{REWARD_APPLICATION, STUDENT_ENROLLMENT, USER_REGISTRATION, USER_ROLE_UPGRADE};
use approval_core::{ErrorKind, InstanceStore};
use approval_types::{
    ApprovalAction, ApprovalStep, Approver, InstanceId, InstanceStatus, Metadata, StepStatus, UserId,
};
use common::*;
use std::collections::HashSet;

fn pending_count(steps: &[ApprovalStep]) -> usize {
    steps.iter().filter(|s| s.status == StepStatus::Pending).count()
}

async fn create(h: &Harness, target_type: &str) -> InstanceId {
    h.machine
        .create_workflow(target_type, "target", &UserId::new("u-student"), Metadata::new())
        .await
        .unwrap()
        .id
}

fn approver_for(step_key: &str) -> Approver {
    match step_key {
        "gm" => general_manager(),
        "lead" => team_lead(),
        "cfo" => cfo(),
        _ => exam_admin(),
    }
}

/// Approve every step in order, checking the invariants after each call
#[tokio::test]
async fn test_single_pending_and_monotonic_index_through_every_workflow() {
    let h = harness();

    for target_type in [USER_REGISTRATION, STUDENT_ENROLLMENT, REWARD_APPLICATION, USER_ROLE_UPGRADE, EXPENSE_CLAIM, WITH_OPTIONAL] {
        let id = create(&h, target_type).await;
        let mut last_index = 0;

        loop {
            let state = h.machine.get_workflow(&id).await.unwrap();
            let orders: Vec<usize> = state.steps.iter().map(|s| s.step_order).collect();
            assert_eq!(orders, (0..state.steps.len()).collect::<Vec<_>>());

            if state.instance.status != InstanceStatus::InProgress {
                assert_eq!(state.instance.status, InstanceStatus::Completed);
                assert!(state.instance.completed_at.is_some());
                assert_eq!(pending_count(&state.steps), 0);
                break;
            }

            assert_eq!(pending_count(&state.steps), 1, "{} has one pending step", target_type);
            let current = state.current_step.unwrap();
            assert_eq!(current.step_order, state.instance.current_step_index);

            // Lowest-order required step among NOT_STARTED/PENDING
            let lowest = state
                .steps
                .iter()
                .filter(|s| s.is_required && matches!(s.status, StepStatus::NotStarted | StepStatus::Pending))
                .map(|s| s.step_order)
                .min();
            assert_eq!(lowest, Some(current.step_order));

            let outcome = h
                .machine
                .process_approval(&id, ApprovalAction::Approve, &current.step_key, &approver_for(&current.step_key), None)
                .await
                .unwrap();
            assert!(outcome.state.instance.current_step_index >= last_index);
            last_index = outcome.state.instance.current_step_index;
        }
    }
}

#[tokio::test]
async fn test_rejection_is_absorbing() {
    let h = harness();
    let id = create(&h, REWARD_APPLICATION).await;
    h.machine
        .process_approval(&id, ApprovalAction::Reject, "exam", &exam_admin(), None)
        .await
        .unwrap();
    let frozen = h.store.load_aggregate(&id).await.unwrap();

    for key in ["exam", "gm", "finance"] {
        for action in [ApprovalAction::Approve, ApprovalAction::Reject, ApprovalAction::Skip] {
            let err = h
                .machine
                .process_approval(&id, action, key, &Approver::new("u-both", "Li Na"), None)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::StepNotPending);
        }
    }

    let err = h.machine.cancel_workflow(&id, &general_manager(), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InstanceClosed);

    assert_eq!(h.store.load_aggregate(&id).await.unwrap(), frozen);
}

#[tokio::test]
async fn test_disjoint_roles_always_denied() {
    let h = harness();
    let id = create(&h, EXPENSE_CLAIM).await;
    let before = h.store.load_aggregate(&id).await.unwrap();

    for approver in [student(), exam_admin(), Approver::new("stranger", "Unknown")] {
        for action in [ApprovalAction::Approve, ApprovalAction::Reject, ApprovalAction::Skip] {
            let err = h
                .machine
                .process_approval(&id, action, "lead", &approver, None)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PermissionDenied, "{} {}", approver.id, action);
        }
    }

    assert_eq!(h.store.load_aggregate(&id).await.unwrap(), before);
    assert!(h.audit.records().is_empty());
}

#[tokio::test]
async fn test_permission_checked_before_skip_rule() {
    let h = harness();
    let id = create(&h, REWARD_APPLICATION).await;

    // A stranger asking to skip a non-skippable step is a permission problem first
    let err = h
        .machine
        .process_approval(&id, ApprovalAction::Skip, "exam", &student(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[tokio::test]
async fn test_wrong_step_key_is_not_pending() {
    let h = harness();
    let id = create(&h, REWARD_APPLICATION).await;

    for key in ["gm", "finance", "nonexistent"] {
        let err = h
            .machine
            .process_approval(&id, ApprovalAction::Approve, key, &Approver::new("u-both", "Li Na"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StepNotPending);
    }
}

#[tokio::test]
async fn test_distinct_instances_do_not_share_steps_or_interfere() {
    let h = harness();
    let first = create(&h, REWARD_APPLICATION).await;
    let second = create(&h, REWARD_APPLICATION).await;
    assert_ne!(first, second);

    let first_steps = h.store.load_steps(&first).await.unwrap();
    let second_steps = h.store.load_steps(&second).await.unwrap();
    let ids: HashSet<String> = first_steps
        .iter()
        .chain(second_steps.iter())
        .map(|s| s.id.as_str().to_string())
        .collect();
    assert_eq!(ids.len(), 6);

    h.machine
        .process_approval(&first, ApprovalAction::Reject, "exam", &exam_admin(), None)
        .await
        .unwrap();

    let untouched = h.machine.get_workflow(&second).await.unwrap();
    assert_eq!(untouched.instance.status, InstanceStatus::InProgress);
    assert_eq!(untouched.steps[0].status, StepStatus::Pending);
}

#[tokio::test]
async fn test_workflow_config_is_a_snapshot() {
    let h = harness();
    let id = create(&h, STUDENT_ENROLLMENT).await;

    let state = h.machine.get_workflow(&id).await.unwrap();
    let expected = h.machine.catalog().definition(STUDENT_ENROLLMENT).unwrap();
    assert_eq!(&state.instance.workflow_config, expected);
    for (step, template) in state.steps.iter().zip(expected.steps.iter()) {
        assert_eq!(step.step_key, template.step_key);
        assert_eq!(step.step_name, template.name);
        assert_eq!(step.approver_roles, template.roles);
        assert_eq!(step.is_required, template.required);
        assert_eq!(step.can_skip, template.can_skip);
    }
}
