//! Shared fixtures for the engine integration tests
#![allow(dead_code)]

use approval_core::catalog::{ROLE_EXAM_ADMIN, ROLE_GENERAL_MANAGER};
use approval_core::{
    ApprovalStateMachine, EnginePorts, LogNotifier, MemoryAuditLog, MemoryInstanceStore,
    StaticRoleDirectory, UserProfile, UuidIdGenerator, WorkflowCatalog,
};
use approval_types::{Approver, StepTemplate, WorkflowDefinition};
use std::sync::Arc;

pub const EXPENSE_CLAIM: &str = "expense_claim";
pub const WITH_OPTIONAL: &str = "with_optional";

pub struct Harness {
    pub machine: ApprovalStateMachine,
    pub store: Arc<MemoryInstanceStore>,
    pub audit: Arc<MemoryAuditLog>,
}

pub fn directory() -> StaticRoleDirectory {
    StaticRoleDirectory::default()
        .with_user("u-exam", UserProfile::new("Wang Fang", [ROLE_EXAM_ADMIN]))
        .with_user("u-gm", UserProfile::new("Zhang Wei", [ROLE_GENERAL_MANAGER]))
        .with_user("u-both", UserProfile::new("Li Na", [ROLE_EXAM_ADMIN, ROLE_GENERAL_MANAGER]))
        .with_user("u-student", UserProfile::new("Sun Hao", ["student"]))
        .with_user("u-lead", UserProfile::new("Chen Jie", ["team_lead"]))
        .with_user("u-cfo", UserProfile::new("Liu Yang", ["cfo"]))
        .with_user("u-clerk", UserProfile::new("Zhou Lin", ["clerk"]))
}

/// Built-in workflows plus two custom ones exercising skip and optional steps
pub fn test_catalog() -> WorkflowCatalog {
    let mut definitions: Vec<WorkflowDefinition> = WorkflowCatalog::builtin().definitions().cloned().collect();
    definitions.push(WorkflowDefinition::new(
        EXPENSE_CLAIM,
        vec![
            StepTemplate::new("lead", "Team lead review", ["team_lead"]).skippable(),
            StepTemplate::new("cfo", "CFO sign-off", ["cfo"]),
        ],
    ));
    definitions.push(WorkflowDefinition::new(
        WITH_OPTIONAL,
        vec![
            StepTemplate::new("exam", "Exam office review", [ROLE_EXAM_ADMIN]),
            StepTemplate::new("notes", "Clerk notes", ["clerk"]).optional(),
            StepTemplate::new("gm", "General manager approval", [ROLE_GENERAL_MANAGER]),
        ],
    ));
    WorkflowCatalog::from_definitions(definitions).expect("test catalog is valid")
}

pub fn memory_ports(store: Arc<MemoryInstanceStore>, audit: Arc<MemoryAuditLog>) -> EnginePorts {
    EnginePorts {
        store,
        roles: Arc::new(directory()),
        ids: Arc::new(UuidIdGenerator),
        notifier: Arc::new(LogNotifier),
        audit,
    }
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryInstanceStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let machine = ApprovalStateMachine::new(test_catalog(), memory_ports(store.clone(), audit.clone()));
    Harness { machine, store, audit }
}

pub fn exam_admin() -> Approver {
    Approver::new("u-exam", "Wang Fang")
}

pub fn general_manager() -> Approver {
    Approver::new("u-gm", "Zhang Wei")
}

pub fn student() -> Approver {
    Approver::new("u-student", "Sun Hao")
}

pub fn team_lead() -> Approver {
    Approver::new("u-lead", "Chen Jie")
}

pub fn cfo() -> Approver {
    Approver::new("u-cfo", "Liu Yang")
}
