//! Approval Core Library
//!
//! Multi-step approval engine: the workflow catalog, the state machine that
//! creates instances and applies decisions, the ports it talks through, and
//! the stores and adapters that back them.

pub mod catalog;
pub mod clients;
pub mod config;
pub mod error;
pub mod paths;
pub mod stores;
pub mod workflow;

// Re-export main types for easy access
pub use catalog::WorkflowCatalog;
pub use config::EngineConfig;
pub use error::{ApprovalError, ErrorKind, Result, SideEffect, SideEffectWarning};

// Re-export adapters
pub use clients::{FileAuditLog, LogNotifier, MemoryAuditLog, StaticRoleDirectory, UserProfile, UuidIdGenerator};
pub use stores::{FileInstanceStore, MemoryInstanceStore};

// Re-export workflow types
pub use workflow::{
    ApprovalStateMachine,
    AuditLog,
    DecisionOutcome,
    EnginePorts,
    IdGenerator,
    InstanceLocks,
    InstanceStore,
    ListFilter,
    Notifier,
    RoleDirectory,
    StoreLease,
};
