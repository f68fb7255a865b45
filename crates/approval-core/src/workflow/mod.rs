//! Workflow engine module

pub mod locks;
pub mod rules;
pub mod state_machine;
pub mod traits;
pub mod transaction;

pub use locks::{InstanceLease, InstanceLocks};
pub use state_machine::{ApprovalStateMachine, DecisionOutcome, EnginePorts, ListFilter};
pub use traits::{AuditLog, IdGenerator, InstanceStore, Notifier, RoleDirectory, StoreLease};
pub use transaction::AggregateTransaction;
