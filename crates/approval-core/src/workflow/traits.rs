//! Ports the state machine calls through
//!
//! The engine owns no I/O. Storage, role lookup, id allocation, notification
//! and audit are all reached through these traits so they can be swapped
//! for real backends or mocked in tests.

use approval_types::{
    ApprovalInstance, ApprovalStep, AuditRecord, InstanceId, UserId, WorkflowAction,
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::Result;

/// Exclusive hold on one stored aggregate, released on drop
pub trait StoreLease: Send + Sync {}

/// Durable storage of instance aggregates
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Exclusive hold on `id` that every other handle over the same backing
    /// data honours, including ones in other processes. Fails with `Busy`
    /// after `timeout`. Stores reachable from one engine only need no hold.
    async fn lock_aggregate(&self, _id: &InstanceId, _timeout: Duration) -> Result<Option<Box<dyn StoreLease>>> {
        Ok(None)
    }

    /// Fails with `InstanceNotFound` when absent
    async fn load_instance(&self, id: &InstanceId) -> Result<ApprovalInstance>;

    /// Steps of an instance, ordered by `step_order`
    async fn load_steps(&self, instance_id: &InstanceId) -> Result<Vec<ApprovalStep>>;

    /// Instance and steps together. Stores that keep the aggregate in one
    /// record should override this to read it once.
    async fn load_aggregate(&self, id: &InstanceId) -> Result<(ApprovalInstance, Vec<ApprovalStep>)> {
        let instance = self.load_instance(id).await?;
        let steps = self.load_steps(id).await?;
        Ok((instance, steps))
    }

    /// Persist a newly created aggregate. Fails if the id is already taken.
    async fn insert_aggregate(&self, instance: &ApprovalInstance, steps: &[ApprovalStep]) -> Result<()>;

    /// Replace instance and steps as one atomic write
    async fn save_aggregate(&self, instance: &ApprovalInstance, steps: &[ApprovalStep]) -> Result<()>;

    /// Every stored instance, in no particular order
    async fn list_instances(&self) -> Result<Vec<ApprovalInstance>>;
}

/// Lookup of the roles a user holds
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Unknown users have no roles; this is not an error
    async fn user_roles(&self, user_id: &UserId) -> Result<BTreeSet<String>>;
}

/// Allocation of unique instance and step identifiers
pub trait IdGenerator: Send + Sync {
    fn generate_id(&self) -> String;
}

/// Delivery of workflow notifications. Best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        instance: &ApprovalInstance,
        steps: &[ApprovalStep],
        action: WorkflowAction,
    ) -> Result<()>;
}

/// Append-only record of every decision and cancellation
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: &AuditRecord) -> Result<()>;
}
