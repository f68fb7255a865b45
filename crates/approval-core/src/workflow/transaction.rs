//! Explicit transaction handle over one instance aggregate

use approval_types::{ApprovalInstance, ApprovalStep, InstanceId};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::locks::{InstanceLease, InstanceLocks};
use super::traits::{InstanceStore, StoreLease};
use crate::error::Result;

/// Loaded aggregate plus the leases that guard it.
///
/// The in-process lease serializes engines sharing one `InstanceLocks`; the
/// store lease serializes every engine over the same backing data. Both are
/// taken before the load, so the copy here is never stale. Mutations happen on the in-memory copy. `commit` writes instance and
/// steps in one store call; dropping the handle without committing discards
/// every change and releases the lock.
pub struct AggregateTransaction {
    _store_lease: Option<Box<dyn StoreLease>>,
    _lease: InstanceLease,
    store: Arc<dyn InstanceStore>,
    pub instance: ApprovalInstance,
    pub steps: Vec<ApprovalStep>,
}

impl AggregateTransaction {
    /// Lock the instance in process and in the store, then load it with its
    /// steps. `timeout` bounds both waits together.
    pub async fn begin(
        locks: &InstanceLocks,
        store: Arc<dyn InstanceStore>,
        instance_id: &InstanceId,
        timeout: Duration,
    ) -> Result<Self> {
        let started = Instant::now();
        let lease = locks.acquire(instance_id, timeout).await?;
        let store_lease = store
            .lock_aggregate(instance_id, timeout.saturating_sub(started.elapsed()))
            .await?;

        let (instance, mut steps) = store.load_aggregate(instance_id).await?;
        steps.sort_by_key(|step| step.step_order);

        Ok(Self {
            _store_lease: store_lease,
            _lease: lease,
            store,
            instance,
            steps,
        })
    }

    /// Persist the aggregate and release the lock
    pub async fn commit(self) -> Result<(ApprovalInstance, Vec<ApprovalStep>)> {
        self.store.save_aggregate(&self.instance, &self.steps).await?;
        log::debug!(
            "Committed instance {} ({}, step index {})",
            self.instance.id,
            self.instance.status,
            self.instance.current_step_index
        );
        Ok((self.instance, self.steps))
    }
}
