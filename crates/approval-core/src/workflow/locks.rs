//! Per-instance aggregate locks
//!
//! Every mutation of an instance runs while holding that instance's lock, so
//! two decisions on the same aggregate are serialized while unrelated
//! instances proceed independently. Acquisition is bounded; a caller that
//! cannot get the lock in time fails with `Busy` instead of queueing forever.

use approval_types::InstanceId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{ApprovalError, Result};

type Registry = Arc<Mutex<HashMap<InstanceId, Arc<AsyncMutex<()>>>>>;

/// Registry of instance locks, keyed by instance id
#[derive(Debug, Clone, Default)]
pub struct InstanceLocks {
    registry: Registry,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for exclusive access to one instance
    pub async fn acquire(&self, instance_id: &InstanceId, timeout: Duration) -> Result<InstanceLease> {
        let slot = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry
                .entry(instance_id.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        log::debug!("Waiting for lock on instance {}", instance_id);

        // The timed-out future owns a clone of the slot; it must be gone
        // before `prune` counts references.
        let acquired = tokio::time::timeout(timeout, slot.lock_owned()).await;
        match acquired {
            Ok(guard) => Ok(InstanceLease {
                instance_id: instance_id.clone(),
                guard: Some(guard),
                registry: self.registry.clone(),
            }),
            Err(_) => {
                prune(&self.registry, instance_id);
                log::warn!(
                    "Lock on instance {} not acquired within {}ms",
                    instance_id,
                    timeout.as_millis()
                );
                Err(ApprovalError::Busy {
                    instance_id: instance_id.clone(),
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Number of instances with a live lock entry (held or awaited)
    pub fn active(&self) -> usize {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Exclusive access to one instance. Released on drop.
#[derive(Debug)]
pub struct InstanceLease {
    instance_id: InstanceId,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Registry,
}

impl InstanceLease {
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }
}

impl Drop for InstanceLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune(&self.registry, &self.instance_id);
        log::debug!("Released lock on instance {}", self.instance_id);
    }
}

/// Drop the registry entry once nobody holds or awaits it
fn prune(registry: &Registry, instance_id: &InstanceId) {
    let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(slot) = registry.get(instance_id) {
        if Arc::strong_count(slot) == 1 {
            registry.remove(instance_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_second_acquire_times_out_while_held() {
        let locks = InstanceLocks::new();
        let id = InstanceId::new("inst-1");

        let lease = locks.acquire(&id, Duration::from_millis(50)).await.unwrap();
        assert_eq!(lease.instance_id(), &id);

        let err = locks.acquire(&id, Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);

        drop(lease);
        assert!(locks.acquire(&id, Duration::from_millis(20)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unrelated_instances_do_not_block() {
        let locks = InstanceLocks::new();
        let _a = locks.acquire(&InstanceId::new("a"), Duration::from_millis(20)).await.unwrap();
        let _b = locks.acquire(&InstanceId::new("b"), Duration::from_millis(20)).await.unwrap();
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn test_entries_pruned_after_release() {
        let locks = InstanceLocks::new();
        {
            let _lease = locks.acquire(&InstanceId::new("a"), Duration::from_millis(20)).await.unwrap();
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let locks = InstanceLocks::new();
        let id = InstanceId::new("inst-1");
        let lease = locks.acquire(&id, Duration::from_millis(50)).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move { locks.acquire(&id, Duration::from_secs(2)).await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(lease);

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_waiters_leave_no_entries() {
        let locks = Arc::new(InstanceLocks::new());
        let id = InstanceId::new("inst-1");

        let lease = locks.acquire(&id, Duration::from_millis(50)).await.unwrap();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let locks = locks.clone();
                let id = id.clone();
                tokio::spawn(async move { locks.acquire(&id, Duration::from_millis(20)).await.map(|_| ()) })
            })
            .collect();
        for waiter in waiters {
            let err = waiter.await.unwrap().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Busy);
        }
        assert_eq!(locks.active(), 1);

        drop(lease);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_release_racing_a_timeout_leaves_no_entry() {
        let locks = Arc::new(InstanceLocks::new());
        let id = InstanceId::new("inst-1");

        for _ in 0..20 {
            let lease = locks.acquire(&id, Duration::from_millis(50)).await.unwrap();
            let holder = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                drop(lease);
            });

            // Either outcome is fine; the registry must end up empty
            let _ = locks.acquire(&id, Duration::from_millis(5)).await;
            holder.await.unwrap();
            assert_eq!(locks.active(), 0);
        }
    }
}
