//! In-process instance store

use approval_types::{ApprovalInstance, ApprovalStep, InstanceId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::{ApprovalError, Result};
use crate::workflow::traits::InstanceStore;

#[derive(Debug, Clone)]
struct StoredAggregate {
    instance: ApprovalInstance,
    steps: Vec<ApprovalStep>,
}

/// Aggregates kept in a map. Each save swaps instance and steps under one
/// mutex acquisition.
#[derive(Debug, Default)]
pub struct MemoryInstanceStore {
    aggregates: Mutex<HashMap<InstanceId, StoredAggregate>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.aggregates.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn load_instance(&self, id: &InstanceId) -> Result<ApprovalInstance> {
        let aggregates = self.aggregates.lock().unwrap_or_else(PoisonError::into_inner);
        aggregates
            .get(id)
            .map(|stored| stored.instance.clone())
            .ok_or_else(|| ApprovalError::InstanceNotFound(id.clone()))
    }

    async fn load_steps(&self, instance_id: &InstanceId) -> Result<Vec<ApprovalStep>> {
        let aggregates = self.aggregates.lock().unwrap_or_else(PoisonError::into_inner);
        let mut steps = aggregates
            .get(instance_id)
            .map(|stored| stored.steps.clone())
            .ok_or_else(|| ApprovalError::InstanceNotFound(instance_id.clone()))?;
        steps.sort_by_key(|step| step.step_order);
        Ok(steps)
    }

    async fn load_aggregate(&self, id: &InstanceId) -> Result<(ApprovalInstance, Vec<ApprovalStep>)> {
        let aggregates = self.aggregates.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = aggregates
            .get(id)
            .ok_or_else(|| ApprovalError::InstanceNotFound(id.clone()))?;
        let mut steps = stored.steps.clone();
        steps.sort_by_key(|step| step.step_order);
        Ok((stored.instance.clone(), steps))
    }

    async fn insert_aggregate(&self, instance: &ApprovalInstance, steps: &[ApprovalStep]) -> Result<()> {
        let mut aggregates = self.aggregates.lock().unwrap_or_else(PoisonError::into_inner);
        if aggregates.contains_key(&instance.id) {
            return Err(ApprovalError::Storage(format!(
                "Instance {} already exists",
                instance.id
            )));
        }
        aggregates.insert(
            instance.id.clone(),
            StoredAggregate {
                instance: instance.clone(),
                steps: steps.to_vec(),
            },
        );
        Ok(())
    }

    async fn save_aggregate(&self, instance: &ApprovalInstance, steps: &[ApprovalStep]) -> Result<()> {
        let mut aggregates = self.aggregates.lock().unwrap_or_else(PoisonError::into_inner);
        aggregates.insert(
            instance.id.clone(),
            StoredAggregate {
                instance: instance.clone(),
                steps: steps.to_vec(),
            },
        );
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<ApprovalInstance>> {
        let aggregates = self.aggregates.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(aggregates.values().map(|stored| stored.instance.clone()).collect())
    }
}
