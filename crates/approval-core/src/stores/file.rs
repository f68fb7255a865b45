//! File-backed instance store
//!
//! One JSON document per aggregate under `<root>/instances/`. Writes go to a
//! scratch file first and are renamed into place, so readers only ever see a
//! complete instance together with its complete step list.
//!
//! Writers take an exclusive OS lock on `instance_<id>.lock` for the whole
//! load-mutate-save cycle, so engines in separate processes sharing one data
//! directory never interleave on the same instance.

use approval_types::{ApprovalInstance, ApprovalStep, InstanceId};
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{ApprovalError, Result};
use crate::paths;
use crate::workflow::traits::{InstanceStore, StoreLease};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Serialize, Deserialize)]
struct AggregateDocument {
    instance: ApprovalInstance,
    steps: Vec<ApprovalStep>,
}

/// OS lock on one instance's lock file, released when dropped
struct FileLease {
    instance_id: InstanceId,
    file: File,
}

impl StoreLease for FileLease {}

impl Drop for FileLease {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log::warn!("Failed to unlock instance {}: {}", self.instance_id, e);
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Durable store writing one file per instance aggregate
pub struct FileInstanceStore {
    root_path: PathBuf,
}

impl FileInstanceStore {
    /// Create the store, making the directory layout if needed
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        fs::create_dir_all(paths::instances_dir(&root_path))?;

        Ok(Self { root_path })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn read_document(&self, instance_id: &InstanceId) -> Result<AggregateDocument> {
        let path = paths::instance_file(&self.root_path, instance_id);
        if !path.exists() {
            return Err(ApprovalError::InstanceNotFound(instance_id.clone()));
        }

        let json = fs::read_to_string(&path)?;
        serde_json::from_str(&json).map_err(|e| {
            ApprovalError::Storage(format!("Failed to deserialize instance {}: {}", instance_id, e))
        })
    }

    fn write_document(&self, instance: &ApprovalInstance, steps: &[ApprovalStep]) -> Result<()> {
        let document = AggregateDocument {
            instance: instance.clone(),
            steps: steps.to_vec(),
        };
        let json = serde_json::to_string_pretty(&document).map_err(|e| {
            ApprovalError::Storage(format!("Failed to serialize instance {}: {}", instance.id, e))
        })?;

        let temp_path = paths::instance_temp_file(&self.root_path, &instance.id);
        let final_path = paths::instance_file(&self.root_path, &instance.id);
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &final_path)?;

        log::debug!("Wrote instance {} to {:?}", instance.id, final_path);
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for FileInstanceStore {
    async fn lock_aggregate(&self, id: &InstanceId, timeout: Duration) -> Result<Option<Box<dyn StoreLease>>> {
        let path = paths::instance_lock_file(&self.root_path, id);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    log::debug!("Locked {:?}", path);
                    return Ok(Some(Box::new(FileLease {
                        instance_id: id.clone(),
                        file,
                    })));
                }
                Err(e) if is_contended(&e) => {}
                Err(e) => return Err(e.into()),
            }

            if started.elapsed() >= timeout {
                log::warn!(
                    "Instance {} is locked by another engine; gave up after {}ms",
                    id,
                    timeout.as_millis()
                );
                return Err(ApprovalError::Busy {
                    instance_id: id.clone(),
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    async fn load_instance(&self, id: &InstanceId) -> Result<ApprovalInstance> {
        Ok(self.read_document(id)?.instance)
    }

    async fn load_steps(&self, instance_id: &InstanceId) -> Result<Vec<ApprovalStep>> {
        let mut steps = self.read_document(instance_id)?.steps;
        steps.sort_by_key(|step| step.step_order);
        Ok(steps)
    }

    async fn load_aggregate(&self, id: &InstanceId) -> Result<(ApprovalInstance, Vec<ApprovalStep>)> {
        let mut document = self.read_document(id)?;
        document.steps.sort_by_key(|step| step.step_order);
        Ok((document.instance, document.steps))
    }

    async fn insert_aggregate(&self, instance: &ApprovalInstance, steps: &[ApprovalStep]) -> Result<()> {
        if paths::instance_file(&self.root_path, &instance.id).exists() {
            return Err(ApprovalError::Storage(format!(
                "Instance {} already exists",
                instance.id
            )));
        }
        self.write_document(instance, steps)
    }

    async fn save_aggregate(&self, instance: &ApprovalInstance, steps: &[ApprovalStep]) -> Result<()> {
        self.write_document(instance, steps)
    }

    async fn list_instances(&self) -> Result<Vec<ApprovalInstance>> {
        let dir = paths::instances_dir(&self.root_path);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut instances = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !paths::is_instance_file(&path) {
                continue;
            }

            let json = fs::read_to_string(&path)?;
            match serde_json::from_str::<AggregateDocument>(&json) {
                Ok(document) => instances.push(document.instance),
                Err(e) => log::warn!("Skipping unreadable instance file {:?}: {}", path, e),
            }
        }

        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use approval_types::{
        InstanceStatus, Metadata, StepId, StepStatus, StepTemplate, UserId, WorkflowDefinition,
    };
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_aggregate(id: &str) -> (ApprovalInstance, Vec<ApprovalStep>) {
        let definition = WorkflowDefinition::new(
            "student_enrollment",
            vec![
                StepTemplate::new("exam", "Exam", ["exam_admin"]),
                StepTemplate::new("gm", "GM", ["general_manager"]),
            ],
        );
        let instance_id = InstanceId::new(id);
        let now = Utc::now();
        let mut steps: Vec<ApprovalStep> = definition
            .steps
            .iter()
            .enumerate()
            .map(|(i, t)| ApprovalStep::from_template(StepId::new(format!("{}-s{}", id, i)), instance_id.clone(), i, t))
            .collect();
        steps[0].status = StepStatus::Pending;

        let instance = ApprovalInstance {
            id: instance_id,
            target_type: definition.target_type.clone(),
            target_id: "student-7".to_string(),
            status: InstanceStatus::InProgress,
            current_step_index: 0,
            workflow_config: definition,
            metadata: Metadata::new(),
            created_by: UserId::new("creator"),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        (instance, steps)
    }

    #[test]
    fn test_store_creation_makes_directories() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileInstanceStore::new(temp_dir.path()).unwrap();

        assert!(temp_dir.path().join("instances").exists());
        assert_eq!(store.root_path(), temp_dir.path());
    }

    #[tokio::test]
    async fn test_insert_and_load_aggregate() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileInstanceStore::new(temp_dir.path()).unwrap();
        let (instance, steps) = sample_aggregate("inst-1");

        store.insert_aggregate(&instance, &steps).await.unwrap();

        let loaded = store.load_instance(&instance.id).await.unwrap();
        assert_eq!(loaded, instance);
        let loaded_steps = store.load_steps(&instance.id).await.unwrap();
        assert_eq!(loaded_steps, steps);

        assert!(temp_dir.path().join("instances").join("instance_inst-1.json").exists());
        assert!(!temp_dir.path().join("instances").join("instance_inst-1.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_insert_rejects_existing_id() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileInstanceStore::new(temp_dir.path()).unwrap();
        let (instance, steps) = sample_aggregate("inst-1");

        store.insert_aggregate(&instance, &steps).await.unwrap();
        let err = store.insert_aggregate(&instance, &steps).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[tokio::test]
    async fn test_missing_instance_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileInstanceStore::new(temp_dir.path()).unwrap();

        let err = store.load_instance(&InstanceId::new("nope")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InstanceNotFound);
        let err = store.load_steps(&InstanceId::new("nope")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InstanceNotFound);
    }

    #[tokio::test]
    async fn test_save_replaces_whole_aggregate() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileInstanceStore::new(temp_dir.path()).unwrap();
        let (mut instance, mut steps) = sample_aggregate("inst-1");
        store.insert_aggregate(&instance, &steps).await.unwrap();

        steps[0].status = StepStatus::Approved;
        steps[1].status = StepStatus::Pending;
        instance.current_step_index = 1;
        store.save_aggregate(&instance, &steps).await.unwrap();

        let loaded = store.load_instance(&instance.id).await.unwrap();
        assert_eq!(loaded.current_step_index, 1);
        let loaded_steps = store.load_steps(&instance.id).await.unwrap();
        assert_eq!(loaded_steps[0].status, StepStatus::Approved);
        assert_eq!(loaded_steps[1].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_aggregates_persist_across_restart() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = temp_dir.path().to_path_buf();

        {
            let store = FileInstanceStore::new(&temp_path).unwrap();
            for id in ["inst-1", "inst-2"] {
                let (instance, steps) = sample_aggregate(id);
                store.insert_aggregate(&instance, &steps).await.unwrap();
            }
        }

        let store = FileInstanceStore::new(&temp_path).unwrap();
        let mut ids: Vec<String> = store
            .list_instances()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id.as_str().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["inst-1", "inst-2"]);
    }

    #[tokio::test]
    async fn test_list_skips_foreign_and_corrupt_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileInstanceStore::new(temp_dir.path()).unwrap();
        let (instance, steps) = sample_aggregate("inst-1");
        store.insert_aggregate(&instance, &steps).await.unwrap();

        let instances_dir = temp_dir.path().join("instances");
        fs::write(instances_dir.join("instance_broken.json"), "{ not json").unwrap();
        fs::write(instances_dir.join("README.txt"), "hello").unwrap();
        fs::write(instances_dir.join("instance_half.json.tmp"), "{}").unwrap();
        fs::write(instances_dir.join("instance_inst-1.lock"), "").unwrap();

        let listed = store.list_instances().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, instance.id);
    }

    #[tokio::test]
    async fn test_lock_excludes_second_handle_until_released() {
        let temp_dir = TempDir::new().unwrap();
        let first = FileInstanceStore::new(temp_dir.path()).unwrap();
        let second = FileInstanceStore::new(temp_dir.path()).unwrap();
        let id = InstanceId::new("inst-1");

        let lease = first
            .lock_aggregate(&id, Duration::from_millis(100))
            .await
            .unwrap();
        assert!(lease.is_some());
        assert!(temp_dir.path().join("instances").join("instance_inst-1.lock").exists());

        let err = second
            .lock_aggregate(&id, Duration::from_millis(50))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Busy);

        // Other instances are unaffected
        assert!(second
            .lock_aggregate(&InstanceId::new("inst-2"), Duration::from_millis(50))
            .await
            .is_ok());

        drop(lease);
        assert!(second
            .lock_aggregate(&id, Duration::from_millis(50))
            .await
            .unwrap()
            .is_some());
    }
}
