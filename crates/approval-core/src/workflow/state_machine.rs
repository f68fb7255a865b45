//! Approval state machine: creation, decisions, cancellation and queries
//!
//! Every mutating call runs as load, validate, mutate, persist inside an
//! [`AggregateTransaction`]. Notification and audit run only after the commit
//! and can never undo it; their failures come back as warnings.

use approval_types::{
    ApprovalAction, ApprovalInstance, ApprovalStep, Approver, AuditRecord, DecisionRequest,
    InstanceId, InstanceStatus, Metadata, Page, UserId, WorkflowAction, WorkflowState,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::locks::InstanceLocks;
use super::rules;
use super::traits::{AuditLog, IdGenerator, InstanceStore, Notifier, RoleDirectory};
use super::transaction::AggregateTransaction;
use crate::catalog::WorkflowCatalog;
use crate::clients::{FileAuditLog, LogNotifier, UuidIdGenerator};
use crate::config::EngineConfig;
use crate::error::{ApprovalError, Result, SideEffect, SideEffectWarning};
use crate::stores::FileInstanceStore;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// The collaborators the engine reaches through its ports
#[derive(Clone)]
pub struct EnginePorts {
    pub store: Arc<dyn InstanceStore>,
    pub roles: Arc<dyn RoleDirectory>,
    pub ids: Arc<dyn IdGenerator>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditLog>,
}

impl EnginePorts {
    /// File store, configured users, UUID ids, log notifications and a JSONL audit file
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            store: Arc::new(FileInstanceStore::new(config.data_dir())?),
            roles: Arc::new(config.role_directory()),
            ids: Arc::new(UuidIdGenerator),
            notifier: Arc::new(LogNotifier),
            audit: Arc::new(FileAuditLog::new(config.audit_file())?),
        })
    }
}

/// Result of a committed transition
#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub state: WorkflowState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<SideEffectWarning>,
}

/// Listing filter. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    pub target_type: Option<String>,
    pub status: Option<InstanceStatus>,
    pub page: usize,
    pub page_size: usize,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            target_type: None,
            status: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListFilter {
    fn matches(&self, instance: &ApprovalInstance) -> bool {
        self.target_type
            .as_deref()
            .map_or(true, |t| instance.target_type == t)
            && self.status.map_or(true, |s| instance.status == s)
    }
}

pub struct ApprovalStateMachine {
    ports: EnginePorts,
    catalog: WorkflowCatalog,
    locks: InstanceLocks,
    lock_timeout: Duration,
}

impl ApprovalStateMachine {
    pub fn new(catalog: WorkflowCatalog, ports: EnginePorts) -> Self {
        Self {
            ports,
            catalog,
            locks: InstanceLocks::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Wire the engine from configuration
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let machine = Self::new(config.catalog()?, EnginePorts::from_config(config)?)
            .with_lock_timeout(config.lock_timeout());
        Ok(machine)
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn catalog(&self) -> &WorkflowCatalog {
        &self.catalog
    }

    /// Start a new approval for `target_id` using the workflow registered
    /// for `target_type`
    pub async fn create_workflow(
        &self,
        target_type: &str,
        target_id: &str,
        created_by: &UserId,
        metadata: Metadata,
    ) -> Result<ApprovalInstance> {
        let definition = self.catalog.definition(target_type)?;

        let (instance, steps) = rules::build_aggregate(
            self.ports.ids.as_ref(),
            definition,
            target_id,
            created_by,
            metadata,
            Utc::now(),
        );
        self.ports.store.insert_aggregate(&instance, &steps).await?;

        log::info!(
            "Created {} instance {} for target {} ({} steps, status {})",
            instance.target_type,
            instance.id,
            instance.target_id,
            steps.len(),
            instance.status
        );
        Ok(instance)
    }

    /// Parse and apply a caller's decision request.
    ///
    /// An unknown action fails before the instance is locked or loaded.
    pub async fn process_request(
        &self,
        instance_id: &InstanceId,
        request: &DecisionRequest,
        approver: &Approver,
    ) -> Result<DecisionOutcome> {
        let action = request.parse_action()?;
        self.process_approval(
            instance_id,
            action,
            &request.step_key,
            approver,
            request.reason.clone(),
        )
        .await
    }

    /// Decide the PENDING step `step_key` of an instance
    pub async fn process_approval(
        &self,
        instance_id: &InstanceId,
        action: ApprovalAction,
        step_key: &str,
        approver: &Approver,
        reason: Option<String>,
    ) -> Result<DecisionOutcome> {
        let mut tx = AggregateTransaction::begin(
            &self.locks,
            Arc::clone(&self.ports.store),
            instance_id,
            self.lock_timeout,
        )
        .await?;

        let step_idx = rules::find_pending_step(&tx.steps, step_key).ok_or_else(|| {
            ApprovalError::StepNotPending {
                instance_id: instance_id.clone(),
                step_key: step_key.to_string(),
            }
        })?;

        if tx.instance.status != InstanceStatus::InProgress {
            return Err(ApprovalError::InstanceClosed {
                instance_id: instance_id.clone(),
                status: tx.instance.status,
            });
        }

        let roles = self.ports.roles.user_roles(&approver.id).await?;
        if !tx.steps[step_idx].accepts_any_role(&roles) {
            log::warn!(
                "User {} denied on step '{}' of instance {}",
                approver.id,
                step_key,
                instance_id
            );
            return Err(ApprovalError::PermissionDenied {
                user_id: approver.id.clone(),
                step_key: step_key.to_string(),
            });
        }

        if action == ApprovalAction::Skip && !tx.steps[step_idx].can_skip {
            return Err(ApprovalError::SkipNotAllowed(step_key.to_string()));
        }

        let now = Utc::now();
        rules::apply_decision(
            &mut tx.instance,
            &mut tx.steps,
            step_idx,
            action,
            approver,
            reason.clone(),
            now,
        );

        let (instance, steps) = tx.commit().await?;
        log::info!(
            "{} '{}' on instance {} by {}: status {}, step index {}",
            action,
            step_key,
            instance.id,
            approver.id,
            instance.status,
            instance.current_step_index
        );

        let record = AuditRecord {
            instance_id: instance.id.clone(),
            action: action.into(),
            actor_id: approver.id.clone(),
            actor_name: approver.name.clone(),
            reason,
            recorded_at: now,
        };
        let warnings = self.run_side_effects(&instance, &steps, &record).await;

        Ok(DecisionOutcome {
            state: rules::project(instance, steps),
            warnings,
        })
    }

    /// Administrative cancellation of an IN_PROGRESS instance
    pub async fn cancel_workflow(
        &self,
        instance_id: &InstanceId,
        actor: &Approver,
        reason: Option<String>,
    ) -> Result<DecisionOutcome> {
        let mut tx = AggregateTransaction::begin(
            &self.locks,
            Arc::clone(&self.ports.store),
            instance_id,
            self.lock_timeout,
        )
        .await?;

        if tx.instance.status != InstanceStatus::InProgress {
            return Err(ApprovalError::InstanceClosed {
                instance_id: instance_id.clone(),
                status: tx.instance.status,
            });
        }

        let now = Utc::now();
        rules::cancel(&mut tx.instance, now);

        let (instance, steps) = tx.commit().await?;
        log::info!("Cancelled instance {} by {}", instance.id, actor.id);

        let record = AuditRecord {
            instance_id: instance.id.clone(),
            action: WorkflowAction::Cancel,
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            reason,
            recorded_at: now,
        };
        let warnings = self.run_side_effects(&instance, &steps, &record).await;

        Ok(DecisionOutcome {
            state: rules::project(instance, steps),
            warnings,
        })
    }

    /// Current state of one instance. Read-only, takes no lock.
    pub async fn get_workflow(&self, instance_id: &InstanceId) -> Result<WorkflowState> {
        let (instance, steps) = self.ports.store.load_aggregate(instance_id).await?;
        Ok(rules::project(instance, steps))
    }

    /// Whether `user_id` may decide the instance's PENDING step right now
    pub async fn can_user_decide(&self, instance_id: &InstanceId, user_id: &UserId) -> Result<bool> {
        let (instance, steps) = self.ports.store.load_aggregate(instance_id).await?;
        if instance.status != InstanceStatus::InProgress {
            return Ok(false);
        }

        match rules::current_step(&steps) {
            Some(step) => {
                let roles = self.ports.roles.user_roles(user_id).await?;
                Ok(step.accepts_any_role(&roles))
            }
            None => Ok(false),
        }
    }

    /// Newest first, filtered and paged
    pub async fn list_workflows(&self, filter: &ListFilter) -> Result<Page<WorkflowState>> {
        let page_size = filter.page_size.clamp(1, MAX_PAGE_SIZE);
        let page = filter.page.max(1);

        let mut instances: Vec<ApprovalInstance> = self
            .ports
            .store
            .list_instances()
            .await?
            .into_iter()
            .filter(|instance| filter.matches(instance))
            .collect();
        sort_newest_first(&mut instances);

        let total = instances.len();
        let pages = (total + page_size - 1) / page_size;

        let mut items = Vec::new();
        for listed in instances.into_iter().skip((page - 1) * page_size).take(page_size) {
            let (instance, steps) = self.ports.store.load_aggregate(&listed.id).await?;
            items.push(rules::project(instance, steps));
        }

        Ok(Page {
            items,
            total,
            page,
            page_size,
            pages,
        })
    }

    /// IN_PROGRESS instances whose PENDING step `user_id` is eligible to decide
    pub async fn pending_for(&self, user_id: &UserId, target_type: Option<&str>) -> Result<Vec<WorkflowState>> {
        let roles = self.ports.roles.user_roles(user_id).await?;
        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let mut instances: Vec<ApprovalInstance> = self
            .ports
            .store
            .list_instances()
            .await?
            .into_iter()
            .filter(|instance| instance.status == InstanceStatus::InProgress)
            .filter(|instance| target_type.map_or(true, |t| instance.target_type == t))
            .collect();
        sort_newest_first(&mut instances);

        let mut pending = Vec::new();
        for listed in instances {
            // Decide on the fresh pair; the listing may predate a commit
            let (instance, steps) = self.ports.store.load_aggregate(&listed.id).await?;
            let eligible = instance.status == InstanceStatus::InProgress
                && rules::current_step(&steps).map_or(false, |step| step.accepts_any_role(&roles));
            if eligible {
                pending.push(rules::project(instance, steps));
            }
        }
        Ok(pending)
    }

    async fn run_side_effects(
        &self,
        instance: &ApprovalInstance,
        steps: &[ApprovalStep],
        record: &AuditRecord,
    ) -> Vec<SideEffectWarning> {
        let mut warnings = Vec::new();

        if let Err(e) = self.ports.notifier.notify(instance, steps, record.action).await {
            log::warn!("Notification for instance {} failed: {}", instance.id, e);
            warnings.push(SideEffectWarning::new(SideEffect::Notify, &e));
        }

        if let Err(e) = self.ports.audit.record(record).await {
            log::warn!("Audit record for instance {} failed: {}", instance.id, e);
            warnings.push(SideEffectWarning::new(SideEffect::Audit, &e));
        }

        warnings
    }
}

fn sort_newest_first(instances: &mut [ApprovalInstance]) {
    instances.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}
