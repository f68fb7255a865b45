//! Notification delivered as log records

use approval_types::{ApprovalInstance, ApprovalStep, WorkflowAction};
use async_trait::async_trait;

use crate::error::Result;
use crate::workflow::traits::Notifier;

/// Writes one `info` line per notification. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        instance: &ApprovalInstance,
        steps: &[ApprovalStep],
        action: WorkflowAction,
    ) -> Result<()> {
        let pending = steps
            .iter()
            .find(|step| step.is_pending())
            .map(|step| step.step_key.as_str())
            .unwrap_or("-");

        log::info!(
            "notify action={} instance={} target={}/{} status={} pending_step={}",
            action,
            instance.id,
            instance.target_type,
            instance.target_id,
            instance.status,
            pending
        );
        Ok(())
    }
}
