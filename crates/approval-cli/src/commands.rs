//! Subcommand handlers

use approval_core::{
    ApprovalError, ApprovalStateMachine, EngineConfig, ErrorKind, ListFilter, Result,
};
use approval_types::{Approver, DecisionRequest, InstanceId, InstanceStatus, Metadata, UserId};
use clap::ArgMatches;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

pub fn error_body(err: &ApprovalError) -> ErrorBody {
    ErrorBody {
        error: ErrorDetail {
            kind: err.kind(),
            message: err.to_string(),
        },
    }
}

/// 1 for caller mistakes, 2 for engine or storage faults
pub fn exit_code(err: &ApprovalError) -> i32 {
    if err.is_client_error() {
        1
    } else {
        2
    }
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> &'a str {
    // clap enforces `required(true)` before we get here
    matches.get_one::<String>(id).map(String::as_str).unwrap_or_default()
}

fn optional(matches: &ArgMatches, id: &str) -> Option<String> {
    matches.get_one::<String>(id).cloned()
}

/// Actor from `--user`, named by `--name` or the configured display name
fn actor(config: &EngineConfig, matches: &ArgMatches) -> Approver {
    let user_id = UserId::new(required(matches, "user"));
    let name = optional(matches, "name")
        .unwrap_or_else(|| config.role_directory().display_name(&user_id));
    Approver { id: user_id, name }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

pub async fn run(config: &EngineConfig, matches: &ArgMatches) -> Result<Value> {
    let machine = ApprovalStateMachine::from_config(config)?;

    match matches.subcommand() {
        Some(("catalog", _)) => {
            let catalog = machine.catalog();
            let definitions: Vec<_> = catalog
                .target_types()
                .into_iter()
                .filter_map(|t| catalog.get(t))
                .collect();
            to_value(&definitions)
        }
        Some(("create", sub)) => {
            let metadata = sub.get_one::<Metadata>("metadata").cloned().unwrap_or_default();
            let instance = machine
                .create_workflow(
                    required(sub, "type"),
                    required(sub, "target"),
                    &UserId::new(required(sub, "user")),
                    metadata,
                )
                .await?;
            let state = machine.get_workflow(&instance.id).await?;
            to_value(&state)
        }
        Some(("process", sub)) => {
            let request = DecisionRequest {
                action: required(sub, "action").to_string(),
                step_key: required(sub, "step").to_string(),
                reason: optional(sub, "reason"),
            };
            let instance_id = InstanceId::new(required(sub, "instance"));
            let outcome = machine
                .process_request(&instance_id, &request, &actor(config, sub))
                .await?;
            to_value(&outcome)
        }
        Some(("cancel", sub)) => {
            let instance_id = InstanceId::new(required(sub, "instance"));
            let outcome = machine
                .cancel_workflow(&instance_id, &actor(config, sub), optional(sub, "reason"))
                .await?;
            to_value(&outcome)
        }
        Some(("show", sub)) => {
            let state = machine
                .get_workflow(&InstanceId::new(required(sub, "instance")))
                .await?;
            to_value(&state)
        }
        Some(("list", sub)) => {
            let filter = ListFilter {
                target_type: optional(sub, "type"),
                status: sub.get_one::<InstanceStatus>("status").copied(),
                page: sub.get_one::<usize>("page").copied().unwrap_or(1),
                page_size: sub
                    .get_one::<usize>("page-size")
                    .copied()
                    .unwrap_or(approval_core::workflow::state_machine::DEFAULT_PAGE_SIZE),
            };
            let page = machine.list_workflows(&filter).await?;
            to_value(&page)
        }
        Some(("pending", sub)) => {
            let user_id = UserId::new(required(sub, "user"));
            let target_type = optional(sub, "type");
            let pending = machine.pending_for(&user_id, target_type.as_deref()).await?;
            Ok(json!({ "user": user_id, "count": pending.len(), "items": pending }))
        }
        Some((other, _)) => Err(ApprovalError::Config(format!("Unknown command: {}", other))),
        None => Err(ApprovalError::Config("No command given".to_string())),
    }
}
