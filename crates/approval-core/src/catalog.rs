//! Workflow catalog: request type -> ordered step templates
//!
//! The catalog is read-only once built. The built-in set is constructed on
//! first use and shared for the life of the process; custom catalogs are
//! loaded from JSON at startup and validated before the engine sees them.

use approval_types::{StepTemplate, WorkflowDefinition};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::error::{ApprovalError, Result};

pub const USER_REGISTRATION: &str = "user_registration";
pub const STUDENT_ENROLLMENT: &str = "student_enrollment";
pub const REWARD_APPLICATION: &str = "reward_application";
pub const USER_ROLE_UPGRADE: &str = "user_role_upgrade";

pub const ROLE_EXAM_ADMIN: &str = "exam_admin";
pub const ROLE_GENERAL_MANAGER: &str = "general_manager";

static BUILTIN_CATALOG: Lazy<WorkflowCatalog> = Lazy::new(|| {
    let exam = || StepTemplate::new("exam", "Exam office review", [ROLE_EXAM_ADMIN]);
    let gm = || StepTemplate::new("gm", "General manager approval", [ROLE_GENERAL_MANAGER]);
    let finance = || StepTemplate::new("finance", "Finance disbursement", [ROLE_EXAM_ADMIN]);

    let mut definitions = HashMap::new();
    for definition in [
        WorkflowDefinition::new(USER_REGISTRATION, vec![exam()]),
        WorkflowDefinition::new(STUDENT_ENROLLMENT, vec![exam(), gm()]),
        WorkflowDefinition::new(REWARD_APPLICATION, vec![exam(), gm(), finance()]),
        WorkflowDefinition::new(USER_ROLE_UPGRADE, vec![gm()]),
    ] {
        definitions.insert(definition.target_type.clone(), definition);
    }
    WorkflowCatalog { definitions }
});

/// Immutable lookup of workflow definitions by request type
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowCatalog {
    definitions: HashMap<String, WorkflowDefinition>,
}

impl WorkflowCatalog {
    /// The four workflows shipped with the engine
    pub fn builtin() -> Self {
        BUILTIN_CATALOG.clone()
    }

    /// Build a catalog from explicit definitions, validating each one
    pub fn from_definitions(definitions: Vec<WorkflowDefinition>) -> Result<Self> {
        let mut map = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            validate_definition(&definition)?;
            let target_type = definition.target_type.clone();
            if map.insert(target_type.clone(), definition).is_some() {
                return Err(ApprovalError::InvalidCatalog(format!(
                    "workflow '{}' is defined twice",
                    target_type
                )));
            }
        }
        Ok(Self { definitions: map })
    }

    /// Build a catalog from the `{ "<target_type>": [ <step template>, ... ] }` shape
    pub fn from_templates(templates: BTreeMap<String, Vec<StepTemplate>>) -> Result<Self> {
        let definitions = templates
            .into_iter()
            .map(|(target_type, steps)| WorkflowDefinition::new(&target_type, steps))
            .collect();
        Self::from_definitions(definitions)
    }

    /// Load a catalog from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let templates: BTreeMap<String, Vec<StepTemplate>> = serde_json::from_str(json)
            .map_err(|e| ApprovalError::InvalidCatalog(format!("Failed to parse catalog: {}", e)))?;
        Self::from_templates(templates)
    }

    /// Load a catalog from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ApprovalError::InvalidCatalog(format!(
                "Failed to read catalog file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json_str(&content)
    }

    pub fn get(&self, target_type: &str) -> Option<&WorkflowDefinition> {
        self.definitions.get(target_type)
    }

    /// Look up a definition, failing with `UnknownWorkflowType`
    pub fn definition(&self, target_type: &str) -> Result<&WorkflowDefinition> {
        self.get(target_type)
            .ok_or_else(|| ApprovalError::UnknownWorkflowType(target_type.to_string()))
    }

    pub fn contains(&self, target_type: &str) -> bool {
        self.definitions.contains_key(target_type)
    }

    /// Request types in lexical order
    pub fn target_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn definitions(&self) -> impl Iterator<Item = &WorkflowDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for WorkflowCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Steps are located by key at decision time, so keys must be unique and every
/// step needs at least one eligible role.
fn validate_definition(definition: &WorkflowDefinition) -> Result<()> {
    if definition.target_type.trim().is_empty() {
        return Err(ApprovalError::InvalidCatalog(
            "workflow type must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for template in &definition.steps {
        if template.step_key.trim().is_empty() {
            return Err(ApprovalError::InvalidCatalog(format!(
                "workflow '{}' has a step with an empty key",
                definition.target_type
            )));
        }
        if !seen.insert(template.step_key.as_str()) {
            return Err(ApprovalError::InvalidCatalog(format!(
                "workflow '{}' repeats step key '{}'",
                definition.target_type, template.step_key
            )));
        }
        if template.roles.is_empty() {
            return Err(ApprovalError::InvalidCatalog(format!(
                "step '{}' of workflow '{}' has no eligible roles",
                template.step_key, definition.target_type
            )));
        }
    }
    Ok(())
}
