//! Workflow definitions: the ordered step templates for one request type

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Template for one approval step, as authored in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub step_key: String,
    pub name: String,

    /// Roles eligible to decide the step
    #[serde(alias = "approver_roles")]
    pub roles: BTreeSet<String>,

    #[serde(default = "default_required")]
    pub required: bool,

    #[serde(default)]
    pub can_skip: bool,
}

fn default_required() -> bool {
    true
}

impl StepTemplate {
    /// Required, non-skippable step
    pub fn new<I, S>(step_key: &str, name: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            step_key: step_key.to_string(),
            name: name.to_string(),
            roles: roles.into_iter().map(Into::into).collect(),
            required: true,
            can_skip: false,
        }
    }

    pub fn skippable(mut self) -> Self {
        self.can_skip = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Ordered step templates for one request type.
///
/// A copy of the definition is stored on every instance created from it, so
/// later catalog changes never affect running instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub target_type: String,
    pub steps: Vec<StepTemplate>,
}

impl WorkflowDefinition {
    pub fn new(target_type: &str, steps: Vec<StepTemplate>) -> Self {
        Self {
            target_type: target_type.to_string(),
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_defaults_when_deserializing() {
        let json = r#"{"step_key": "exam", "name": "Exam review", "roles": ["exam_admin"]}"#;
        let template: StepTemplate = serde_json::from_str(json).unwrap();

        assert!(template.required);
        assert!(!template.can_skip);
        assert!(template.roles.contains("exam_admin"));
    }

    #[test]
    fn test_template_builders() {
        let template = StepTemplate::new("notes", "Notes", ["clerk"]).optional().skippable();
        assert!(!template.required);
        assert!(template.can_skip);
    }
}
