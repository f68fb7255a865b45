//! Configuration management for the approval engine

use approval_types::{StepTemplate, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::WorkflowCatalog;
use crate::clients::{StaticRoleDirectory, UserProfile};
use crate::error::{ApprovalError, Result};
use crate::paths;

/// Raw configuration structure matching the JSON file
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    pub storage: RawStorageConfig,

    #[serde(default)]
    pub engine: RawEngineConfig,

    // Custom catalog; the built-in one is used when absent
    #[serde(default)]
    pub workflows: Option<BTreeMap<String, Vec<StepTemplate>>>,

    #[serde(default)]
    pub users: HashMap<String, UserProfile>,

    #[serde(default)]
    pub audit: RawAuditConfig,
}

#[derive(Debug, Default, Deserialize)]
struct RawStorageConfig {
    #[serde(alias = "path")]
    pub data_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEngineConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for RawEngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawAuditConfig {
    pub file: Option<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub engine: EngineSettings,
    pub workflows: Option<BTreeMap<String, Vec<StepTemplate>>>,
    pub users: HashMap<String, UserProfile>,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuditConfig {
    /// Explicit audit log path; derived from the data dir when unset
    pub file: Option<PathBuf>,
}

// Default functions
fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_raw_config(RawConfig::default())
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ApprovalError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_json_str(&content)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw_config: RawConfig = serde_json::from_str(json)
            .map_err(|e| ApprovalError::Config(format!("Failed to parse config: {}", e)))?;

        let config = Self::from_raw_config(raw_config);
        config.validate()?;
        Ok(config)
    }

    fn from_raw_config(raw: RawConfig) -> Self {
        let data_dir = raw
            .storage
            .data_dir
            .unwrap_or_else(|| paths::DEFAULT_DATA_DIR.to_string());

        Self {
            storage: StorageConfig {
                data_dir: PathBuf::from(data_dir),
            },
            engine: EngineSettings {
                lock_timeout_ms: raw.engine.lock_timeout_ms,
            },
            workflows: raw.workflows,
            users: raw.users,
            audit: AuditConfig {
                file: raw.audit.file.map(PathBuf::from),
            },
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(ApprovalError::Config("storage.data_dir must not be empty".to_string()));
        }

        if self.engine.lock_timeout_ms == 0 {
            return Err(ApprovalError::Config(
                "engine.lock_timeout_ms must be greater than zero".to_string(),
            ));
        }

        for (user_id, profile) in &self.users {
            if user_id.trim().is_empty() {
                return Err(ApprovalError::Config("User ids must not be empty".to_string()));
            }
            if profile.roles.is_empty() {
                return Err(ApprovalError::Config(format!("User '{}' has no roles", user_id)));
            }
        }

        // Surface catalog problems at load time rather than on first use
        self.catalog().map_err(|e| ApprovalError::Config(e.to_string()))?;

        Ok(())
    }

    /// Point storage somewhere else, e.g. from a command line flag
    pub fn with_data_dir<P: Into<PathBuf>>(mut self, data_dir: P) -> Self {
        self.storage.data_dir = data_dir.into();
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.storage.data_dir
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.lock_timeout_ms)
    }

    pub fn audit_file(&self) -> PathBuf {
        self.audit
            .file
            .clone()
            .unwrap_or_else(|| paths::audit_file(&self.storage.data_dir))
    }

    /// The configured catalog, or the built-in one
    pub fn catalog(&self) -> Result<WorkflowCatalog> {
        match &self.workflows {
            Some(templates) => WorkflowCatalog::from_templates(templates.clone()),
            None => Ok(WorkflowCatalog::builtin()),
        }
    }

    pub fn role_directory(&self) -> StaticRoleDirectory {
        StaticRoleDirectory::new(
            self.users
                .iter()
                .map(|(id, profile)| (UserId::new(id.as_str()), profile.clone()))
                .collect(),
        )
    }
}
