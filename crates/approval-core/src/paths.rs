//! Path constants and builders for the file-backed stores

use approval_types::InstanceId;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_DIR: &str = "./data/approvals";

// Directory and file names (relative to the data root)
pub const INSTANCES_DIR_NAME: &str = "instances";
pub const AUDIT_FILE_NAME: &str = "audit.jsonl";

const INSTANCE_FILE_PREFIX: &str = "instance_";
const JSON_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "json.tmp";
const LOCK_EXTENSION: &str = "lock";

pub fn instances_dir(root: &Path) -> PathBuf {
    root.join(INSTANCES_DIR_NAME)
}

pub fn instance_file(root: &Path, instance_id: &InstanceId) -> PathBuf {
    instances_dir(root).join(format!(
        "{}{}.{}",
        INSTANCE_FILE_PREFIX, instance_id, JSON_EXTENSION
    ))
}

/// Scratch file written before the atomic rename onto `instance_file`
pub fn instance_temp_file(root: &Path, instance_id: &InstanceId) -> PathBuf {
    instances_dir(root).join(format!(
        "{}{}.{}",
        INSTANCE_FILE_PREFIX, instance_id, TEMP_EXTENSION
    ))
}

/// Per-instance file holding the cross-process write lock. Never removed.
pub fn instance_lock_file(root: &Path, instance_id: &InstanceId) -> PathBuf {
    instances_dir(root).join(format!(
        "{}{}.{}",
        INSTANCE_FILE_PREFIX, instance_id, LOCK_EXTENSION
    ))
}

pub fn audit_file(root: &Path) -> PathBuf {
    root.join(AUDIT_FILE_NAME)
}

/// True for finished aggregate documents (not scratch files)
pub fn is_instance_file(path: &Path) -> bool {
    path.is_file()
        && path.extension().and_then(|s| s.to_str()) == Some(JSON_EXTENSION)
        && path
            .file_name()
            .and_then(|s| s.to_str())
            .map_or(false, |name| name.starts_with(INSTANCE_FILE_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_paths() {
        let root = Path::new("/data/approvals");
        let id = InstanceId::new("abc");

        assert_eq!(
            instance_file(root, &id),
            PathBuf::from("/data/approvals/instances/instance_abc.json")
        );
        assert_eq!(
            instance_temp_file(root, &id),
            PathBuf::from("/data/approvals/instances/instance_abc.json.tmp")
        );
        assert_eq!(
            instance_lock_file(root, &id),
            PathBuf::from("/data/approvals/instances/instance_abc.lock")
        );
        assert_eq!(audit_file(root), PathBuf::from("/data/approvals/audit.jsonl"));
    }
}
