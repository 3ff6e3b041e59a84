//! Whole-cache JSON backup for surviving config-service outages
//!
//! Narrowed from a prior per-data-id/group/tenant snapshot-per-file design
//! to a single file holding every namespace's configuration:
//! `{ "<ns>": { "<key>": <value> } }`.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::model::Configuration;

/// Overwrite `path` with the full cache snapshot. The parent directory is
/// created (mode 0777) if it doesn't already exist; the file itself is
/// written with mode 0666, matching the original client's `os.MkdirAll` /
/// `ioutil.WriteFile` pair.
pub fn write_backup(path: &Path, snapshot: &BTreeMap<String, Configuration>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
            set_permissions(parent, 0o777)?;
        }
    }

    let data = serde_json::to_vec(snapshot)?;
    std::fs::write(path, data)?;
    set_permissions(path, 0o666)?;

    Ok(())
}

/// Parse the entire backup file.
pub fn load_backup(path: &Path) -> Result<BTreeMap<String, Configuration>> {
    let data = std::fs::read(path)?;
    let backup = serde_json::from_slice(&data)?;
    Ok(backup)
}

/// Restore a single namespace's configuration from the backup file, or
/// `None` if the file is missing or doesn't contain the namespace.
pub fn load_namespace(path: &Path, namespace: &str) -> Result<Option<Configuration>> {
    if !path.exists() {
        return Ok(None);
    }

    let backup = load_backup(path)?;
    Ok(backup.get(namespace).cloned())
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> BTreeMap<String, Configuration> {
        let mut conf = Configuration::new();
        conf.insert("timeout".to_string(), json!("100"));
        let mut snapshot = BTreeMap::new();
        snapshot.insert("application".to_string(), conf);
        snapshot
    }

    #[test]
    fn test_write_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("backup.json");

        let snapshot = sample();
        write_backup(&path, &snapshot).unwrap();

        let loaded = load_backup(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_load_namespace_present() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.json");
        write_backup(&path, &sample()).unwrap();

        let conf = load_namespace(&path, "application").unwrap().unwrap();
        assert_eq!(conf.get("timeout").unwrap(), &json!("100"));
    }

    #[test]
    fn test_load_namespace_missing_file_returns_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        assert_eq!(load_namespace(&path, "application").unwrap(), None);
    }

    #[test]
    fn test_load_namespace_absent_key_returns_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.json");
        write_backup(&path, &sample()).unwrap();

        assert_eq!(load_namespace(&path, "other").unwrap(), None);
    }
}
