//! Device-list store read/write operations
//!
//! Reads the persisted configuration at startup (seeding the class-id
//! table) and writes it back after every structural device change. Write
//! failures are the caller's `PersistenceFailure`: logged, never fatal to
//! the device operation that triggered them.

use super::schema::PersistedDeviceList;
use crate::devices::class_id::ClassIdTable;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration store errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Path-bound store for the persisted device lists
#[derive(Debug, Clone)]
pub struct DeviceConfigStore {
    path: PathBuf,
}

impl DeviceConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted device lists; a missing file yields the default
    /// (empty) document.
    pub fn load(&self) -> Result<PersistedDeviceList, ConfigError> {
        if !self.path.exists() {
            return Ok(PersistedDeviceList::default());
        }
        let content = fs::read_to_string(&self.path)?;
        let list = serde_json::from_str(&content)?;
        tracing::debug!("loaded device config from {:?}", self.path);
        Ok(list)
    }

    /// Write the device lists back to disk
    pub fn save(&self, list: &PersistedDeviceList) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(list)?;
        fs::write(&self.path, content)?;
        tracing::debug!("saved device config to {:?}", self.path);
        Ok(())
    }

    /// Seed a class-id table from the persisted lists
    pub fn seed_class_ids(list: &PersistedDeviceList) -> ClassIdTable {
        let mut table = ClassIdTable::new();
        for (_, entry) in list.iter_with_kind() {
            table.seed(&entry.id, &entry.class_id);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PersistedDevice;
    use tempfile::tempdir;

    fn entry(id: &str, class_id: &str) -> PersistedDevice {
        PersistedDevice {
            id: id.to_string(),
            class_id: class_id.to_string(),
            name: id.to_string(),
            width: None,
            height: None,
            frame_rate: None,
            sample_rate: None,
            stereo: None,
        }
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = tempdir().unwrap();
        let store = DeviceConfigStore::new(dir.path().join("devices.json"));
        let list = store.load().unwrap();
        assert!(list.cameras.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = DeviceConfigStore::new(dir.path().join("devices.json"));
        let mut list = PersistedDeviceList::default();
        list.cameras.push(entry("cam-a", "camera_main"));
        store.save(&list).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.cameras[0].class_id, "camera_main");
    }

    #[test]
    fn seeding_reuses_granted_ids() {
        let mut list = PersistedDeviceList::default();
        list.cameras.push(entry("cam-a", "camera_main"));
        list.microphones.push(entry("mic-a", "microphone_0"));
        let table = DeviceConfigStore::seed_class_ids(&list);
        assert_eq!(table.get("cam-a"), Some("camera_main"));
        assert_eq!(table.get("mic-a"), Some("microphone_0"));
    }
}
