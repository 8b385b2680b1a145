//! Class-id assignment
//!
//! Maps volatile hardware device ids to stable logical identities
//! (`screen_main`, `camera_0`, ...). Assignments are process-lifetime state,
//! seeded from persisted configuration and never revoked, so a replugged
//! device regains its previous identity.

use super::traits::DeviceKind;
use std::collections::HashMap;

/// Mapping from device id to class id
#[derive(Debug, Default, Clone)]
pub struct ClassIdTable {
    assignments: HashMap<String, String>,
}

impl ClassIdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a previously granted assignment (from persisted configuration)
    pub fn seed(&mut self, device_id: impl Into<String>, class_id: impl Into<String>) {
        self.assignments.insert(device_id.into(), class_id.into());
    }

    /// Look up an existing assignment without creating one
    pub fn get(&self, device_id: &str) -> Option<&str> {
        self.assignments.get(device_id).map(String::as_str)
    }

    /// Assign a class id for the device, reusing any prior grant.
    ///
    /// `<type>_main` goes to the first device of its type; once granted it is
    /// reserved for that device id forever, and every later device takes
    /// `<type>_<k>` with the smallest unused numeric suffix.
    pub fn assign(&mut self, device_id: &str, kind: DeviceKind) -> String {
        if let Some(existing) = self.assignments.get(device_id) {
            return existing.clone();
        }

        let prefix = kind.as_str();
        let main = format!("{}_main", prefix);

        let class_id = if !self.assignments.values().any(|c| *c == main) {
            main
        } else {
            let numeric_prefix = format!("{}_", prefix);
            let used: Vec<u32> = self
                .assignments
                .values()
                .filter_map(|c| c.strip_prefix(&numeric_prefix))
                .filter_map(|suffix| suffix.parse().ok())
                .collect();
            let mut k = 0u32;
            while used.contains(&k) {
                k += 1;
            }
            format!("{}_{}", prefix, k)
        };

        self.assignments
            .insert(device_id.to_string(), class_id.clone());
        class_id
    }

    /// All granted assignments, for persistence
    pub fn assignments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.assignments
            .iter()
            .map(|(id, class)| (id.as_str(), class.as_str()))
    }
}
