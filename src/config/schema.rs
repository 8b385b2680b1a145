//! Persisted device-list schema
//!
//! These types match the key-structured configuration document shared with
//! the UI layer: one list per device type, each entry carrying the device's
//! stable identity and its last known settings.

use crate::devices::traits::DeviceKind;
use serde::{Deserialize, Serialize};

/// One persisted device entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDevice {
    pub id: String,
    pub class_id: String,
    pub name: String,

    // Video-specific settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,

    // Microphone-specific settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stereo: Option<bool>,
}

/// The persisted configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDeviceList {
    #[serde(default)]
    pub screens: Vec<PersistedDevice>,
    #[serde(default)]
    pub cameras: Vec<PersistedDevice>,
    #[serde(default)]
    pub microphones: Vec<PersistedDevice>,
}

impl PersistedDeviceList {
    /// Iterate all entries with their device kind
    pub fn iter_with_kind(&self) -> impl Iterator<Item = (DeviceKind, &PersistedDevice)> {
        self.screens
            .iter()
            .map(|d| (DeviceKind::Screen, d))
            .chain(self.cameras.iter().map(|d| (DeviceKind::Camera, d)))
            .chain(
                self.microphones
                    .iter()
                    .map(|d| (DeviceKind::Microphone, d)),
            )
    }

    pub fn list_for_mut(&mut self, kind: DeviceKind) -> &mut Vec<PersistedDevice> {
        match kind {
            DeviceKind::Screen => &mut self.screens,
            DeviceKind::Camera => &mut self.cameras,
            DeviceKind::Microphone => &mut self.microphones,
        }
    }
}
