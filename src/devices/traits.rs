//! Capture source traits and info types
//!
//! Platform-agnostic description of capture sources, their capability
//! ranges, and the backend seam through which live streams are acquired.
//! OS-level enumeration and the actual encode/transport are external
//! collaborators behind [`CaptureBackend`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Capture device type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Screen,
    Camera,
    Microphone,
}

impl DeviceKind {
    /// Prefix used in class ids (`screen_main`, `camera_0`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Screen => "screen",
            DeviceKind::Camera => "camera",
            DeviceKind::Microphone => "microphone",
        }
    }
}

/// Hardware capability ranges for a video source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoCapabilities {
    pub max_width: u32,
    pub max_height: u32,
    pub min_frame_rate: u32,
    pub max_frame_rate: u32,
}

/// Hardware capability ranges for an audio source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioCapabilities {
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    pub max_channels: u16,
}

/// Information about a capturable display
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenInfo {
    /// Unique display ID, stable within an OS session
    pub id: String,
    pub name: String,
    pub is_primary: bool,
    pub capabilities: VideoCapabilities,
}

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub capabilities: VideoCapabilities,
}

/// Information about a microphone
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrophoneInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    /// Hardware group shared by mono channels of one physical interface
    pub group_id: Option<String>,
    pub capabilities: AudioCapabilities,
}

/// Snapshot of all currently probed sources. Pure query result, no state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRegistry {
    pub screens: Vec<ScreenInfo>,
    pub cameras: Vec<CameraInfo>,
    pub microphones: Vec<MicrophoneInfo>,
}

impl SourceRegistry {
    pub fn find_screen(&self, id: &str) -> Option<&ScreenInfo> {
        self.screens.iter().find(|s| s.id == id)
    }

    pub fn find_camera(&self, id: &str) -> Option<&CameraInfo> {
        self.cameras.iter().find(|c| c.id == id)
    }

    pub fn find_microphone(&self, id: &str) -> Option<&MicrophoneInfo> {
        self.microphones.iter().find(|m| m.id == id)
    }
}

/// Requested parameters for a stream acquisition or reconfiguration.
/// Hardware may clamp these; the live stream's settings are the truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StreamRequest {
    #[serde(rename_all = "camelCase")]
    Video {
        width: u32,
        height: u32,
        frame_rate: u32,
    },
    #[serde(rename_all = "camelCase")]
    Audio { sample_rate: u32, channels: u16 },
}

/// Actual parameters of an open stream, as reported by the hardware
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StreamSettings {
    #[serde(rename_all = "camelCase")]
    Video {
        width: u32,
        height: u32,
        frame_rate: u32,
    },
    #[serde(rename_all = "camelCase")]
    Audio { sample_rate: u32, channels: u16 },
}

/// Handle to an open capture stream
#[derive(Debug, Clone)]
pub struct LiveStream {
    pub handle: Uuid,
    pub device_id: String,
    pub settings: StreamSettings,
}

/// Stream acquisition failure reported by the OS/driver
#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("device refused by OS/driver: {0}")]
    Refused(String),

    #[error("device disappeared during acquisition: {0}")]
    Gone(String),
}

/// Backend seam for source enumeration and stream acquisition.
///
/// Every call is a suspension point; the manager never blocks on hardware.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Query available capture sources and their capability ranges
    async fn probe(&self) -> SourceRegistry;

    /// Open a live stream on the given source. The returned settings may be
    /// clamped relative to the request.
    async fn acquire(
        &self,
        kind: DeviceKind,
        device_id: &str,
        request: StreamRequest,
    ) -> Result<LiveStream, AcquireError>;

    /// Apply new parameters to an open stream, updating its settings to the
    /// clamped hardware truth.
    async fn reconfigure(
        &self,
        stream: &mut LiveStream,
        request: StreamRequest,
    ) -> Result<(), AcquireError>;

    /// Tear a stream down
    async fn release(&self, stream: LiveStream);
}
