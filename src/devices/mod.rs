//! Device & stream lifecycle
//!
//! This module owns capture devices and their live streams:
//! - Capability probe and backend seam (traits)
//! - Stable class-id assignment surviving device-list reshuffles
//! - Simulcast tier calculation
//! - Microphone channel negotiation, including synthesized stereo
//! - The DeviceManager arena tying it all together

pub mod audio;
pub mod class_id;
pub mod manager;
pub mod simulcast;
pub mod traits;

pub use class_id::ClassIdTable;
pub use manager::{Device, DeviceDescriptor, DeviceError, DeviceManager, DeviceSettings};
pub use simulcast::SimulcastTier;
pub use traits::{
    AcquireError, AudioCapabilities, CameraInfo, CaptureBackend, DeviceKind, LiveStream,
    MicrophoneInfo, ScreenInfo, SourceRegistry, StreamRequest, StreamSettings,
    VideoCapabilities,
};
