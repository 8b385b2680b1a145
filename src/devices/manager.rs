//! Device & stream lifecycle manager
//!
//! Owns the authoritative set of active devices, mediates capability
//! negotiation against the capture backend, and keeps every logical stream's
//! settings internally consistent. Structural mutations (add/remove/
//! configure) serialize through `&mut self`; no two may interleave.

use super::audio::{self, MicrophonePlan};
use super::class_id::ClassIdTable;
use super::simulcast::{self, SimulcastTier};
use super::traits::{
    AcquireError, CameraInfo, CaptureBackend, DeviceKind, LiveStream, MicrophoneInfo,
    ScreenInfo, SourceRegistry, StreamRequest, StreamSettings,
};
use crate::config::schema::{PersistedDevice, PersistedDeviceList};
use crate::config::store::DeviceConfigStore;
use crate::signaling::protocol::{MediaKind, TrackDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Frame rate requested for newly added video devices; hardware may clamp.
const DEFAULT_FRAME_RATE: u32 = 30;
/// Sample rate requested for newly added microphones; hardware may clamp.
const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Device operation errors
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Requested id is absent from the probed source list, or already active
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Hardware acquisition rejected by the OS/driver
    #[error("acquisition failed: {0}")]
    AcquisitionFailed(#[from] AcquireError),

    #[error("no live stream open for device {0}")]
    StreamMissing(String),

    /// Synthesized stereo captures have their sample rate fixed by the mix
    /// stage and cannot be renegotiated.
    #[error("sample rate is fixed for synthesized stereo capture on {0}")]
    SampleRateLocked(String),

    #[error("request does not match the device kind of {0}")]
    InvalidRequest(String),
}

/// Tagged device descriptor with per-type source info
#[derive(Debug, Clone)]
pub enum DeviceDescriptor {
    Screen(ScreenInfo),
    Camera(CameraInfo),
    Microphone(MicrophoneInfo),
}

impl DeviceDescriptor {
    pub fn kind(&self) -> DeviceKind {
        match self {
            DeviceDescriptor::Screen(_) => DeviceKind::Screen,
            DeviceDescriptor::Camera(_) => DeviceKind::Camera,
            DeviceDescriptor::Microphone(_) => DeviceKind::Microphone,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            DeviceDescriptor::Screen(s) => &s.id,
            DeviceDescriptor::Camera(c) => &c.id,
            DeviceDescriptor::Microphone(m) => &m.id,
        }
    }

    pub fn device_name(&self) -> &str {
        match self {
            DeviceDescriptor::Screen(s) => &s.name,
            DeviceDescriptor::Camera(c) => &c.name,
            DeviceDescriptor::Microphone(m) => &m.name,
        }
    }

    /// Re-resolve this device in a freshly probed registry
    pub fn find_source(&self, registry: &SourceRegistry) -> Option<DeviceDescriptor> {
        match self {
            DeviceDescriptor::Screen(s) => registry
                .find_screen(&s.id)
                .map(|s| DeviceDescriptor::Screen(s.clone())),
            DeviceDescriptor::Camera(c) => registry
                .find_camera(&c.id)
                .map(|c| DeviceDescriptor::Camera(c.clone())),
            DeviceDescriptor::Microphone(m) => registry
                .find_microphone(&m.id)
                .map(|m| DeviceDescriptor::Microphone(m.clone())),
        }
    }
}

/// Consistent settings of an active device, derived from its live stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DeviceSettings {
    #[serde(rename_all = "camelCase")]
    Video {
        width: u32,
        height: u32,
        frame_rate: u32,
        tiers: Vec<SimulcastTier>,
    },
    #[serde(rename_all = "camelCase")]
    Audio {
        sample_rate: u32,
        stereo: bool,
        /// True for synthesized stereo, whose rate the mix stage fixes
        sample_rate_locked: bool,
    },
}

/// A capture device bound to the running session
#[derive(Debug)]
pub struct Device {
    pub descriptor: DeviceDescriptor,
    pub class_id: String,
    pub settings: DeviceSettings,
    /// The stream exposed upward (merged stream for synthesized stereo)
    pub stream: Option<LiveStream>,
    /// Mono legs feeding a synthesized stereo stream
    legs: Vec<LiveStream>,
}

impl Device {
    pub fn kind(&self) -> DeviceKind {
        self.descriptor.kind()
    }

    pub fn device_id(&self) -> &str {
        self.descriptor.device_id()
    }

    pub fn name(&self) -> &str {
        self.descriptor.device_name()
    }

    /// Simulcast tier table for video devices
    pub fn tiers(&self) -> Option<&[SimulcastTier]> {
        match &self.settings {
            DeviceSettings::Video { tiers, .. } => Some(tiers),
            DeviceSettings::Audio { .. } => None,
        }
    }
}

/// Owner of the active device arena
pub struct DeviceManager {
    backend: Arc<dyn CaptureBackend>,
    store: DeviceConfigStore,
    class_ids: ClassIdTable,
    /// Arena keyed by class id
    devices: HashMap<String, Device>,
    /// (kind, device id) → class id lookup, maintained alongside the arena
    index: HashMap<(DeviceKind, String), String>,
}

impl DeviceManager {
    /// Create a manager, seeding class-id assignments from the store. A
    /// corrupt or unreadable store is logged and treated as empty.
    pub fn new(backend: Arc<dyn CaptureBackend>, store: DeviceConfigStore) -> Self {
        let class_ids = match store.load() {
            Ok(list) => DeviceConfigStore::seed_class_ids(&list),
            Err(e) => {
                tracing::warn!("failed to load device config, starting empty: {}", e);
                ClassIdTable::new()
            }
        };
        Self {
            backend,
            store,
            class_ids,
            devices: HashMap::new(),
            index: HashMap::new(),
        }
    }

    /// Query available capture sources
    pub async fn probe(&self) -> SourceRegistry {
        self.backend.probe().await
    }

    pub fn get(&self, class_id: &str) -> Option<&Device> {
        self.devices.get(class_id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Live stream for an active device, for handoff to the media transport
    pub fn stream_for(&self, class_id: &str) -> Option<&LiveStream> {
        self.devices.get(class_id).and_then(|d| d.stream.as_ref())
    }

    /// Track descriptors for the active set, suitable for `confirmReady`
    pub fn tracks(&self) -> Vec<TrackDescriptor> {
        let mut tracks: Vec<TrackDescriptor> = self
            .devices
            .values()
            .map(|device| TrackDescriptor {
                track_id: device.class_id.clone(),
                kind: match device.kind() {
                    DeviceKind::Microphone => MediaKind::Audio,
                    _ => MediaKind::Video,
                },
            })
            .collect();
        tracks.sort_by(|a, b| a.track_id.cmp(&b.track_id));
        tracks
    }

    /// Add a device by hardware id, acquiring its stream and assigning a
    /// stable class id. Returns the class id.
    pub async fn add_device(
        &mut self,
        kind: DeviceKind,
        device_id: &str,
    ) -> Result<String, DeviceError> {
        if self
            .index
            .contains_key(&(kind, device_id.to_string()))
        {
            return Err(DeviceError::DeviceUnavailable(format!(
                "{} {} is already active",
                kind.as_str(),
                device_id
            )));
        }

        let registry = self.backend.probe().await;
        let descriptor = match kind {
            DeviceKind::Screen => registry
                .find_screen(device_id)
                .cloned()
                .map(DeviceDescriptor::Screen),
            DeviceKind::Camera => registry
                .find_camera(device_id)
                .cloned()
                .map(DeviceDescriptor::Camera),
            DeviceKind::Microphone => registry
                .find_microphone(device_id)
                .cloned()
                .map(DeviceDescriptor::Microphone),
        }
        .ok_or_else(|| {
            DeviceError::DeviceUnavailable(format!(
                "{} {} not present in probed sources",
                kind.as_str(),
                device_id
            ))
        })?;

        let class_id = self.class_ids.assign(device_id, kind);
        // Assignments are exclusive by construction, but a hand-edited or
        // corrupt store may seed duplicate grants; never displace a live
        // device.
        if self.devices.contains_key(&class_id) {
            return Err(DeviceError::DeviceUnavailable(format!(
                "class id {} is already bound to an active device",
                class_id
            )));
        }

        let device = match &descriptor {
            DeviceDescriptor::Screen(info) => {
                self.acquire_video(kind, &descriptor, &info.capabilities, &class_id)
                    .await?
            }
            DeviceDescriptor::Camera(info) => {
                self.acquire_video(kind, &descriptor, &info.capabilities, &class_id)
                    .await?
            }
            DeviceDescriptor::Microphone(info) => {
                self.acquire_microphone(&registry, &descriptor, info, &class_id)
                    .await?
            }
        };

        tracing::info!(
            "added {} '{}' as {}",
            kind.as_str(),
            device.name(),
            class_id
        );
        self.index
            .insert((kind, device_id.to_string()), class_id.clone());
        self.devices.insert(class_id.clone(), device);
        self.persist();
        Ok(class_id)
    }

    async fn acquire_video(
        &self,
        kind: DeviceKind,
        descriptor: &DeviceDescriptor,
        caps: &super::traits::VideoCapabilities,
        class_id: &str,
    ) -> Result<Device, DeviceError> {
        let request = StreamRequest::Video {
            width: caps.max_width,
            height: caps.max_height,
            frame_rate: DEFAULT_FRAME_RATE
                .clamp(caps.min_frame_rate, caps.max_frame_rate),
        };
        let stream = self
            .backend
            .acquire(kind, descriptor.device_id(), request)
            .await?;

        // The live stream, not the request, is the settings truth.
        let settings = match stream.settings {
            StreamSettings::Video {
                width,
                height,
                frame_rate,
            } => DeviceSettings::Video {
                width,
                height,
                frame_rate,
                tiers: simulcast::default_tiers(width, height, frame_rate),
            },
            StreamSettings::Audio { .. } => {
                return Err(DeviceError::InvalidRequest(class_id.to_string()));
            }
        };

        Ok(Device {
            descriptor: descriptor.clone(),
            class_id: class_id.to_string(),
            settings,
            stream: Some(stream),
            legs: Vec::new(),
        })
    }

    async fn acquire_microphone(
        &self,
        registry: &SourceRegistry,
        descriptor: &DeviceDescriptor,
        info: &MicrophoneInfo,
        class_id: &str,
    ) -> Result<Device, DeviceError> {
        let plan = audio::negotiate_channels(registry, info);
        let base_rate = DEFAULT_SAMPLE_RATE.clamp(
            info.capabilities.min_sample_rate,
            info.capabilities.max_sample_rate,
        );

        let (stream, legs, settings) = match plan {
            MicrophonePlan::NativeStereo => {
                let stream = self
                    .backend
                    .acquire(
                        DeviceKind::Microphone,
                        &info.id,
                        StreamRequest::Audio {
                            sample_rate: base_rate,
                            channels: 2,
                        },
                    )
                    .await?;
                let (sample_rate, channels) = audio_settings(&stream);
                (
                    stream,
                    Vec::new(),
                    DeviceSettings::Audio {
                        sample_rate,
                        stereo: channels >= 2,
                        sample_rate_locked: false,
                    },
                )
            }
            MicrophonePlan::PairedStereo { partner } => {
                let left = self
                    .backend
                    .acquire(
                        DeviceKind::Microphone,
                        &info.id,
                        StreamRequest::Audio {
                            sample_rate: audio::MIX_SAMPLE_RATE,
                            channels: 1,
                        },
                    )
                    .await?;
                let right = match self
                    .backend
                    .acquire(
                        DeviceKind::Microphone,
                        &partner.id,
                        StreamRequest::Audio {
                            sample_rate: audio::MIX_SAMPLE_RATE,
                            channels: 1,
                        },
                    )
                    .await
                {
                    Ok(right) => right,
                    Err(e) => {
                        self.backend.release(left).await;
                        return Err(e.into());
                    }
                };
                let merge = audio::merge_streams(left, right);
                (
                    merge.merged,
                    vec![merge.left, merge.right],
                    DeviceSettings::Audio {
                        sample_rate: audio::MIX_SAMPLE_RATE,
                        stereo: true,
                        sample_rate_locked: true,
                    },
                )
            }
            MicrophonePlan::Mono => {
                let stream = self
                    .backend
                    .acquire(
                        DeviceKind::Microphone,
                        &info.id,
                        StreamRequest::Audio {
                            sample_rate: base_rate,
                            channels: 1,
                        },
                    )
                    .await?;
                let (sample_rate, _) = audio_settings(&stream);
                (
                    stream,
                    Vec::new(),
                    DeviceSettings::Audio {
                        sample_rate,
                        stereo: false,
                        sample_rate_locked: false,
                    },
                )
            }
        };

        Ok(Device {
            descriptor: descriptor.clone(),
            class_id: class_id.to_string(),
            settings,
            stream: Some(stream),
            legs,
        })
    }

    /// Remove a device, tearing its stream down and clearing its settings.
    /// The class-id grant itself is never revoked.
    pub async fn remove_device(&mut self, class_id: &str) -> Result<(), DeviceError> {
        let mut device = self
            .devices
            .remove(class_id)
            .ok_or_else(|| DeviceError::DeviceUnavailable(class_id.to_string()))?;
        self.index
            .remove(&(device.kind(), device.device_id().to_string()));

        if let Some(stream) = device.stream.take() {
            self.backend.release(stream).await;
        }
        for leg in device.legs.drain(..) {
            self.backend.release(leg).await;
        }

        tracing::info!("removed device {}", class_id);
        self.persist();
        Ok(())
    }

    /// Apply new parameters to an active device's live stream. Settings and
    /// tier bitrates are re-derived from the stream afterwards, since
    /// hardware may clamp the request.
    pub async fn configure_device(
        &mut self,
        class_id: &str,
        request: StreamRequest,
    ) -> Result<(), DeviceError> {
        let device = self
            .devices
            .get_mut(class_id)
            .ok_or_else(|| DeviceError::DeviceUnavailable(class_id.to_string()))?;

        match (&device.settings, request) {
            (DeviceSettings::Video { .. }, StreamRequest::Video { .. }) => {}
            (DeviceSettings::Audio { .. }, StreamRequest::Audio { .. }) => {}
            _ => return Err(DeviceError::InvalidRequest(class_id.to_string())),
        }
        if let DeviceSettings::Audio {
            sample_rate_locked: true,
            ..
        } = device.settings
        {
            return Err(DeviceError::SampleRateLocked(class_id.to_string()));
        }

        let stream = device
            .stream
            .as_mut()
            .ok_or_else(|| DeviceError::StreamMissing(class_id.to_string()))?;
        self.backend.reconfigure(stream, request).await?;

        match (stream.settings, &mut device.settings) {
            (
                StreamSettings::Video {
                    width,
                    height,
                    frame_rate,
                },
                DeviceSettings::Video {
                    width: w,
                    height: h,
                    frame_rate: f,
                    tiers,
                },
            ) => {
                *w = width;
                *h = height;
                *f = frame_rate;
                simulcast::recompute(tiers, width, height, frame_rate);
            }
            (
                StreamSettings::Audio {
                    sample_rate,
                    channels,
                },
                DeviceSettings::Audio {
                    sample_rate: rate,
                    stereo,
                    ..
                },
            ) => {
                *rate = sample_rate;
                *stereo = channels >= 2;
            }
            _ => return Err(DeviceError::InvalidRequest(class_id.to_string())),
        }

        tracing::info!("reconfigured device {}", class_id);
        self.persist();
        Ok(())
    }

    /// Move a tier to the front of a video device's table without changing
    /// its parameters
    pub fn select_tier(&mut self, class_id: &str, tier_id: &str) -> Result<(), DeviceError> {
        let device = self
            .devices
            .get_mut(class_id)
            .ok_or_else(|| DeviceError::DeviceUnavailable(class_id.to_string()))?;
        match &mut device.settings {
            DeviceSettings::Video { tiers, .. } => {
                if simulcast::promote(tiers, tier_id) {
                    Ok(())
                } else {
                    Err(DeviceError::InvalidRequest(class_id.to_string()))
                }
            }
            DeviceSettings::Audio { .. } => {
                Err(DeviceError::InvalidRequest(class_id.to_string()))
            }
        }
    }

    /// Write the active device lists to the configuration store. Failure is
    /// logged and deliberately does not fail the triggering operation.
    fn persist(&self) {
        let mut list = PersistedDeviceList::default();
        for device in self.devices.values() {
            let mut entry = PersistedDevice {
                id: device.device_id().to_string(),
                class_id: device.class_id.clone(),
                name: device.name().to_string(),
                width: None,
                height: None,
                frame_rate: None,
                sample_rate: None,
                stereo: None,
            };
            match &device.settings {
                DeviceSettings::Video {
                    width,
                    height,
                    frame_rate,
                    ..
                } => {
                    entry.width = Some(*width);
                    entry.height = Some(*height);
                    entry.frame_rate = Some(*frame_rate);
                }
                DeviceSettings::Audio {
                    sample_rate,
                    stereo,
                    ..
                } => {
                    entry.sample_rate = Some(*sample_rate);
                    entry.stereo = Some(*stereo);
                }
            }
            list.list_for_mut(device.kind()).push(entry);
        }
        for devices in [&mut list.screens, &mut list.cameras, &mut list.microphones] {
            devices.sort_by(|a, b| a.class_id.cmp(&b.class_id));
        }
        if let Err(e) = self.store.save(&list) {
            tracing::warn!("failed to persist device list: {}", e);
        }
    }
}

fn audio_settings(stream: &LiveStream) -> (u32, u16) {
    match stream.settings {
        StreamSettings::Audio {
            sample_rate,
            channels,
        } => (sample_rate, channels),
        StreamSettings::Video { .. } => (0, 0),
    }
}
