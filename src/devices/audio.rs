//! Microphone channel negotiation
//!
//! Decides how a microphone is captured: native stereo when the hardware
//! reports two or more channels, synthesized stereo when a second mono
//! device shares the same hardware group, plain mono otherwise.
//!
//! A synthesized stereo stream is produced by a client-side mix stage whose
//! sample rate is fixed; it must not be renegotiated afterwards, unlike a
//! native mono capture.

use super::traits::{LiveStream, MicrophoneInfo, SourceRegistry, StreamSettings};
use uuid::Uuid;

/// Sample rate imposed by the stereo mix stage
pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// How a microphone will be captured
#[derive(Debug, Clone)]
pub enum MicrophonePlan {
    /// Hardware reports ≥2 channels; capture native stereo
    NativeStereo,
    /// Two mono channels of one physical interface, merged client-side
    PairedStereo { partner: MicrophoneInfo },
    /// Single mono capture; sample rate stays renegotiable
    Mono,
}

impl MicrophonePlan {
    pub fn is_stereo(&self) -> bool {
        !matches!(self, MicrophonePlan::Mono)
    }
}

/// Probe-driven channel negotiation for the given microphone
pub fn negotiate_channels(registry: &SourceRegistry, mic: &MicrophoneInfo) -> MicrophonePlan {
    if mic.capabilities.max_channels >= 2 {
        return MicrophonePlan::NativeStereo;
    }
    let partner = mic.group_id.as_deref().and_then(|group| {
        registry
            .microphones
            .iter()
            .find(|other| other.id != mic.id && other.group_id.as_deref() == Some(group))
    });
    match partner {
        Some(partner) => MicrophonePlan::PairedStereo {
            partner: partner.clone(),
        },
        None => MicrophonePlan::Mono,
    }
}

/// A synthesized stereo stream and the two mono legs feeding it
#[derive(Debug)]
pub struct StereoMerge {
    pub merged: LiveStream,
    pub left: LiveStream,
    pub right: LiveStream,
}

/// Merge two mono streams into one two-channel stream (left = channel A,
/// right = channel B). The merged stream's sample rate is fixed by the mix
/// stage regardless of the legs' rates.
pub fn merge_streams(left: LiveStream, right: LiveStream) -> StereoMerge {
    let merged = LiveStream {
        handle: Uuid::new_v4(),
        device_id: left.device_id.clone(),
        settings: StreamSettings::Audio {
            sample_rate: MIX_SAMPLE_RATE,
            channels: 2,
        },
    };
    StereoMerge {
        merged,
        left,
        right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::traits::AudioCapabilities;

    fn mic(id: &str, channels: u16, group: Option<&str>) -> MicrophoneInfo {
        MicrophoneInfo {
            id: id.to_string(),
            name: format!("Mic {}", id),
            is_default: false,
            group_id: group.map(str::to_string),
            capabilities: AudioCapabilities {
                min_sample_rate: 8_000,
                max_sample_rate: 48_000,
                max_channels: channels,
            },
        }
    }

    #[test]
    fn native_stereo_wins() {
        let registry = SourceRegistry {
            microphones: vec![mic("a", 2, Some("g1")), mic("b", 1, Some("g1"))],
            ..Default::default()
        };
        let plan = negotiate_channels(&registry, &registry.microphones[0]);
        assert!(matches!(plan, MicrophonePlan::NativeStereo));
    }

    #[test]
    fn paired_mono_synthesizes_stereo() {
        let registry = SourceRegistry {
            microphones: vec![mic("a", 1, Some("g1")), mic("b", 1, Some("g1"))],
            ..Default::default()
        };
        match negotiate_channels(&registry, &registry.microphones[0]) {
            MicrophonePlan::PairedStereo { partner } => assert_eq!(partner.id, "b"),
            other => panic!("expected paired stereo, got {:?}", other),
        }
    }

    #[test]
    fn lone_mono_stays_mono() {
        let registry = SourceRegistry {
            microphones: vec![mic("a", 1, Some("g1")), mic("b", 1, Some("g2"))],
            ..Default::default()
        };
        let plan = negotiate_channels(&registry, &registry.microphones[0]);
        assert!(matches!(plan, MicrophonePlan::Mono));
    }

    #[test]
    fn merged_stream_is_fixed_rate_stereo() {
        let leg = |id: &str| LiveStream {
            handle: Uuid::new_v4(),
            device_id: id.to_string(),
            settings: StreamSettings::Audio {
                sample_rate: 44_100,
                channels: 1,
            },
        };
        let merge = merge_streams(leg("a"), leg("b"));
        assert_eq!(
            merge.merged.settings,
            StreamSettings::Audio {
                sample_rate: MIX_SAMPLE_RATE,
                channels: 2
            }
        );
    }
}
