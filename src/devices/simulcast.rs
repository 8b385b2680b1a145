//! Simulcast tier calculation
//!
//! Pure mapping from device resolution and frame rate to the tiered
//! encoding table offered upward. Index 0 is the preferred tier; downscale
//! factors strictly increase after it.

use serde::{Deserialize, Serialize};

/// Quality constant: kilobits per (pixel · frame), 0.078125 bits/pixel/frame
/// after the ×1000 below.
const BITRATE_QUALITY: f64 = 0.000078125;

/// One encoding tier of a simulcast table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulcastTier {
    pub tier_id: String,
    /// Linear downscale applied to both dimensions
    pub downscale_factor: u32,
    /// Bits per second
    pub max_bitrate: u64,
    pub max_frame_rate: u32,
}

/// Bitrate in bits/sec for the given dimensions and frame rate
pub fn bitrate_for(width: u32, height: u32, frame_rate: u32) -> u64 {
    let pixels_per_second = width as u64 * height as u64 * frame_rate as u64;
    (pixels_per_second as f64 * BITRATE_QUALITY) as u64 * 1000
}

/// Default tier table: full-scale "original" plus a 4× downscaled "low"
pub fn default_tiers(width: u32, height: u32, frame_rate: u32) -> Vec<SimulcastTier> {
    vec![
        SimulcastTier {
            tier_id: "original".to_string(),
            downscale_factor: 1,
            max_bitrate: bitrate_for(width, height, frame_rate),
            max_frame_rate: frame_rate,
        },
        SimulcastTier {
            tier_id: "low".to_string(),
            downscale_factor: 4,
            max_bitrate: bitrate_for(width / 4, height / 4, frame_rate),
            max_frame_rate: frame_rate,
        },
    ]
}

/// Recompute bitrates after a resolution or frame-rate change, preserving
/// each tier's identity and downscale factor.
pub fn recompute(tiers: &mut [SimulcastTier], width: u32, height: u32, frame_rate: u32) {
    for tier in tiers {
        tier.max_bitrate = bitrate_for(
            width / tier.downscale_factor,
            height / tier.downscale_factor,
            frame_rate,
        );
        tier.max_frame_rate = frame_rate;
    }
}

/// Move the named tier to the front (user selection). Parameters are left
/// untouched; only priority position changes. Returns false when absent.
pub fn promote(tiers: &mut Vec<SimulcastTier>, tier_id: &str) -> bool {
    match tiers.iter().position(|t| t.tier_id == tier_id) {
        Some(index) => {
            let tier = tiers.remove(index);
            tiers.insert(0, tier);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_matches_reference_1080p30() {
        // 1920×1080×30 × 0.000078125 = 4860 exactly
        assert_eq!(bitrate_for(1920, 1080, 30), 4_860_000);
    }

    #[test]
    fn bitrate_matches_reference_low_tier() {
        // 480×270×30 × 0.000078125 = 303.75, truncated
        assert_eq!(bitrate_for(480, 270, 30), 303_000);
    }

    #[test]
    fn default_table_for_1080p30() {
        let tiers = default_tiers(1920, 1080, 30);
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].tier_id, "original");
        assert_eq!(tiers[0].max_bitrate, 4_860_000);
        assert_eq!(tiers[1].tier_id, "low");
        assert_eq!(tiers[1].downscale_factor, 4);
        assert_eq!(tiers[1].max_bitrate, 303_000);
    }

    #[test]
    fn bitrate_non_increasing_with_downscale() {
        let tiers = default_tiers(2560, 1440, 60);
        for pair in tiers.windows(2) {
            assert!(pair[0].downscale_factor < pair[1].downscale_factor);
            assert!(pair[0].max_bitrate >= pair[1].max_bitrate);
        }
    }

    #[test]
    fn promote_keeps_parameters() {
        let mut tiers = default_tiers(1920, 1080, 30);
        let low_before = tiers[1].clone();
        assert!(promote(&mut tiers, "low"));
        assert_eq!(tiers[0], low_before);
        assert_eq!(tiers[1].tier_id, "original");
        assert!(!promote(&mut tiers, "missing"));
    }

    #[test]
    fn recompute_preserves_identity() {
        let mut tiers = default_tiers(1920, 1080, 30);
        recompute(&mut tiers, 1280, 720, 24);
        assert_eq!(tiers[0].tier_id, "original");
        assert_eq!(tiers[0].downscale_factor, 1);
        assert_eq!(tiers[0].max_bitrate, bitrate_for(1280, 720, 24));
        assert_eq!(tiers[1].downscale_factor, 4);
        assert_eq!(tiers[1].max_bitrate, bitrate_for(320, 180, 24));
        assert_eq!(tiers[1].max_frame_rate, 24);
    }
}
