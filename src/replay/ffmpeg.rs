//! FFmpeg invocation for the replay cutter
//!
//! Two modes: a metadata/progress scan used to learn a recording's duration,
//! and a stream-copy extraction (no re-encode) of a trailing window. Both run
//! as out-of-process tasks awaited asynchronously.

use super::ReplayError;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Parse an FFmpeg time string (`H:MM:SS.ms`, `MM:SS.ms` or bare seconds)
/// into seconds. Unparsable input contributes 0.
pub fn parse_timestamp(raw: &str) -> f64 {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split(':').collect();
    let nums: Vec<f64> = parts
        .iter()
        .map(|p| p.parse::<f64>().unwrap_or(0.0))
        .collect();
    match nums.len() {
        3 => nums[0] * 3600.0 + nums[1] * 60.0 + nums[2],
        2 => nums[0] * 60.0 + nums[1],
        1 => nums[0],
        _ => 0.0,
    }
}

/// Pull the metadata duration and the last progress time out of an FFmpeg
/// stderr transcript. Either may be absent.
pub fn scan_durations(stderr: &str) -> (f64, f64) {
    let mut metadata = 0.0;
    let mut progress = 0.0;
    for line in stderr.lines() {
        if let Some(rest) = line.trim_start().strip_prefix("Duration:") {
            let token = rest.split(',').next().unwrap_or("").trim();
            metadata = parse_timestamp(token);
        }
        // Progress reports repeat; the last one wins.
        if let Some(idx) = line.rfind("time=") {
            let token = line[idx + 5..]
                .split_whitespace()
                .next()
                .unwrap_or("");
            progress = parse_timestamp(token);
        }
    }
    (metadata, progress)
}

/// Learn a file's total duration by running it through a null-output scan.
///
/// Prefers the container's own metadata, falls back to the final progress
/// report; returns 0 when neither is usable (the caller supplies the
/// wall-clock fallback).
pub async fn probe_duration(path: &Path) -> Result<f64, ReplayError> {
    let output = Command::new("ffmpeg")
        .arg("-i")
        .arg(path)
        .args(["-f", "null", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ReplayError::ExternalTool(format!("failed to start ffmpeg: {}", e)))?;

    // The scan's exit status is irrelevant; whatever metadata made it to
    // stderr is still usable.
    let stderr = String::from_utf8_lossy(&output.stderr);
    let (metadata, progress) = scan_durations(&stderr);
    let total = if metadata > 0.0 { metadata } else { progress };
    tracing::debug!(
        "probed {:?}: metadata {}s, progress {}s",
        path,
        metadata,
        progress
    );
    Ok(total)
}

/// The trailing window `[start_offset, start_offset + actual)` for a cut of
/// `seconds` out of `total`. Never a negative offset, never longer than the
/// content.
pub fn replay_window(total: f64, seconds: f64) -> (f64, f64) {
    let actual = seconds.min(total);
    let start_offset = (total - seconds).max(0.0);
    (start_offset, actual)
}

/// Stream-copy the given window into a new file
pub async fn extract_clip(
    input: &Path,
    output_path: &Path,
    start_offset: f64,
    duration: f64,
) -> Result<(), ReplayError> {
    let output = Command::new("ffmpeg")
        .args(["-y", "-ss", &format!("{:.3}", start_offset)])
        .arg("-i")
        .arg(input)
        .args(["-t", &format!("{:.3}", duration), "-c", "copy"])
        .arg(output_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ReplayError::ExternalTool(format!("failed to start ffmpeg: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ReplayError::ExternalTool(format!(
            "ffmpeg exited with error: {}",
            stderr
        )));
    }
    Ok(())
}
