//! Rolling per-stream recorders feeding the replay cutter
//!
//! Each active stream gets one open container file that media chunks are
//! appended to as they arrive. A small in-memory tail of recent chunks is
//! retained alongside the file and recycled once it reaches a fixed depth,
//! so a replay request only ever touches the on-disk copy.

use super::ffmpeg;
use super::ReplayError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;

/// In-memory chunk tail is recycled once it reaches this depth.
pub const CHUNK_BUFFER_DEPTH: usize = 30;

/// Recordings (and cut clips) older than this are removed on cleanup.
const MAX_FILE_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifecycle notifications emitted by the recorder
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    Started { class_id: String },
    Stopped { class_id: String },
    ClipCut { class_id: String, path: PathBuf },
}

struct Recording {
    path: PathBuf,
    file: File,
    started_at: Instant,
    chunk_tail: Vec<Vec<u8>>,
}

/// Maintains one open recording per stream class id and cuts trailing
/// windows out of them on demand.
pub struct RollingRecorder {
    dir: PathBuf,
    recordings: HashMap<String, Recording>,
    event_tx: broadcast::Sender<RecorderEvent>,
}

impl RollingRecorder {
    /// Create a recorder writing into `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let (event_tx, _) = broadcast::channel(64);
        Ok(Self {
            dir,
            recordings: HashMap::new(),
            event_tx,
        })
    }

    /// Subscribe to recorder lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.event_tx.subscribe()
    }

    /// Ids of the streams currently being recorded
    pub fn active(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.recordings.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Depth of the in-memory chunk tail for a stream, if it is recording
    pub fn buffered_chunks(&self, class_id: &str) -> Option<usize> {
        self.recordings.get(class_id).map(|r| r.chunk_tail.len())
    }

    /// Open a new recording for `class_id`, replacing any existing one.
    pub async fn start(&mut self, class_id: &str) -> Result<PathBuf, ReplayError> {
        if self.recordings.contains_key(class_id) {
            tracing::info!("replacing active recording for {}", class_id);
            self.stop(class_id).await?;
        }
        let path = self.dir.join(format!(
            "{}-{}.webm",
            class_id,
            chrono::Utc::now().timestamp_millis()
        ));
        let file = File::create(&path).await?;
        self.recordings.insert(
            class_id.to_string(),
            Recording {
                path: path.clone(),
                file,
                started_at: Instant::now(),
                chunk_tail: Vec::new(),
            },
        );
        tracing::info!("recording {} -> {:?}", class_id, path);
        let _ = self.event_tx.send(RecorderEvent::Started {
            class_id: class_id.to_string(),
        });
        Ok(path)
    }

    /// Append a media chunk to the stream's recording.
    ///
    /// The chunk is written through to disk immediately; the in-memory tail
    /// is recycled when it reaches [`CHUNK_BUFFER_DEPTH`].
    pub async fn append_chunk(&mut self, class_id: &str, data: &[u8]) -> Result<(), ReplayError> {
        let recording = self
            .recordings
            .get_mut(class_id)
            .ok_or_else(|| ReplayError::RecordingNotFound(class_id.to_string()))?;
        recording.file.write_all(data).await?;
        recording.chunk_tail.push(data.to_vec());
        if recording.chunk_tail.len() >= CHUNK_BUFFER_DEPTH {
            recording.chunk_tail.clear();
        }
        Ok(())
    }

    /// Close the stream's recording. Stopping a stream that is not recording
    /// is reported but not an error.
    pub async fn stop(&mut self, class_id: &str) -> Result<(), ReplayError> {
        match self.recordings.remove(class_id) {
            Some(mut recording) => {
                recording.file.flush().await?;
                tracing::info!("stopped recording {}", class_id);
                let _ = self.event_tx.send(RecorderEvent::Stopped {
                    class_id: class_id.to_string(),
                });
            }
            None => {
                tracing::warn!("stop requested for {} but nothing is recording", class_id);
            }
        }
        Ok(())
    }

    /// Cut the trailing `seconds` of the stream's recording into a new clip
    /// file and return its path.
    pub async fn cut(&mut self, class_id: &str, seconds: f64) -> Result<PathBuf, ReplayError> {
        let (path, elapsed) = {
            let recording = self
                .recordings
                .get_mut(class_id)
                .ok_or_else(|| ReplayError::RecordingNotFound(class_id.to_string()))?;
            recording.file.flush().await?;
            (recording.path.clone(), recording.started_at.elapsed())
        };

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| ReplayError::EmptyOrMissingFile(path.display().to_string()))?;
        if meta.len() == 0 {
            return Err(ReplayError::EmptyOrMissingFile(path.display().to_string()));
        }

        let mut total = ffmpeg::probe_duration(&path).await?;
        if total <= 0.0 {
            // Immature containers often carry no duration metadata yet;
            // wall-clock recording time is the closest estimate available.
            total = elapsed.as_secs_f64();
            tracing::debug!("no probed duration for {}, using elapsed {}s", class_id, total);
        }

        let (start_offset, actual) = ffmpeg::replay_window(total, seconds);
        let clip_path = self.dir.join(format!(
            "{}-{}-clip.webm",
            class_id,
            chrono::Utc::now().timestamp_millis()
        ));
        ffmpeg::extract_clip(&path, &clip_path, start_offset, actual).await?;
        tracing::info!(
            "cut {:.1}s of {} (offset {:.1}s) -> {:?}",
            actual,
            class_id,
            start_offset,
            clip_path
        );
        let _ = self.event_tx.send(RecorderEvent::ClipCut {
            class_id: class_id.to_string(),
            path: clip_path.clone(),
        });
        Ok(clip_path)
    }

    /// Stop all recordings and delete stale files from the recording
    /// directory. Individual deletion failures are logged, not propagated.
    pub async fn cleanup(&mut self) {
        let active: Vec<String> = self.recordings.keys().cloned().collect();
        for class_id in active {
            if let Err(e) = self.stop(&class_id).await {
                tracing::warn!("failed to stop {} during cleanup: {}", class_id, e);
            }
        }

        let now = SystemTime::now();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("cleanup could not read {:?}: {}", self.dir, e);
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let modified = entry.metadata().and_then(|m| m.modified());
            let expired = matches!(modified, Ok(modified) if is_expired(modified, now));
            if expired {
                match std::fs::remove_file(&path) {
                    Ok(()) => tracing::info!("removed stale recording {:?}", path),
                    Err(e) => tracing::warn!("failed to remove {:?}: {}", path, e),
                }
            }
        }
    }
}

fn is_expired(modified: SystemTime, now: SystemTime) -> bool {
    now.duration_since(modified)
        .map(|age| age > MAX_FILE_AGE)
        .unwrap_or(false)
}
