//! Rolling recording and replay clip extraction

pub mod ffmpeg;
pub mod recorder;

use thiserror::Error;

pub use recorder::{RecorderEvent, RollingRecorder, CHUNK_BUFFER_DEPTH};

/// Errors from the recording and replay pipeline
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No active recording for stream {0}")]
    RecordingNotFound(String),

    #[error("Recording file is empty or missing: {0}")]
    EmptyOrMissingFile(String),

    #[error("External tool failure: {0}")]
    ExternalTool(String),
}
