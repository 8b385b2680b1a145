//! Error types and handling
//!
//! Common error types used across the runtime. Each subsystem keeps its own
//! error enum next to its module; this aggregates them for callers that need
//! a single error surface (and a stable code for reporting over signaling).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::store::ConfigError;
use crate::devices::DeviceError;
use crate::replay::ReplayError;
use crate::signaling::SignalingError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Error report suitable for a signaling acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorReport {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Signaling(SignalingError::NotConnected) => "NOT_CONNECTED",
            AppError::Signaling(SignalingError::AuthenticationFailed { .. }) => "AUTH_FAILED",
            AppError::Signaling(_) => "SIGNALING_ERROR",
            AppError::Device(DeviceError::DeviceUnavailable(_)) => "DEVICE_UNAVAILABLE",
            AppError::Device(DeviceError::AcquisitionFailed(_)) => "ACQUISITION_FAILED",
            AppError::Device(_) => "DEVICE_ERROR",
            AppError::Replay(ReplayError::RecordingNotFound(_)) => "RECORDING_NOT_FOUND",
            AppError::Replay(ReplayError::EmptyOrMissingFile(_)) => "EMPTY_OR_MISSING_FILE",
            AppError::Replay(ReplayError::ExternalTool(_)) => "EXTERNAL_TOOL_FAILURE",
            AppError::Replay(_) => "REPLAY_ERROR",
            AppError::Config(_) => "PERSISTENCE_FAILURE",
        };

        ErrorReport {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_carries_stable_codes() {
        let report: ErrorReport = AppError::from(SignalingError::NotConnected).into();
        assert_eq!(report.code, "NOT_CONNECTED");

        let report: ErrorReport =
            AppError::from(ReplayError::RecordingNotFound("camera_main".into())).into();
        assert_eq!(report.code, "RECORDING_NOT_FOUND");
        assert!(report.message.contains("camera_main"));
    }
}
