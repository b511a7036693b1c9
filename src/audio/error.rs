use thiserror::Error;

/// Failures surfaced by audio sources and the spectral analyzer.
///
/// `DeviceUnavailable` means there is no audio source at all, which callers must not
/// treat as silence.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio input device available: {0}")]
    DeviceUnavailable(String),

    #[error("unsupported capture configuration: {0}")]
    UnsupportedConfig(String),

    #[error("failed to build input stream: {0}")]
    StreamBuild(String),

    #[error("failed to control input stream: {0}")]
    StreamControl(String),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("analyzer is already running")]
    AlreadyRunning,

    #[error("failed to read audio file: {0}")]
    Wav(#[from] hound::Error),
}

impl AudioError {
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, AudioError::DeviceUnavailable(_))
    }
}
