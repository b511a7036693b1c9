use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::{CaptureConfig, SmoothingConfig, SAMPLE_RATE, SPECTRUM_BINS};
use crate::visual::{GooConfig, VisualMode, MAX_BARS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Everything tunable about the visualizer, loadable from a JSON file.
///
/// Missing fields fall back to their defaults, so a file only needs to name what it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    /// Number of visual bands the spectrum is split into.
    pub band_count: usize,
    pub mode: VisualMode,
    pub capture: CaptureConfig,
    pub smoothing: SmoothingConfig,
    pub goo: GooConfig,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            band_count: MAX_BARS,
            mode: VisualMode::default(),
            capture: CaptureConfig::default(),
            smoothing: SmoothingConfig::default(),
            goo: GooConfig::default(),
        }
    }
}

impl VisualizerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.band_count == 0 || self.band_count > MAX_BARS {
            return Err(ConfigError::invalid(
                "band_count",
                format!("must be between 1 and {}", MAX_BARS),
            ));
        }
        if self.band_count > SPECTRUM_BINS {
            return Err(ConfigError::invalid(
                "band_count",
                format!("cannot exceed {} spectrum bins", SPECTRUM_BINS),
            ));
        }
        // The transform size is fixed, so the bin layout only holds at this rate.
        if self.capture.sample_rate != SAMPLE_RATE {
            return Err(ConfigError::invalid(
                "capture.sample_rate",
                format!("only {} Hz is supported", SAMPLE_RATE),
            ));
        }
        if self.capture.channels == 0 {
            return Err(ConfigError::invalid("capture.channels", "must be at least 1"));
        }
        if self.capture.buffer_frames == 0 {
            return Err(ConfigError::invalid("capture.buffer_frames", "must be > 0"));
        }
        self.smoothing.validate()?;
        self.goo.validate()?;
        Ok(())
    }
}
