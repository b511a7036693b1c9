pub mod analyzer;
pub mod bands;
pub mod device;
pub mod error;
pub mod smoother;
pub mod source;
pub mod wav;

pub use analyzer::{CaptureProcessor, SnapshotReader, SpectralAnalyzer};
pub use bands::{BandMapper, BandRange, EnergyBands};
pub use device::CpalSource;
pub use error::AudioError;
pub use smoother::{BandState, SmoothingConfig, TemporalSmoother};
pub use source::{AudioSource, InputStream, SampleCallback, SyntheticFeed, SyntheticSource};
pub use wav::{WavClip, WavSource};

use serde::{Deserialize, Serialize};

/// Samples per transform window.
pub const FFT_SIZE: usize = 1024;

/// Non-redundant half of a real-input transform.
pub const SPECTRUM_BINS: usize = FFT_SIZE / 2;

pub const SAMPLE_RATE: u32 = 44100;

/// Parameters requested from an audio source when it is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per driver callback. The driver may pick something else.
    pub buffer_frames: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: 1,
            buffer_frames: 256,
        }
    }
}

/// Point-in-time copy of the magnitude spectrum.
///
/// The magnitudes are a fixed-size array so a reader can never observe a partially
/// written or differently sized spectrum.
#[derive(Clone, PartialEq)]
pub struct SpectrumSnapshot {
    pub magnitudes: [f32; SPECTRUM_BINS],
    /// Number of windows transformed before this snapshot was taken. Zero means no
    /// window has completed yet.
    pub sequence: u64,
}

impl SpectrumSnapshot {
    pub fn average_amplitude(&self) -> f32 {
        self.magnitudes.iter().sum::<f32>() / SPECTRUM_BINS as f32
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Index of the strongest bin, ignoring DC.
    pub fn peak_bin(&self) -> usize {
        self.magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .fold((0, f32::MIN), |best, (i, &m)| if m > best.1 { (i, m) } else { best })
            .0
    }
}

impl Default for SpectrumSnapshot {
    fn default() -> Self {
        Self {
            magnitudes: [0.0; SPECTRUM_BINS],
            sequence: 0,
        }
    }
}

impl std::fmt::Debug for SpectrumSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumSnapshot")
            .field("sequence", &self.sequence)
            .field("bins", &self.magnitudes.len())
            .field("average", &self.average_amplitude())
            .finish()
    }
}
