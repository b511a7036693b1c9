use std::path::Path;

use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};

use crate::audio::{SpectralAnalyzer, WavClip};
use crate::config::VisualizerConfig;
use crate::visual::{FramePipeline, GooField, VisualFrame};

/// Frame-by-frame record of what the visualizer would have drawn for a clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumDump {
    pub clip_info: ClipInfo,
    pub frames: Vec<DumpFrame>,
    pub statistics: DumpStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipInfo {
    pub name: String,
    pub duration_seconds: f32,
    pub sample_rate: u32,
    pub total_samples: usize,
    pub fps: f32,
    pub band_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpFrame {
    pub time: f32,
    /// Transform windows completed when this frame was produced.
    pub window: u64,
    pub average_amplitude: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    /// Index of the tallest smoothed band.
    pub loudest_band: usize,
    pub band_mean: f32,
    pub blob_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bands: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DumpStatistics {
    pub windows: u64,
    pub peak_average_amplitude: f32,
    pub peak_bass: f32,
    pub peak_mid: f32,
    pub peak_treble: f32,
    pub mean_band_level: f32,
    pub max_blobs: usize,
}

impl DumpFrame {
    fn from_frame(frame: &VisualFrame<'_>, window: u64, include_bands: bool) -> Self {
        let (loudest_band, _) = frame
            .bands
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        let band_mean = if frame.bands.is_empty() {
            0.0
        } else {
            frame.bands.iter().sum::<f32>() / frame.bands.len() as f32
        };

        Self {
            time: frame.time,
            window,
            average_amplitude: frame.average_amplitude,
            bass: frame.energy.bass,
            mid: frame.energy.mid,
            treble: frame.energy.treble,
            loudest_band,
            band_mean,
            blob_count: frame.blobs.len(),
            bands: include_bands.then(|| frame.bands.to_vec()),
        }
    }
}

impl DumpStatistics {
    fn update(&mut self, frame: &DumpFrame) {
        self.windows = self.windows.max(frame.window);
        self.peak_average_amplitude = self.peak_average_amplitude.max(frame.average_amplitude);
        self.peak_bass = self.peak_bass.max(frame.bass);
        self.peak_mid = self.peak_mid.max(frame.mid);
        self.peak_treble = self.peak_treble.max(frame.treble);
        self.max_blobs = self.max_blobs.max(frame.blob_count);
    }
}

/// Pushes `clip` through the live pipeline in video-frame sized slices, as if it were
/// captured in real time at `fps`.
pub fn dump_clip(
    name: &str,
    clip: &WavClip,
    config: &VisualizerConfig,
    fps: f32,
    include_bands: bool,
) -> SpectrumDump {
    let fps = fps.max(1.0);
    let dt = 1.0 / fps;
    let samples_per_frame = clip.sample_rate as f64 / fps as f64;
    let frame_count = (clip.samples.len() as f64 / samples_per_frame).ceil() as usize;

    let analyzer = SpectralAnalyzer::new(config.capture.clone());
    let mut processor = analyzer.processor();
    // Fixed seed so two dumps of the same clip are identical.
    let mut pipeline = FramePipeline::with_goo(config, GooField::with_seed(config.goo.clone(), 0));

    let mut frames = Vec::with_capacity(frame_count);
    let mut statistics = DumpStatistics::default();
    let mut level_sum = 0.0f64;
    let mut position = 0;

    for k in 0..frame_count {
        let end = (((k + 1) as f64 * samples_per_frame).round() as usize).min(clip.samples.len());
        processor.on_samples_available(&clip.samples[position..end]);
        position = end;

        let frame = pipeline.advance(&analyzer, dt);
        let record = DumpFrame::from_frame(&frame, processor.windows_processed(), include_bands);
        statistics.update(&record);
        level_sum += record.band_mean as f64;
        frames.push(record);

        if frames.len() % 1000 == 0 {
            info!("Dumped {} of {} frames", frames.len(), frame_count);
        }
    }

    if !frames.is_empty() {
        statistics.mean_band_level = (level_sum / frames.len() as f64) as f32;
    }

    SpectrumDump {
        clip_info: ClipInfo {
            name: name.to_string(),
            duration_seconds: clip.duration_seconds(),
            sample_rate: clip.sample_rate,
            total_samples: clip.samples.len(),
            fps,
            band_count: pipeline.mapper().band_count(),
        },
        frames,
        statistics,
    }
}

impl SpectrumDump {
    pub fn save<P: AsRef<Path>>(&self, output_path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(output_path, json)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let json = std::fs::read_to_string(input_path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
