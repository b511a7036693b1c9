pub mod goo;

pub use goo::{GooBlob, GooConfig, GooField};

use anyhow::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::audio::{
    BandMapper, EnergyBands, SnapshotReader, SpectralAnalyzer, SpectrumSnapshot,
    TemporalSmoother, SPECTRUM_BINS,
};
use crate::config::VisualizerConfig;

/// Upper bound on visual bands, sized to the shader's uniform array.
pub const MAX_BARS: usize = 200;

/// Upper bound on goo blobs, sized to the shader's uniform array.
pub const MAX_BLOBS: usize = 64;

/// Frames between pipeline diagnostics (~2 seconds at 60fps).
const DEBUG_LOG_INTERVAL: u64 = 120;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum VisualMode {
    /// Pulsing circle ringed by the band values.
    #[default]
    Circle,
    /// Bar graph of the band values.
    Bars,
    /// Metaball blobs driven by bass, mid and treble.
    Goo,
}

impl VisualMode {
    pub const ALL: [VisualMode; 3] = [VisualMode::Circle, VisualMode::Bars, VisualMode::Goo];

    pub fn next(self) -> Self {
        match self {
            VisualMode::Circle => VisualMode::Bars,
            VisualMode::Bars => VisualMode::Goo,
            VisualMode::Goo => VisualMode::Circle,
        }
    }

    /// Selector passed to the shader.
    pub fn index(self) -> u32 {
        match self {
            VisualMode::Circle => 0,
            VisualMode::Bars => 1,
            VisualMode::Goo => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VisualMode::Circle => "circle",
            VisualMode::Bars => "bars",
            VisualMode::Goo => "goo",
        }
    }
}

/// Everything a renderer consumes for one frame.
#[derive(Debug, Clone, Copy)]
pub struct VisualFrame<'a> {
    pub mode: VisualMode,
    /// Seconds since the pipeline started.
    pub time: f32,
    pub dt: f32,
    pub average_amplitude: f32,
    /// Smoothed band values, lowest frequency first.
    pub bands: &'a [f32],
    pub energy: EnergyBands,
    pub blobs: &'a [GooBlob],
}

/// A rendering layer fed once per frame.
pub trait VisualDriver {
    fn present(&mut self, frame: &VisualFrame<'_>) -> Result<()>;
}

/// Render-thread half of the visualizer: turns the latest spectrum into a
/// [`VisualFrame`].
///
/// Band layout, smoothing state and goo state are owned here and never leave the render
/// thread.
pub struct FramePipeline {
    mapper: BandMapper,
    smoother: TemporalSmoother,
    goo: GooField,
    mode: VisualMode,
    latest: SpectrumSnapshot,
    energy: EnergyBands,
    time: f32,
    frames: u64,
}

impl FramePipeline {
    pub fn new(config: &VisualizerConfig) -> Self {
        Self::with_goo(config, GooField::new(config.goo.clone()))
    }

    pub fn with_goo(config: &VisualizerConfig, goo: GooField) -> Self {
        let mapper = BandMapper::new(config.band_count, SPECTRUM_BINS);
        let smoother = TemporalSmoother::new(mapper.band_count(), config.smoothing.clone());

        Self {
            mapper,
            smoother,
            goo,
            mode: config.mode,
            latest: SpectrumSnapshot::default(),
            energy: EnergyBands::default(),
            time: 0.0,
            frames: 0,
        }
    }

    /// Polls `analyzer` for a newer window and advances one frame. Never waits for audio.
    pub fn advance(&mut self, analyzer: &SpectralAnalyzer, dt: f32) -> VisualFrame<'_> {
        self.advance_from(&analyzer.reader(), dt)
    }

    /// Same as [`advance`](Self::advance), for a render loop that only holds a reader.
    pub fn advance_from(&mut self, reader: &SnapshotReader, dt: f32) -> VisualFrame<'_> {
        if let Some(snapshot) = reader.snapshot_if_newer(self.latest.sequence) {
            self.ingest(snapshot);
        }
        self.step(dt)
    }

    /// Advances one frame from an explicitly supplied snapshot.
    pub fn advance_with(&mut self, snapshot: &SpectrumSnapshot, dt: f32) -> VisualFrame<'_> {
        if snapshot.sequence != self.latest.sequence || self.frames == 0 {
            self.ingest(snapshot.clone());
        }
        self.step(dt)
    }

    fn ingest(&mut self, snapshot: SpectrumSnapshot) {
        self.mapper.map(&snapshot.magnitudes);
        self.energy = EnergyBands::from_spectrum(&snapshot.magnitudes);
        self.latest = snapshot;
    }

    fn step(&mut self, dt: f32) -> VisualFrame<'_> {
        let dt = dt.max(0.0);
        self.time += dt;
        self.frames += 1;

        self.smoother.advance(self.mapper.values(), dt);
        if self.mode == VisualMode::Goo {
            self.goo.update(dt, self.energy.bass, self.time);
        }

        let average_amplitude = self.latest.average_amplitude();
        if self.frames % DEBUG_LOG_INTERVAL == 0 {
            debug!(
                "frame {} window {}: avg={:.4} bass={:.4} mid={:.4} treble={:.4} blobs={}",
                self.frames,
                self.latest.sequence,
                average_amplitude,
                self.energy.bass,
                self.energy.mid,
                self.energy.treble,
                self.goo.len()
            );
        }

        VisualFrame {
            mode: self.mode,
            time: self.time,
            dt,
            average_amplitude,
            bands: self.smoother.smoothed(),
            energy: self.energy,
            blobs: self.goo.blobs(),
        }
    }

    pub fn mode(&self) -> VisualMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: VisualMode) {
        if mode != self.mode {
            info!("Visual mode: {}", mode.name());
            self.mode = mode;
        }
    }

    pub fn cycle_mode(&mut self) {
        self.set_mode(self.mode.next());
    }

    pub fn smoother(&self) -> &TemporalSmoother {
        &self.smoother
    }

    pub fn mapper(&self) -> &BandMapper {
        &self.mapper
    }

    pub fn goo(&self) -> &GooField {
        &self.goo
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}
