use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use spectra_visualizer::audio::{WavClip, SAMPLE_RATE};
use spectra_visualizer::config::VisualizerConfig;
use spectra_visualizer::offline::dump_clip;
use spectra_visualizer::visual::VisualMode;

#[derive(Parser)]
#[command(name = "spectrum-dump")]
#[command(about = "Run a WAV file through the visualizer pipeline and dump per-frame JSON")]
struct Args {
    /// WAV file to analyze
    #[arg()]
    input_file: PathBuf,

    /// Output JSON file
    #[arg(short, long, default_value = "spectrum_dump.json")]
    output: PathBuf,

    /// Simulated render frame rate
    #[arg(long, default_value = "60")]
    fps: f32,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Visual mode to simulate (goo also records blob growth)
    #[arg(short, long, value_enum)]
    mode: Option<VisualMode>,

    /// Include every smoothed band value in each frame
    #[arg(long)]
    bands: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => VisualizerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => VisualizerConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.mode = mode;
    }

    info!("Input file: {}", args.input_file.display());
    let clip = WavClip::read(&args.input_file)
        .with_context(|| format!("reading {}", args.input_file.display()))?;
    if clip.sample_rate != SAMPLE_RATE {
        warn!(
            "{} is {} Hz, analysis assumes {} Hz",
            args.input_file.display(),
            clip.sample_rate,
            SAMPLE_RATE
        );
    }
    info!(
        "Loaded {} samples ({:.2}s), simulating {} fps in {} mode",
        clip.samples.len(),
        clip.duration_seconds(),
        args.fps,
        config.mode.name()
    );

    let name = args
        .input_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dump = dump_clip(&name, &clip, &config, args.fps, args.bands);

    let stats = &dump.statistics;
    info!("Frames: {}, windows: {}", dump.frames.len(), stats.windows);
    info!(
        "Peak bass {:.4}, mid {:.4}, treble {:.4}, average {:.4}",
        stats.peak_bass, stats.peak_mid, stats.peak_treble, stats.peak_average_amplitude
    );
    info!("Mean band level {:.4}, max blobs {}", stats.mean_band_level, stats.max_blobs);

    dump.save(&args.output)?;
    let file_size = std::fs::metadata(&args.output)?.len();
    info!(
        "Saved {} ({:.1} KB)",
        args.output.display(),
        file_size as f64 / 1024.0
    );

    Ok(())
}
