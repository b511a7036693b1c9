use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use winit::{
    event::{ElementState, Event, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::WindowBuilder,
};

use spectra_visualizer::audio::{AudioSource, CpalSource, SpectralAnalyzer, WavSource};
use spectra_visualizer::config::VisualizerConfig;
use spectra_visualizer::graphics::GraphicsEngine;
use spectra_visualizer::visual::{FramePipeline, VisualDriver, VisualMode};

#[derive(Parser)]
#[command(name = "spectra-visualizer")]
#[command(about = "Real-time audio spectrum visualizer")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Initial visual mode
    #[arg(short, long, value_enum)]
    mode: Option<VisualMode>,

    /// Replay a WAV file instead of capturing from a device
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Capture from the first input device whose name contains this text
    #[arg(short, long)]
    device: Option<String>,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Write the effective configuration to FILE and exit
    #[arg(long, value_name = "FILE")]
    dump_config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_devices {
        for name in CpalSource::list_input_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => VisualizerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => VisualizerConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.mode = mode;
    }

    if let Some(path) = &args.dump_config {
        config.save(path)?;
        info!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    info!("Starting spectra-visualizer");

    let mut source: Box<dyn AudioSource> = match (&args.input, &args.device) {
        (Some(path), _) => Box::new(WavSource::new(path).looping(true)),
        (None, Some(name)) => Box::new(CpalSource::with_device_name(name.as_str())),
        (None, None) => Box::new(CpalSource::new()),
    };

    let mut analyzer = SpectralAnalyzer::new(config.capture.clone());
    match analyzer.start(source.as_mut()) {
        Ok(()) => {}
        Err(e) if e.is_device_unavailable() => {
            error!("No audio input ({}); visuals will stay silent", e);
        }
        Err(e) => return Err(e.into()),
    }

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Spectra Visualizer")
            .with_inner_size(winit::dpi::LogicalSize::new(1200, 800))
            .build(&event_loop)?,
    );

    let mut graphics_engine = pollster::block_on(GraphicsEngine::new(Arc::clone(&window)))?;
    let mut pipeline = FramePipeline::new(&config);
    let mut last_frame = Instant::now();

    info!(
        "Visualizer initialized ({} bands, mode {})",
        config.band_count,
        pipeline.mode().name()
    );

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Err(e) = analyzer.stop() {
                    warn!("Failed to stop audio stream: {}", e);
                }
                elwt.exit();
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => {
                        info!("Escape pressed");
                        elwt.exit();
                    }
                    PhysicalKey::Code(KeyCode::Digit1) => pipeline.set_mode(VisualMode::Circle),
                    PhysicalKey::Code(KeyCode::Digit2) => pipeline.set_mode(VisualMode::Bars),
                    PhysicalKey::Code(KeyCode::Digit3) => pipeline.set_mode(VisualMode::Goo),
                    PhysicalKey::Code(KeyCode::Tab) => pipeline.cycle_mode(),
                    _ => {}
                }
            }
            WindowEvent::Resized(physical_size) => {
                graphics_engine.resize(physical_size);
            }
            WindowEvent::RedrawRequested => {
                while let Some(e) = analyzer.poll_stream_error() {
                    warn!("Audio stream error: {}", e);
                }

                let now = Instant::now();
                let dt = now.duration_since(last_frame).as_secs_f32();
                last_frame = now;

                let frame = pipeline.advance(&analyzer, dt);
                if let Err(e) = graphics_engine.present(&frame) {
                    error!("Render error: {}", e);
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            window.request_redraw();
        }
        _ => {}
    })?;

    Ok(())
}
