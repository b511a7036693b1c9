use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};

use super::{AudioError, AudioSource, CaptureConfig, InputStream, SampleCallback};

/// Mono samples decoded from a WAV file.
pub struct WavClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl WavClip {
    /// Decodes `path`, averaging all channels into one.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, AudioError> {
        let mut reader = hound::WavReader::open(path.as_ref())?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<f32>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<f32>, _>>()?
            }
        };

        let samples = interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    pub fn duration_seconds(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Replays a WAV file into the pipeline at real-time pace, as if it came from a device.
pub struct WavSource {
    path: PathBuf,
    looping: bool,
}

impl WavSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            looping: false,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

impl AudioSource for WavSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn open(
        &mut self,
        config: &CaptureConfig,
        on_data: SampleCallback,
    ) -> Result<Box<dyn InputStream>, AudioError> {
        let clip = WavClip::read(&self.path).map_err(|e| match e {
            AudioError::Wav(hound::Error::IoError(io)) => {
                AudioError::DeviceUnavailable(format!("{}: {}", self.path.display(), io))
            }
            other => other,
        })?;

        if clip.sample_rate != config.sample_rate {
            warn!(
                "{} is {} Hz, analysis assumes {} Hz; band frequencies will be off",
                self.path.display(),
                clip.sample_rate,
                config.sample_rate
            );
        }
        info!(
            "Loaded {} ({:.2}s, {} samples)",
            self.path.display(),
            clip.duration_seconds(),
            clip.samples.len()
        );

        Ok(Box::new(WavStream {
            samples: clip.samples.into(),
            sample_rate: clip.sample_rate,
            buffer_frames: config.buffer_frames.max(1) as usize,
            looping: self.looping,
            position: 0,
            callback: Some(on_data),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }))
    }
}

struct WavStream {
    samples: Arc<[f32]>,
    sample_rate: u32,
    buffer_frames: usize,
    looping: bool,
    position: usize,
    callback: Option<SampleCallback>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<(SampleCallback, usize)>>,
}

impl InputStream for WavStream {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let mut callback = self
            .callback
            .take()
            .ok_or_else(|| AudioError::StreamControl("stream callback lost".to_string()))?;

        let samples = Arc::clone(&self.samples);
        let running = Arc::clone(&self.running);
        let period = Duration::from_secs_f64(self.buffer_frames as f64 / self.sample_rate as f64);
        let buffer_frames = self.buffer_frames;
        let looping = self.looping;
        let mut position = self.position;

        running.store(true, Ordering::SeqCst);
        let worker = thread::Builder::new()
            .name("wav-replay".to_string())
            .spawn(move || {
                let mut next = Instant::now();
                while running.load(Ordering::SeqCst) {
                    if position >= samples.len() {
                        if looping && !samples.is_empty() {
                            position = 0;
                        } else {
                            running.store(false, Ordering::SeqCst);
                            break;
                        }
                    }
                    let end = (position + buffer_frames).min(samples.len());
                    callback(&samples[position..end]);
                    position = end;

                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    }
                }
                (callback, position)
            })
            .map_err(|e| AudioError::StreamControl(e.to_string()))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let (callback, position) = worker
                .join()
                .map_err(|_| AudioError::StreamControl("replay thread panicked".to_string()))?;
            self.callback = Some(callback);
            self.position = position;
        }
        Ok(())
    }
}

impl Drop for WavStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn write_clip(name: &str, channels: u16, frames: &[[i16; 2]]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.wav", name, std::process::id()));
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for frame in frames {
            for &s in &frame[..channels as usize] {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_read_downmixes_to_mono() {
        let path = write_clip("spectra-stereo", 2, &[[16384, -16384], [16384, 16384]]);
        let clip = WavClip::read(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(clip.sample_rate, 44100);
        assert_eq!(clip.samples.len(), 2);
        assert!(clip.samples[0].abs() < 1e-6);
        assert!((clip.samples[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_missing_file_is_unavailable_source() {
        let mut source = WavSource::new("/nonexistent/spectra-visualizer.wav");
        let err = source
            .open(&CaptureConfig::default(), Box::new(|_| {}))
            .err()
            .unwrap();
        assert!(err.is_device_unavailable());
    }

    #[test]
    fn test_replays_whole_clip_then_stops() {
        let frames = vec![[1000i16, 0]; 600];
        let path = write_clip("spectra-replay", 1, &frames);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);

        let config = CaptureConfig {
            buffer_frames: 128,
            ..CaptureConfig::default()
        };
        let mut stream = WavSource::new(&path)
            .open(
                &config,
                Box::new(move |data| sink.lock().unwrap().push(data.len())),
            )
            .unwrap();
        stream.start().unwrap();

        // 600 frames at 44.1 kHz is well under 100 ms of replay.
        thread::sleep(Duration::from_millis(300));
        stream.stop().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(*received.lock().unwrap(), vec![128, 128, 128, 128, 88]);
    }
}
