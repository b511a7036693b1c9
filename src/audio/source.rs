use std::sync::{Arc, Mutex, MutexGuard};

use log::info;

use super::{AudioError, CaptureConfig};

/// Callback handed to a source; invoked once per driver buffer with mono samples.
pub type SampleCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// A stream returned by [`AudioSource::open`]. Dropping it releases the device.
pub trait InputStream {
    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;

    /// Takes one runtime error reported by the driver since the last call, if any.
    fn poll_error(&self) -> Option<AudioError> {
        None
    }
}

/// Anything that can deliver mono f32 samples to a callback.
///
/// The spectral analyzer only talks to this trait, so it runs the same way on a real
/// input device, a WAV file or an in-memory feed.
pub trait AudioSource {
    fn name(&self) -> String;

    fn open(
        &mut self,
        config: &CaptureConfig,
        on_data: SampleCallback,
    ) -> Result<Box<dyn InputStream>, AudioError>;
}

struct FeedState {
    callback: Option<SampleCallback>,
    running: bool,
    buffer_frames: usize,
}

/// Handle used to push samples into an open [`SyntheticSource`] stream.
#[derive(Clone)]
pub struct SyntheticFeed {
    state: Arc<Mutex<FeedState>>,
}

impl SyntheticFeed {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FeedState {
                callback: None,
                running: false,
                buffer_frames: CaptureConfig::default().buffer_frames as usize,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delivers `samples` in driver-sized buffers. Returns false when the stream is not
    /// open and started.
    pub fn push(&self, samples: &[f32]) -> bool {
        let mut state = self.lock();
        if !state.running {
            return false;
        }
        let chunk = state.buffer_frames.max(1);
        match state.callback.as_mut() {
            Some(callback) => {
                for buffer in samples.chunks(chunk) {
                    callback(buffer);
                }
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }
}

/// In-memory source for tests and headless runs.
pub struct SyntheticSource {
    feed: SyntheticFeed,
    available: bool,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            feed: SyntheticFeed::new(),
            available: true,
        }
    }

    /// A source whose `open` always fails as if no device were present.
    pub fn unavailable() -> Self {
        Self {
            feed: SyntheticFeed::new(),
            available: false,
        }
    }

    pub fn feed(&self) -> SyntheticFeed {
        self.feed.clone()
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for SyntheticSource {
    fn name(&self) -> String {
        "synthetic".to_string()
    }

    fn open(
        &mut self,
        config: &CaptureConfig,
        on_data: SampleCallback,
    ) -> Result<Box<dyn InputStream>, AudioError> {
        if !self.available {
            return Err(AudioError::DeviceUnavailable(
                "synthetic source is disabled".to_string(),
            ));
        }

        let mut state = self.feed.lock();
        state.callback = Some(on_data);
        state.running = false;
        state.buffer_frames = config.buffer_frames as usize;
        drop(state);

        info!("Opened synthetic source ({} frames per buffer)", config.buffer_frames);
        Ok(Box::new(SyntheticStream {
            feed: self.feed.clone(),
        }))
    }
}

struct SyntheticStream {
    feed: SyntheticFeed,
}

impl InputStream for SyntheticStream {
    fn start(&mut self) -> Result<(), AudioError> {
        self.feed.lock().running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.feed.lock().running = false;
        Ok(())
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        let mut state = self.feed.lock();
        state.running = false;
        state.callback = None;
    }
}

/// `len` samples of a sine wave.
pub fn sine_wave(frequency: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<f32> {
    let step = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    (0..len)
        .map(|n| amplitude * (step * n as f32).sin())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_push_before_start_is_dropped() {
        let mut source = SyntheticSource::new();
        let feed = source.feed();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);

        let mut stream = source
            .open(
                &CaptureConfig::default(),
                Box::new(move |data| {
                    seen_cb.fetch_add(data.len(), Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(!feed.push(&[0.0; 64]));
        stream.start().unwrap();
        assert!(feed.push(&[0.0; 600]));
        assert_eq!(seen.load(Ordering::SeqCst), 600);

        stream.stop().unwrap();
        assert!(!feed.push(&[0.0; 64]));
    }

    #[test]
    fn test_push_uses_driver_buffer_size() {
        let mut source = SyntheticSource::new();
        let feed = source.feed();
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let sizes_cb = Arc::clone(&sizes);

        let mut stream = source
            .open(
                &CaptureConfig::default(),
                Box::new(move |data| sizes_cb.lock().unwrap().push(data.len())),
            )
            .unwrap();
        stream.start().unwrap();
        feed.push(&[0.0; 600]);

        assert_eq!(*sizes.lock().unwrap(), vec![256, 256, 88]);
    }

    #[test]
    fn test_unavailable_source_reports_missing_device() {
        let mut source = SyntheticSource::unavailable();
        let err = source
            .open(&CaptureConfig::default(), Box::new(|_| {}))
            .err()
            .unwrap();
        assert!(err.is_device_unavailable());
    }

    #[test]
    fn test_dropping_stream_detaches_callback() {
        let mut source = SyntheticSource::new();
        let feed = source.feed();
        let mut stream = source
            .open(&CaptureConfig::default(), Box::new(|_| {}))
            .unwrap();
        stream.start().unwrap();
        drop(stream);

        assert!(!feed.is_running());
        assert!(!feed.push(&[0.0; 16]));
    }
}
