use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::{
    AudioError, AudioSource, CaptureConfig, InputStream, SampleCallback, SpectrumSnapshot,
    FFT_SIZE, SPECTRUM_BINS,
};

type SharedSnapshot = Arc<Mutex<SpectrumSnapshot>>;

fn lock_snapshot(shared: &Mutex<SpectrumSnapshot>) -> MutexGuard<'_, SpectrumSnapshot> {
    // A panic while holding the lock can only happen mid-copy of plain floats; the data
    // is still a valid spectrum.
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Writer half of the analyzer. Lives inside the audio callback.
///
/// Everything the callback touches is allocated up front, so handling a buffer never
/// allocates and the snapshot lock is held only for a 512-float copy.
pub struct CaptureProcessor {
    window: Box<[f32]>,
    cursor: usize,
    fft: Arc<dyn Fft<f32>>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: [f32; SPECTRUM_BINS],
    windows: u64,
    shared: SharedSnapshot,
}

impl CaptureProcessor {
    fn new(fft: Arc<dyn Fft<f32>>, shared: SharedSnapshot) -> Self {
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            window: vec![0.0; FFT_SIZE].into_boxed_slice(),
            cursor: 0,
            fft,
            spectrum: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes: [0.0; SPECTRUM_BINS],
            windows: 0,
            shared,
        }
    }

    /// Appends samples to the capture window, transforming and publishing each time the
    /// window fills.
    pub fn on_samples_available(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.window[self.cursor] = sample;
            self.cursor += 1;

            if self.cursor == FFT_SIZE {
                self.cursor = 0;
                self.transform_window();
            }
        }
    }

    fn transform_window(&mut self) {
        // No window function: leakage is part of the expected output.
        for (slot, &sample) in self.spectrum.iter_mut().zip(self.window.iter()) {
            *slot = Complex::new(sample, 0.0);
        }

        self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);

        for (magnitude, c) in self.magnitudes.iter_mut().zip(&self.spectrum[..SPECTRUM_BINS]) {
            *magnitude = (c.re * c.re + c.im * c.im).sqrt();
        }
        self.windows += 1;

        // Counted in the shared snapshot so it keeps rising across restarts.
        let mut snapshot = lock_snapshot(&self.shared);
        snapshot.magnitudes = self.magnitudes;
        snapshot.sequence += 1;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Windows transformed by this processor alone.
    pub fn windows_processed(&self) -> u64 {
        self.windows
    }
}

/// Cloneable read handle on an analyzer's snapshot. Unlike the analyzer itself, which
/// owns a platform stream, it can be sent to and shared between threads.
#[derive(Clone)]
pub struct SnapshotReader {
    shared: SharedSnapshot,
}

impl SnapshotReader {
    pub fn snapshot(&self) -> SpectrumSnapshot {
        lock_snapshot(&self.shared).clone()
    }

    /// Like [`snapshot`](Self::snapshot) but returns `None` when no window has completed
    /// since `last_sequence`.
    pub fn snapshot_if_newer(&self, last_sequence: u64) -> Option<SpectrumSnapshot> {
        let snapshot = lock_snapshot(&self.shared);
        if snapshot.sequence > last_sequence {
            Some(snapshot.clone())
        } else {
            None
        }
    }

    pub fn average_amplitude(&self) -> f32 {
        self.snapshot().average_amplitude()
    }
}

/// Maintains a continuous frequency-domain view of recent audio input.
///
/// The analyzer owns the transform plan, the shared snapshot and the open stream. Any
/// number of analyzers can exist side by side; each one publishes only to its own
/// snapshot.
pub struct SpectralAnalyzer {
    config: CaptureConfig,
    fft: Arc<dyn Fft<f32>>,
    reader: SnapshotReader,
    stream: Option<Box<dyn InputStream>>,
    source_name: Option<String>,
}

impl SpectralAnalyzer {
    pub fn new(config: CaptureConfig) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        Self {
            config,
            fft,
            reader: SnapshotReader {
                shared: Arc::new(Mutex::new(SpectrumSnapshot::default())),
            },
            stream: None,
            source_name: None,
        }
    }

    /// A writer bound to this analyzer's snapshot, for driving the pipeline directly
    /// without a stream.
    pub fn processor(&self) -> CaptureProcessor {
        CaptureProcessor::new(Arc::clone(&self.fft), Arc::clone(&self.reader.shared))
    }

    /// A handle for reading snapshots from other threads.
    pub fn reader(&self) -> SnapshotReader {
        self.reader.clone()
    }

    /// Opens `source` and starts capturing. A source that cannot be opened is reported
    /// as an error and leaves the analyzer stopped.
    pub fn start(&mut self, source: &mut dyn AudioSource) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Err(AudioError::AlreadyRunning);
        }

        let mut processor = self.processor();
        let callback: SampleCallback =
            Box::new(move |samples: &[f32]| processor.on_samples_available(samples));

        let mut stream = source.open(&self.config, callback)?;
        stream.start()?;

        let name = source.name();
        info!(
            "Spectral analyzer capturing from '{}' ({} Hz, {} frame buffers, {}-point FFT)",
            name, self.config.sample_rate, self.config.buffer_frames, FFT_SIZE
        );
        self.stream = Some(stream);
        self.source_name = Some(name);
        Ok(())
    }

    /// Stops and releases the stream. The last snapshot stays readable.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        if let Some(mut stream) = self.stream.take() {
            let result = stream.stop();
            info!(
                "Spectral analyzer stopped ('{}')",
                self.source_name.take().unwrap_or_default()
            );
            result?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn snapshot(&self) -> SpectrumSnapshot {
        self.reader.snapshot()
    }

    pub fn snapshot_if_newer(&self, last_sequence: u64) -> Option<SpectrumSnapshot> {
        self.reader.snapshot_if_newer(last_sequence)
    }

    pub fn average_amplitude(&self) -> f32 {
        self.reader.average_amplitude()
    }

    pub fn poll_stream_error(&self) -> Option<AudioError> {
        self.stream.as_ref().and_then(|stream| stream.poll_error())
    }
}

impl Drop for SpectralAnalyzer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop audio stream cleanly: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::sine_wave;
    use crate::audio::{SyntheticSource, SAMPLE_RATE};
    use std::thread;

    fn bin_frequency(bin: f32) -> f32 {
        bin * SAMPLE_RATE as f32 / FFT_SIZE as f32
    }

    fn analyze(samples: &[f32]) -> SpectrumSnapshot {
        let analyzer = SpectralAnalyzer::new(CaptureConfig::default());
        let mut processor = analyzer.processor();
        processor.on_samples_available(samples);
        analyzer.snapshot()
    }

    #[test]
    fn test_sine_at_bin_centre_peaks_at_that_bin() {
        for bin in [1usize, 5, 17, 64, 200, 400, 510] {
            let samples = sine_wave(bin_frequency(bin as f32), 1.0, SAMPLE_RATE, FFT_SIZE);
            let snapshot = analyze(&samples);

            assert_eq!(snapshot.peak_bin(), bin);
            // Unwindowed transform of a unit sine: N/2 at the bin.
            assert!((snapshot.magnitudes[bin] - 512.0).abs() < 1.0);
        }
    }

    #[test]
    fn test_off_centre_sine_peaks_within_one_bin() {
        for bin in [10.3f32, 33.5, 120.8, 301.25] {
            let samples = sine_wave(bin_frequency(bin), 0.5, SAMPLE_RATE, FFT_SIZE);
            let peak = analyze(&samples).peak_bin() as f32;
            assert!((peak - bin).abs() <= 1.0, "expected ~{}, got {}", bin, peak);
        }
    }

    #[test]
    fn test_no_window_function_applied() {
        let snapshot = analyze(&[1.0; FFT_SIZE]);

        assert!((snapshot.magnitudes[0] - FFT_SIZE as f32).abs() < 1e-2);
        // A Hann window would spread a constant into bin 1.
        assert!(snapshot.magnitudes[1..].iter().all(|&m| m < 1e-2));
    }

    #[test]
    fn test_one_transform_per_wrap() {
        let analyzer = SpectralAnalyzer::new(CaptureConfig::default());
        let mut processor = analyzer.processor();

        processor.on_samples_available(&[0.1; FFT_SIZE - 1]);
        assert_eq!(processor.windows_processed(), 0);
        assert_eq!(analyzer.snapshot().sequence, 0);

        processor.on_samples_available(&[0.1]);
        assert_eq!(processor.windows_processed(), 1);
        assert_eq!(processor.cursor(), 0);
        assert_eq!(analyzer.snapshot().sequence, 1);

        processor.on_samples_available(&vec![0.1; FFT_SIZE * 2 + 100]);
        assert_eq!(processor.windows_processed(), 3);
        assert_eq!(processor.cursor(), 100);
    }

    #[test]
    fn test_magnitudes_non_negative_and_finite() {
        let noise: Vec<f32> = (0..FFT_SIZE)
            .map(|n| ((n * 7919) % 113) as f32 / 56.5 - 1.0)
            .collect();
        let snapshot = analyze(&noise);
        assert_eq!(snapshot.len(), SPECTRUM_BINS);
        assert!(snapshot.magnitudes.iter().all(|m| m.is_finite() && *m >= 0.0));
    }

    #[test]
    fn test_average_amplitude_is_snapshot_mean() {
        let analyzer = SpectralAnalyzer::new(CaptureConfig::default());
        let mut processor = analyzer.processor();
        processor.on_samples_available(&[1.0; FFT_SIZE]);

        let expected = FFT_SIZE as f32 / SPECTRUM_BINS as f32;
        assert!((analyzer.average_amplitude() - expected).abs() < 1e-3);
    }

    #[test]
    fn test_snapshot_if_newer_skips_stale_windows() {
        let analyzer = SpectralAnalyzer::new(CaptureConfig::default());
        let mut processor = analyzer.processor();
        assert!(analyzer.snapshot_if_newer(0).is_none());

        processor.on_samples_available(&[0.0; FFT_SIZE]);
        let first = analyzer.snapshot_if_newer(0).unwrap();
        assert_eq!(first.sequence, 1);
        assert!(analyzer.snapshot_if_newer(first.sequence).is_none());
    }

    #[test]
    fn test_missing_device_is_distinct_from_silence() {
        let mut analyzer = SpectralAnalyzer::new(CaptureConfig::default());
        let err = analyzer.start(&mut SyntheticSource::unavailable()).unwrap_err();

        assert!(err.is_device_unavailable());
        assert!(!analyzer.is_running());
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let mut analyzer = SpectralAnalyzer::new(CaptureConfig::default());
        let mut source = SyntheticSource::new();
        let feed = source.feed();

        analyzer.start(&mut source).unwrap();
        assert!(analyzer.is_running());
        assert_eq!(analyzer.source_name(), Some("synthetic"));
        assert!(matches!(
            analyzer.start(&mut source),
            Err(AudioError::AlreadyRunning)
        ));

        let tone = sine_wave(bin_frequency(32.0), 1.0, SAMPLE_RATE, FFT_SIZE);
        assert!(feed.push(&tone));
        assert_eq!(analyzer.snapshot().peak_bin(), 32);

        analyzer.stop().unwrap();
        assert!(!analyzer.is_running());
        assert!(!feed.push(&tone));
        assert_eq!(analyzer.snapshot().sequence, 1);
    }

    #[test]
    fn test_concurrent_reads_never_tear_or_deadlock() {
        let mut analyzer = SpectralAnalyzer::new(CaptureConfig::default());
        let mut source = SyntheticSource::new();
        let feed = source.feed();
        analyzer.start(&mut source).unwrap();

        let writer = thread::spawn(move || {
            let low = sine_wave(bin_frequency(8.0), 1.0, SAMPLE_RATE, FFT_SIZE);
            let high = sine_wave(bin_frequency(300.0), 1.0, SAMPLE_RATE, FFT_SIZE);
            for i in 0..400 {
                feed.push(if i % 2 == 0 { &low } else { &high });
            }
        });

        let mut last_sequence = 0;
        for _ in 0..5000 {
            let snapshot = analyzer.snapshot();
            assert_eq!(snapshot.magnitudes.len(), SPECTRUM_BINS);
            assert!(snapshot.sequence >= last_sequence);
            if snapshot.sequence > 0 {
                // Each published window is one whole tone, never a blend of two.
                let peak = snapshot.peak_bin();
                assert!(peak == 8 || peak == 300, "torn snapshot, peak at {}", peak);
            }
            last_sequence = snapshot.sequence;
        }

        writer.join().unwrap();
        assert_eq!(analyzer.snapshot().sequence, 400);
    }

    #[test]
    fn test_sequence_keeps_rising_across_restart() {
        let mut analyzer = SpectralAnalyzer::new(CaptureConfig::default());
        let mut first = SyntheticSource::new();
        let feed = first.feed();
        analyzer.start(&mut first).unwrap();
        for _ in 0..10 {
            feed.push(&[0.0; FFT_SIZE]);
        }
        analyzer.stop().unwrap();
        assert_eq!(analyzer.snapshot().sequence, 10);

        let mut second = SyntheticSource::new();
        let feed = second.feed();
        analyzer.start(&mut second).unwrap();
        feed.push(&[1.0; FFT_SIZE]);

        let snapshot = analyzer.snapshot_if_newer(10).unwrap();
        assert_eq!(snapshot.sequence, 11);
        assert!((snapshot.magnitudes[0] - FFT_SIZE as f32).abs() < 1e-2);
    }

    #[test]
    fn test_reader_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SnapshotReader>();

        let analyzer = SpectralAnalyzer::new(CaptureConfig::default());
        let mut processor = analyzer.processor();
        let reader = analyzer.reader();

        let watcher = thread::spawn(move || {
            let mut last = 0;
            while last < 50 {
                if let Some(snapshot) = reader.snapshot_if_newer(last) {
                    assert_eq!(snapshot.len(), SPECTRUM_BINS);
                    last = snapshot.sequence;
                }
                thread::yield_now();
            }
            reader.average_amplitude()
        });

        for _ in 0..50 {
            processor.on_samples_available(&[0.5; FFT_SIZE]);
        }
        let average = watcher.join().unwrap();
        assert!((average - 0.5 * FFT_SIZE as f32 / SPECTRUM_BINS as f32).abs() < 1e-3);
    }
}
