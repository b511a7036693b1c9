use criterion::{black_box, criterion_group, criterion_main, Criterion};

use spectra_visualizer::audio::bands::compute_band_ranges;
use spectra_visualizer::audio::{
    BandMapper, CaptureConfig, SmoothingConfig, SpectralAnalyzer, TemporalSmoother, FFT_SIZE,
    SPECTRUM_BINS,
};

fn synthetic_spectrum() -> Vec<f32> {
    (0..SPECTRUM_BINS)
        .map(|i| 1.0 + ((i * 37) % 101) as f32 / 10.0)
        .collect()
}

fn bench_band_layout(c: &mut Criterion) {
    c.bench_function("compute_band_ranges 200x512", |b| {
        b.iter(|| compute_band_ranges(black_box(200), black_box(SPECTRUM_BINS)))
    });
}

fn bench_frame(c: &mut Criterion) {
    let spectrum = synthetic_spectrum();
    let mut mapper = BandMapper::new(200, SPECTRUM_BINS);
    let mut smoother = TemporalSmoother::new(200, SmoothingConfig::default());

    c.bench_function("map + smooth 200 bands", |b| {
        b.iter(|| {
            let raw = mapper.map(black_box(&spectrum));
            smoother.advance(raw, black_box(1.0 / 60.0))[0]
        })
    });
}

fn bench_capture(c: &mut Criterion) {
    let analyzer = SpectralAnalyzer::new(CaptureConfig::default());
    let mut processor = analyzer.processor();
    let buffer: Vec<f32> = (0..256).map(|n| (n as f32 * 0.05).sin()).collect();

    c.bench_function("capture 1024 samples (one transform)", |b| {
        b.iter(|| {
            for _ in 0..FFT_SIZE / buffer.len() {
                processor.on_samples_available(black_box(&buffer));
            }
        })
    });
}

criterion_group!(benches, bench_band_layout, bench_frame, bench_capture);
criterion_main!(benches);
