use log::info;

use super::FFT_SIZE;

/// Controls bass-to-treble spacing of the visual bands.
pub const BAND_CURVE_EXPONENT: f32 = 2.2;

/// Inclusive bin range covered by one visual band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandRange {
    pub low: usize,
    pub high: usize,
}

impl BandRange {
    pub fn bin_count(&self) -> usize {
        if self.high >= self.low {
            self.high - self.low + 1
        } else {
            1
        }
    }
}

/// Splits `total_bins` into `band_count` ranges along a power-law curve.
///
/// Low bands get narrow ranges and high bands wide ones, so bass is not drowned out by
/// the many high-frequency bins. Neighbouring ranges share their boundary bin.
pub fn compute_band_ranges(band_count: usize, total_bins: usize) -> Vec<BandRange> {
    if band_count == 0 || total_bins == 0 {
        return Vec::new();
    }

    let last_bin = total_bins - 1;
    let curve = |i: usize| (i as f32 / band_count as f32).powf(BAND_CURVE_EXPONENT);

    (0..band_count)
        .map(|i| {
            let start = curve(i) * total_bins as f32;
            let end = curve(i + 1) * total_bins as f32;
            BandRange {
                low: (start as usize).min(last_bin),
                high: (end as usize).min(last_bin),
            }
        })
        .collect()
}

/// Mean magnitude of each band. A range with `high < low` reads the single bin at `low`.
pub fn aggregate(spectrum: &[f32], ranges: &[BandRange]) -> Vec<f32> {
    let mut out = vec![0.0; ranges.len()];
    aggregate_into(spectrum, ranges, &mut out);
    out
}

pub fn aggregate_into(spectrum: &[f32], ranges: &[BandRange], out: &mut [f32]) {
    for (value, range) in out.iter_mut().zip(ranges) {
        *value = if range.high >= range.low {
            let bins = &spectrum[range.low..=range.high];
            bins.iter().sum::<f32>() / bins.len() as f32
        } else {
            spectrum[range.low]
        };
    }
}

/// Precomputed band layout plus the buffer its aggregates are written into.
pub struct BandMapper {
    ranges: Vec<BandRange>,
    values: Vec<f32>,
}

impl BandMapper {
    pub fn new(band_count: usize, total_bins: usize) -> Self {
        let ranges = compute_band_ranges(band_count, total_bins);
        info!(
            "Band mapper: {} bands over {} bins (curve exponent {})",
            ranges.len(),
            total_bins,
            BAND_CURVE_EXPONENT
        );
        Self {
            values: vec![0.0; ranges.len()],
            ranges,
        }
    }

    pub fn ranges(&self) -> &[BandRange] {
        &self.ranges
    }

    pub fn band_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn map(&mut self, spectrum: &[f32]) -> &[f32] {
        aggregate_into(spectrum, &self.ranges, &mut self.values);
        &self.values
    }

    /// Values from the last call to [`map`](Self::map).
    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Coarse bass/mid/treble energy used by the blob visual.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyBands {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

impl EnergyBands {
    /// Averages fixed fractions of the transform window `W`: bass over bins
    /// `[0, W/32)`, mid over `[W/32, W/8)`, treble over `[W/8, W/2)`.
    pub fn from_spectrum(spectrum: &[f32]) -> Self {
        let bass_end = FFT_SIZE / 32;
        let mid_end = FFT_SIZE / 8;
        let treble_end = FFT_SIZE / 2;

        Self {
            bass: Self::average_range(spectrum, 0, bass_end),
            mid: Self::average_range(spectrum, bass_end, mid_end),
            treble: Self::average_range(spectrum, mid_end, treble_end),
        }
    }

    fn average_range(data: &[f32], start: usize, end: usize) -> f32 {
        let end = end.min(data.len());
        if start >= end {
            return 0.0;
        }

        let sum: f32 = data[start..end].iter().sum();
        sum / (end - start) as f32
    }
}
