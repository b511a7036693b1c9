use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Tuning for [`TemporalSmoother`]. The defaults are the hand-tuned values the
/// visuals were designed around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Time constant of the output filter, in seconds.
    pub tau: f32,
    /// Per-frame retention of the long-term band average.
    pub avg_alpha: f32,
    /// Below 1 squashes spikes harder than small ratios.
    pub compression_exponent: f32,
    pub global_gain: f32,
    pub epsilon: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            tau: 0.05,
            avg_alpha: 0.995,
            compression_exponent: 0.3,
            global_gain: 0.05,
            epsilon: 1e-6,
        }
    }
}

impl SmoothingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tau.is_nan() || self.tau <= 0.0 {
            return Err(ConfigError::invalid("smoothing.tau", "must be > 0"));
        }
        if !(0.0..1.0).contains(&self.avg_alpha) {
            return Err(ConfigError::invalid("smoothing.avg_alpha", "must be in [0, 1)"));
        }
        if self.compression_exponent.is_nan() || self.compression_exponent <= 0.0 {
            return Err(ConfigError::invalid(
                "smoothing.compression_exponent",
                "must be > 0",
            ));
        }
        if self.global_gain.is_nan() || self.global_gain < 0.0 {
            return Err(ConfigError::invalid("smoothing.global_gain", "must be >= 0"));
        }
        if self.epsilon.is_nan() || self.epsilon <= 0.0 {
            return Err(ConfigError::invalid("smoothing.epsilon", "must be > 0"));
        }
        Ok(())
    }
}

/// Filter coefficient for a frame of length `dt`. Gives the same response per second
/// whatever the frame rate.
pub fn smoothing_alpha(dt: f32, tau: f32) -> f32 {
    (-dt / tau).exp()
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandState {
    pub raw: f32,
    pub running_average: f32,
    pub smoothed: f32,
}

impl BandState {
    fn advance(&mut self, raw: f32, alpha: f32, config: &SmoothingConfig) {
        self.raw = raw;
        self.running_average =
            config.avg_alpha * self.running_average + (1.0 - config.avg_alpha) * raw;

        let equalized = raw / (self.running_average + config.epsilon);
        let equalized = equalized.powf(config.compression_exponent) * config.global_gain;

        self.smoothed = alpha * self.smoothed + (1.0 - alpha) * equalized;
    }
}

/// Turns noisy per-band energy into stable bar heights.
///
/// Each band is equalized against its own long-term average, compressed, scaled and then
/// low-passed. Call [`advance`](Self::advance) exactly once per rendered frame.
pub struct TemporalSmoother {
    config: SmoothingConfig,
    bands: Vec<BandState>,
    output: Vec<f32>,
}

impl TemporalSmoother {
    pub fn new(band_count: usize, config: SmoothingConfig) -> Self {
        Self {
            config,
            bands: vec![BandState::default(); band_count],
            output: vec![0.0; band_count],
        }
    }

    pub fn advance(&mut self, raw: &[f32], dt: f32) -> &[f32] {
        debug_assert_eq!(raw.len(), self.bands.len());
        let alpha = smoothing_alpha(dt.max(0.0), self.config.tau);

        for ((state, out), &value) in self.bands.iter_mut().zip(&mut self.output).zip(raw) {
            state.advance(value, alpha, &self.config);
            *out = state.smoothed;
        }
        &self.output
    }

    pub fn smoothed(&self) -> &[f32] {
        &self.output
    }

    pub fn bands(&self) -> &[BandState] {
        &self.bands
    }

    pub fn config(&self) -> &SmoothingConfig {
        &self.config
    }

    /// Swaps tuning without discarding band history.
    pub fn set_config(&mut self, config: SmoothingConfig) {
        self.config = config;
    }

    pub fn reset(&mut self) {
        self.bands.iter_mut().for_each(|b| *b = BandState::default());
        self.output.iter_mut().for_each(|v| *v = 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(smoother: &mut TemporalSmoother, raw: &[f32], dt: f32, seconds: f32) {
        let frames = (seconds / dt).round() as usize;
        for _ in 0..frames {
            smoother.advance(raw, dt);
        }
    }

    #[test]
    fn test_starts_at_zero() {
        let smoother = TemporalSmoother::new(4, SmoothingConfig::default());
        assert!(smoother.bands().iter().all(|b| *b == BandState::default()));
        assert_eq!(smoother.smoothed(), &[0.0; 4]);
    }

    #[test]
    fn test_silence_decays_to_zero() {
        let mut smoother = TemporalSmoother::new(3, SmoothingConfig::default());
        run(&mut smoother, &[5.0, 0.5, 50.0], 1.0 / 60.0, 2.0);
        assert!(smoother.smoothed().iter().all(|&v| v > 0.0));

        run(&mut smoother, &[0.0; 3], 1.0 / 60.0, 3.0);
        assert!(smoother.smoothed().iter().all(|&v| v.abs() < 1e-6));
        assert!(smoother.smoothed().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_silence_from_start_stays_zero() {
        let mut smoother = TemporalSmoother::new(8, SmoothingConfig::default());
        run(&mut smoother, &[0.0; 8], 1.0 / 144.0, 1.0);
        assert_eq!(smoother.smoothed(), &[0.0; 8]);
    }

    #[test]
    fn test_plateau_is_frame_rate_independent() {
        let raw = [0.8, 12.0, 300.0];
        let mut slow = TemporalSmoother::new(3, SmoothingConfig::default());
        let mut fast = TemporalSmoother::new(3, SmoothingConfig::default());

        run(&mut slow, &raw, 1.0 / 30.0, 120.0);
        run(&mut fast, &raw, 1.0 / 240.0, 120.0);

        for (a, b) in slow.smoothed().iter().zip(fast.smoothed()) {
            // Equalized ratio tends to 1, so the plateau is the global gain.
            assert!((a - 0.05).abs() < 1e-4);
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_step_response_depends_on_time_not_frames() {
        // Hold the equalized value constant to isolate the output filter.
        let config = SmoothingConfig {
            avg_alpha: 0.0,
            ..SmoothingConfig::default()
        };
        let tau = config.tau;
        let mut slow = TemporalSmoother::new(1, config.clone());
        let mut fast = TemporalSmoother::new(1, config);

        run(&mut slow, &[1.0], 0.01, tau);
        run(&mut fast, &[1.0], 0.001, tau);

        let expected = 0.05 * (1.0 - (-1.0f32).exp());
        assert!((slow.smoothed()[0] - expected).abs() < 1e-4);
        assert!((fast.smoothed()[0] - expected).abs() < 1e-4);
    }

    #[test]
    fn test_spike_is_compressed() {
        let mut smoother = TemporalSmoother::new(1, SmoothingConfig::default());
        run(&mut smoother, &[1.0], 1.0 / 60.0, 30.0);
        let settled = smoother.bands()[0];

        smoother.advance(&[100.0], 1.0 / 60.0);
        let state = smoother.bands()[0];
        assert_eq!(state.raw, 100.0);
        // Average moves by (1 - avg_alpha) of the jump.
        assert!((state.running_average - (settled.running_average * 0.995 + 0.5)).abs() < 1e-3);
        // A ~67x ratio becomes ~3.5x after compression.
        let equalized = (100.0 / (state.running_average + 1e-6)).powf(0.3) * 0.05;
        assert!(equalized < 0.05 * 4.0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut smoother = TemporalSmoother::new(2, SmoothingConfig::default());
        run(&mut smoother, &[1.0, 2.0], 1.0 / 60.0, 1.0);
        smoother.reset();
        assert!(smoother.bands().iter().all(|b| *b == BandState::default()));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SmoothingConfig::default().validate().is_ok());

        let bad_tau = SmoothingConfig {
            tau: 0.0,
            ..SmoothingConfig::default()
        };
        assert!(bad_tau.validate().is_err());

        let bad_alpha = SmoothingConfig {
            avg_alpha: 1.0,
            ..SmoothingConfig::default()
        };
        assert!(bad_alpha.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nan() {
        let nan_tau = SmoothingConfig {
            tau: f32::NAN,
            ..SmoothingConfig::default()
        };
        assert!(nan_tau.validate().is_err());

        let nan_gain = SmoothingConfig {
            global_gain: f32::NAN,
            ..SmoothingConfig::default()
        };
        assert!(nan_gain.validate().is_err());

        let nan_alpha = SmoothingConfig {
            avg_alpha: f32::NAN,
            ..SmoothingConfig::default()
        };
        assert!(nan_alpha.validate().is_err());
    }

    #[test]
    fn test_alpha_formula() {
        assert!((smoothing_alpha(0.05, 0.05) - (-1.0f32).exp()).abs() < 1e-6);
        assert_eq!(smoothing_alpha(0.0, 0.05), 1.0);
    }
}
