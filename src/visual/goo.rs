use glam::Vec2;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::MAX_BLOBS;
use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GooConfig {
    pub initial_count: usize,
    pub max_count: usize,
    /// Bass energy above which droplets spawn.
    pub bass_threshold: f32,
    /// Minimum seconds between two spawns.
    pub spawn_cooldown: f32,
    pub radius: f32,
    /// Bass-scaled positional jitter applied every frame.
    pub wobble: f32,
}

impl Default for GooConfig {
    fn default() -> Self {
        Self {
            initial_count: 32,
            max_count: MAX_BLOBS,
            bass_threshold: 0.2,
            spawn_cooldown: 0.1,
            radius: 0.015,
            wobble: 0.002,
        }
    }
}

impl GooConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_count > MAX_BLOBS {
            return Err(ConfigError::invalid(
                "goo.max_count",
                format!("cannot exceed {}", MAX_BLOBS),
            ));
        }
        if self.initial_count > self.max_count {
            return Err(ConfigError::invalid(
                "goo.initial_count",
                "cannot exceed goo.max_count",
            ));
        }
        if self.spawn_cooldown.is_nan() || self.spawn_cooldown < 0.0 {
            return Err(ConfigError::invalid("goo.spawn_cooldown", "must be >= 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GooBlob {
    /// Normalized screen position in `[0, 1)`.
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
}

/// Wraps into `[0, 1)`.
fn wrap_unit(v: f32) -> f32 {
    let wrapped = v.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs.
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

fn wrap_position(p: Vec2) -> Vec2 {
    Vec2::new(wrap_unit(p.x), wrap_unit(p.y))
}

/// Drifting blobs on a unit torus that multiply while the bass is loud.
///
/// The population only ever grows, up to `max_count`.
pub struct GooField {
    config: GooConfig,
    blobs: Vec<GooBlob>,
    cooldown: f32,
    rng: StdRng,
}

impl GooField {
    pub fn new(config: GooConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic field for reproducible runs.
    pub fn with_seed(config: GooConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GooConfig, mut rng: StdRng) -> Self {
        let blobs = (0..config.initial_count.min(config.max_count))
            .map(|_| {
                let position = Vec2::new(rng.gen::<f32>(), rng.gen::<f32>());
                let angle = rng.gen::<f32>() * std::f32::consts::TAU;
                let speed = 0.02 + rng.gen::<f32>() * 0.05;
                GooBlob {
                    position: wrap_position(position),
                    velocity: Vec2::from_angle(angle) * speed,
                    radius: config.radius,
                }
            })
            .collect();

        Self {
            config,
            blobs,
            cooldown: 0.0,
            rng,
        }
    }

    /// Advances one frame. Returns true if a droplet spawned.
    pub fn update(&mut self, dt: f32, bass: f32, time: f32) -> bool {
        self.cooldown -= dt;
        let spawned = self.try_spawn(bass);

        let wobble = self.config.wobble * bass;
        for blob in &mut self.blobs {
            blob.position = wrap_position(blob.position + blob.velocity * dt);
            let jitter = Vec2::new(
                ((time + blob.position.y) * 10.0).sin(),
                ((time + blob.position.x) * 10.0).cos(),
            );
            blob.position = wrap_position(blob.position + jitter * wobble);
        }

        spawned
    }

    fn try_spawn(&mut self, bass: f32) -> bool {
        if bass <= self.config.bass_threshold
            || self.cooldown > 0.0
            || self.blobs.len() >= self.config.max_count
        {
            return false;
        }

        let origin = self
            .blobs
            .first()
            .map(|b| b.position)
            .unwrap_or(Vec2::splat(0.5));
        let angle = self.rng.gen::<f32>() * std::f32::consts::TAU;
        let speed = (0.3 + bass * 1.5) * 0.01;

        self.blobs.push(GooBlob {
            position: origin,
            velocity: Vec2::from_angle(angle) * speed,
            radius: self.config.radius,
        });
        self.cooldown = self.config.spawn_cooldown;

        debug!("Spawned droplet, {} blobs", self.blobs.len());
        true
    }

    pub fn blobs(&self) -> &[GooBlob] {
        &self.blobs
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}
