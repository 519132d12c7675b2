//! Pure, replayable terrain height function shared by terrain sampling and
//! forest placement. Both must evaluate exactly the same function or
//! scattered trees drift off the surface they were supposedly grown on.

use bevy::prelude::*;
use noise::{NoiseFn, Perlin};

/// Tunable parameters for the layered coherent-noise height function.
#[derive(Resource, Clone, Debug)]
pub struct HeightFieldConfig {
    pub seed: u32,
    pub octaves: u8,
    pub frequency: f64,
    pub persistence: f64,
    pub lacunarity: f64,
    pub amplitude: f32,
}

impl Default for HeightFieldConfig {
    fn default() -> Self {
        Self {
            seed: 1337,
            octaves: 4,
            frequency: 0.02,
            persistence: 0.5,
            lacunarity: 2.0,
            amplitude: 8.0,
        }
    }
}

/// A constructed sampler wrapping a seeded Perlin generator plus its config.
/// Construct once per forest/terrain pair and reuse; cheap to clone.
#[derive(Clone)]
pub struct HeightField {
    cfg: HeightFieldConfig,
    perlin: Perlin,
}

impl HeightField {
    pub fn new(cfg: HeightFieldConfig) -> Self {
        let perlin = Perlin::new(cfg.seed);
        Self { cfg, perlin }
    }

    pub fn config(&self) -> &HeightFieldConfig {
        &self.cfg
    }

    /// `y = amplitude * fbm(x, z)`. Pure given `cfg`; safe to call from any
    /// thread since `Perlin` holds no interior mutability.
    pub fn height(&self, x: f32, z: f32) -> f32 {
        sample_fbm(&self.perlin, &self.cfg, x, z)
    }

    pub fn normal(&self, x: f32, z: f32) -> Vec3 {
        let d = (1.0 / self.cfg.frequency.max(1e-6) as f32 * 0.01).clamp(0.05, 2.0);
        let h_l = self.height(x - d, z);
        let h_r = self.height(x + d, z);
        let h_d = self.height(x, z - d);
        let h_u = self.height(x, z + d);
        Vec3::new(h_l - h_r, 2.0 * d, h_d - h_u).normalize_or_zero()
    }
}

/// Standalone pure function form, for callers that only want a one-off
/// sample (e.g. tests) without constructing a [`HeightField`].
pub fn height_at(cfg: &HeightFieldConfig, x: f32, z: f32) -> f32 {
    let perlin = Perlin::new(cfg.seed);
    sample_fbm(&perlin, cfg, x, z)
}

fn sample_fbm(perlin: &Perlin, cfg: &HeightFieldConfig, x: f32, z: f32) -> f32 {
    let mut freq = cfg.frequency;
    let mut amp = 1.0_f64;
    let mut sum = 0.0_f64;
    let mut norm = 0.0_f64;
    for _ in 0..cfg.octaves.max(1) {
        let nx = x as f64 * freq;
        let nz = z as f64 * freq;
        sum += perlin.get([nx, nz]) * amp;
        norm += amp;
        freq *= cfg.lacunarity;
        amp *= cfg.persistence;
    }
    if norm > 0.0 {
        sum /= norm;
    }
    (sum as f32) * cfg.amplitude
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_and_replayable() {
        let cfg = HeightFieldConfig::default();
        let a = height_at(&cfg, 12.5, -3.25);
        let b = height_at(&cfg, 12.5, -3.25);
        assert_eq!(a, b);
    }

    #[test]
    fn sampler_agrees_with_standalone_fn() {
        let cfg = HeightFieldConfig::default();
        let field = HeightField::new(cfg.clone());
        assert_eq!(field.height(4.0, 9.0), height_at(&cfg, 4.0, 9.0));
    }

    #[test]
    fn different_seeds_usually_differ() {
        let mut a = HeightFieldConfig::default();
        let mut b = a.clone();
        a.seed = 1;
        b.seed = 2;
        assert_ne!(height_at(&a, 5.0, 5.0), height_at(&b, 5.0, 5.0));
    }

    #[test]
    fn zero_amplitude_is_flat() {
        let mut cfg = HeightFieldConfig::default();
        cfg.amplitude = 0.0;
        assert_eq!(height_at(&cfg, 100.0, -200.0), 0.0);
    }
}
