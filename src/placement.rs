//! Where trees go: random scatter over a height field, or a user-painted
//! point stream with rejection sampling against a minimum spacing.

use bevy::math::{Mat4, Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::forest::TreePlacement;
use crate::height::HeightField;

#[derive(Clone, Copy, Debug)]
pub struct ScatterConfig {
    pub width: f32,
    pub count: usize,
    pub min_scale: f32,
    pub max_scale: f32,
    pub seed: Option<u64>,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self { width: 100.0, count: 0, min_scale: 2.0, max_scale: 3.0, seed: None }
    }
}

/// Draw `cfg.count` placements of `type_index` uniformly over
/// `[-width/2, width/2]` in x/z, height-field y, random yaw and a uniform
/// `[min_scale, max_scale]` scale baked into the final transform.
pub fn scatter(type_index: usize, cfg: &ScatterConfig, height_field: &HeightField) -> Vec<TreePlacement> {
    let seed = cfg.seed.unwrap_or_else(wall_clock_seed);
    let mut rng = StdRng::seed_from_u64(seed);
    let half = cfg.width * 0.5;

    (0..cfg.count)
        .map(|_| {
            let x: f32 = rng.gen_range(-half..=half);
            let z: f32 = rng.gen_range(-half..=half);
            let y = height_field.height(x, z);
            let yaw_deg: f32 = rng.gen_range(0.0..360.0);
            let scale: f32 = rng.gen_range(cfg.min_scale..=cfg.max_scale);
            TreePlacement { type_index, world_transform: placement_transform(x, y, z, yaw_deg, scale) }
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PaintConfig {
    pub min_spacing: f32,
}

/// Tracks accepted painted points across a brush stroke and beyond, so
/// rejection sampling (`|p - q| >= min_spacing` for every accepted pair)
/// holds across the whole paint session rather than per-stroke.
pub struct PaintSession {
    cfg: PaintConfig,
    accepted: Vec<Vec3>,
    rng: StdRng,
    drawing: bool,
}

impl PaintSession {
    pub fn new(cfg: PaintConfig, seed: Option<u64>) -> Self {
        Self {
            cfg,
            accepted: Vec::new(),
            rng: StdRng::seed_from_u64(seed.unwrap_or_else(wall_clock_seed)),
            drawing: false,
        }
    }

    pub fn begin_stroke(&mut self) {
        self.drawing = true;
    }

    pub fn end_stroke(&mut self) {
        self.drawing = false;
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn clear(&mut self) {
        self.accepted.clear();
        self.drawing = false;
    }

    /// Offer a raycast-onto-terrain world point. Rejects points within
    /// `min_spacing` of any previously accepted point; accepted points get
    /// a random yaw and are returned as a placement.
    pub fn add_point(&mut self, type_index: usize, point: Vec3) -> Option<TreePlacement> {
        let min_spacing = self.cfg.min_spacing;
        if self.accepted.iter().any(|p| p.distance(point) < min_spacing) {
            return None;
        }
        self.accepted.push(point);
        let yaw_deg: f32 = self.rng.gen_range(0.0..360.0);
        Some(TreePlacement {
            type_index,
            world_transform: placement_transform(point.x, point.y, point.z, yaw_deg, 1.0),
        })
    }

    pub fn accepted_points(&self) -> &[Vec3] {
        &self.accepted
    }
}

fn placement_transform(x: f32, y: f32, z: f32, yaw_deg: f32, scale: f32) -> Mat4 {
    Mat4::from_scale_rotation_translation(
        Vec3::splat(scale),
        Quat::from_rotation_y(yaw_deg.to_radians()),
        Vec3::new(x, y, z),
    )
}

fn wall_clock_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::height::{HeightField, HeightFieldConfig};

    #[test]
    fn scatter_zero_count_is_empty() {
        let hf = HeightField::new(HeightFieldConfig::default());
        let placements = scatter(0, &ScatterConfig { count: 0, ..Default::default() }, &hf);
        assert!(placements.is_empty());
    }

    #[test]
    fn scatter_stays_within_bounds_and_on_field() {
        let hf = HeightField::new(HeightFieldConfig::default());
        let cfg = ScatterConfig { width: 40.0, count: 50, seed: Some(9), ..Default::default() };
        let placements = scatter(2, &cfg, &hf);
        assert_eq!(placements.len(), 50);
        for p in &placements {
            assert_eq!(p.type_index, 2);
            let (_, _, translation) = p.world_transform.to_scale_rotation_translation();
            assert!(translation.x.abs() <= 20.0 + 1e-4);
            assert!(translation.z.abs() <= 20.0 + 1e-4);
            assert_eq!(translation.y, hf.height(translation.x, translation.z));
        }
    }

    #[test]
    fn scatter_is_deterministic_for_fixed_seed() {
        let hf = HeightField::new(HeightFieldConfig::default());
        let cfg = ScatterConfig { width: 40.0, count: 10, seed: Some(42), ..Default::default() };
        let a = scatter(0, &cfg, &hf);
        let b = scatter(0, &cfg, &hf);
        for (pa, pb) in a.iter().zip(b.iter()) {
            assert_eq!(pa.world_transform, pb.world_transform);
        }
    }

    #[test]
    fn paint_rejects_points_closer_than_min_spacing() {
        let mut session = PaintSession::new(PaintConfig { min_spacing: 10.0 }, Some(1));
        session.begin_stroke();
        let accepted_1 = session.add_point(0, Vec3::new(0.0, 0.0, 0.0));
        let rejected = session.add_point(0, Vec3::new(5.0, 0.0, 0.0));
        let accepted_2 = session.add_point(0, Vec3::new(11.0, 0.0, 0.0));
        let rejected_2 = session.add_point(0, Vec3::new(11.0, 0.0, 3.0));
        session.end_stroke();

        assert!(accepted_1.is_some());
        assert!(rejected.is_none());
        assert!(accepted_2.is_some());
        assert!(rejected_2.is_none());
        assert_eq!(session.accepted_points().len(), 2);
    }

    #[test]
    fn clear_resets_accepted_points() {
        let mut session = PaintSession::new(PaintConfig { min_spacing: 1.0 }, Some(1));
        session.add_point(0, Vec3::ZERO);
        session.clear();
        assert!(session.accepted_points().is_empty());
        assert!(!session.is_drawing());
    }
}
