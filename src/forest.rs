//! The forest composer: grafts cached instances at placement points and
//! recursively through their exit points, accumulating per-variant world
//! transforms into a cache shaped like the instance cache it draws from.

use bevy::math::Mat4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::diagnostics::Diagnostics;
use crate::instance::NestedGrid;
use crate::tree_type::TreeType;

/// Where a tree should be planted: which tree type, and the root transform
/// handed to the first `graft` call (`id = 0, age = 0`).
#[derive(Clone, Copy, Debug)]
pub struct TreePlacement {
    pub type_index: usize,
    pub world_transform: Mat4,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ForestConfig {
    pub seed: Option<u64>,
}

/// `(type_index, id, age, variant)`: one dirty batch touched by a graft.
pub type CacheIndex = (usize, usize, usize, usize);

/// Owns every tree type it composes with, the per-type transform cache
/// (mirroring each type's instance cache in shape), and the RNG used to
/// pick a variant at every graft site.
pub struct Forest {
    pub tree_types: Vec<TreeType>,
    /// `transform_cache[type_index]` mirrors `tree_types[type_index].cache`:
    /// same `(id, age, variant)` shape, each slot a growable batch of world
    /// transforms grafted using that variant.
    transform_cache: Vec<NestedGrid<Vec<Mat4>>>,
    /// Every `(type, id, age, variant)` batch appended to since the last
    /// drain, so a renderer can rebuild only the dirty instanced-draw
    /// batches instead of the whole transform cache.
    delta_log: Vec<CacheIndex>,
    pub diagnostics: Diagnostics,
    rng: StdRng,
}

impl Forest {
    pub fn new(tree_types: Vec<TreeType>, cfg: ForestConfig) -> Self {
        let transform_cache = tree_types
            .iter()
            .map(|t| {
                let mut grid: NestedGrid<Vec<Mat4>> = NestedGrid::new();
                grid.resize_like(&t.cache);
                grid
            })
            .collect();
        let seed = cfg.seed.unwrap_or_else(wall_clock_seed);
        Self {
            tree_types,
            transform_cache,
            delta_log: Vec::new(),
            diagnostics: Diagnostics::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Clear every transform cache and delta log entry, then graft
    /// `placements` from scratch. A new compose supersedes and fully
    /// replaces the previous transform cache — used for scatter-mode
    /// rebuilds, where every placement is regenerated at once.
    pub fn compose(&mut self, placements: &[TreePlacement]) {
        for grid in &mut self.transform_cache {
            grid.for_each_mut(|_, _, _, batch: &mut Vec<Mat4>| batch.clear());
        }
        self.delta_log.clear();

        for placement in placements {
            if placement.type_index >= self.tree_types.len() {
                self.diagnostics.out_of_range_lookups += 1;
                continue;
            }
            self.graft(placement.type_index, placement.world_transform, 0, 0, 0);
        }

        self.diagnostics.log_summary("forest compose");
        bevy::log::info!(
            "forest composed: {} placements, {} total transforms",
            placements.len(),
            self.total_transform_count()
        );
    }

    /// Graft a single placement onto the *existing* transform cache without
    /// clearing it, appending any newly dirtied `(type, id, age, variant)`
    /// batches to the delta log. This is the incremental path a paint
    /// stroke drives: each accepted brush point calls this once, and
    /// strokes never interleave since `PaintSession` only ever offers one
    /// point at a time from a single caller.
    pub fn graft_paint(&mut self, placement: TreePlacement) {
        if placement.type_index >= self.tree_types.len() {
            self.diagnostics.out_of_range_lookups += 1;
            return;
        }
        self.graft(placement.type_index, placement.world_transform, 0, 0, 0);
    }

    /// Drain and return every `(type, id, age, variant)` batch touched
    /// since the last drain. Renderers call this after each append batch
    /// (one scatter compose, or one paint point) to know which instanced
    /// draw batches to rebuild.
    pub fn drain_delta_log(&mut self) -> Vec<CacheIndex> {
        std::mem::take(&mut self.delta_log)
    }

    /// Recursively graft a cached sub-tree of `type_index` at `(id, age)`
    /// into world transform `world`, then recurse through its exit points.
    fn graft(&mut self, type_index: usize, world: Mat4, id: usize, age: usize, depth: usize) {
        let max_depth = self.max_recursion_depth(type_index);
        if depth > max_depth {
            bevy::log::warn!(
                "forest graft exceeded depth backstop ({max_depth}) for tree type {type_index}, id {id} age {age}; stopping this branch"
            );
            return;
        }

        let variant_count = self.tree_types[type_index].cache.variants(id, age).len();
        if variant_count == 0 {
            self.diagnostics.empty_cache_grafts += 1;
            return;
        }

        let v = self.rng.gen_range(0..variant_count);
        let instance = self.tree_types[type_index].cache.variants(id, age)[v].clone();
        let world_prime = world * instance.local_transform.inverse();

        if let Some(batch) = self.transform_cache[type_index].variants_mut(id, age) {
            if let Some(slot) = batch.get_mut(v) {
                slot.push(world_prime);
                self.delta_log.push((type_index, id, age, v));
            }
        }

        for exit in &instance.exit_points {
            let next_world = world_prime * exit.exit_transform;
            self.graft(type_index, next_world, exit.exit.id, exit.exit.age, depth + 1);
        }
    }

    fn max_recursion_depth(&self, type_index: usize) -> usize {
        let t = &self.tree_types[type_index];
        t.grammar.config.generation * t.grammar.branch_catalog.len().max(1) + 1
    }

    pub fn total_transform_count(&self) -> usize {
        self.transform_cache
            .iter()
            .map(|grid| {
                let mut total = 0usize;
                let mut count = 0usize;
                grid_for_each_count(grid, &mut total, &mut count);
                total
            })
            .sum()
    }

    pub fn transform_cache_for(&self, type_index: usize) -> Option<&NestedGrid<Vec<Mat4>>> {
        self.transform_cache.get(type_index)
    }
}

fn grid_for_each_count(grid: &NestedGrid<Vec<Mat4>>, total: &mut usize, _count: &mut usize) {
    for id in 0..grid.id_count() {
        for age in 0..grid.age_count() {
            for batch in grid.variants(id, age) {
                *total += batch.len();
            }
        }
    }
}

fn wall_clock_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics as Diag;
    use crate::grammar::{compile, GrammarConfig};
    use crate::tree_type::FillConfig;

    fn one_filled_type(name: &str, seed: u64, instancing_prob: f32) -> TreeType {
        let mut diag = Diag::default();
        let grammar = compile(
            name,
            "A",
            &["A=F[+A][-A]:1.0"],
            GrammarConfig { generation: 2, seed: Some(seed), instancing_prob, ..Default::default() },
            &mut diag,
        );
        let mut t = TreeType::new(grammar);
        t.fill(FillConfig { hero_trees: 2, max_variants: 10 });
        t
    }

    #[test]
    fn compose_with_no_placements_is_empty() {
        let t = one_filled_type("solo", 1, 0.6);
        let mut forest = Forest::new(vec![t], ForestConfig { seed: Some(1) });
        forest.compose(&[]);
        assert_eq!(forest.total_transform_count(), 0);
    }

    #[test]
    fn out_of_range_type_index_is_logged_not_fatal() {
        let t = one_filled_type("solo", 1, 0.6);
        let mut forest = Forest::new(vec![t], ForestConfig { seed: Some(1) });
        forest.compose(&[TreePlacement { type_index: 5, world_transform: Mat4::IDENTITY }]);
        assert_eq!(forest.diagnostics.out_of_range_lookups, 1);
        assert_eq!(forest.total_transform_count(), 0);
    }

    #[test]
    fn single_placement_grafts_at_least_the_root() {
        let t = one_filled_type("single", 7, 1.0);
        let root_variants = t.cache.variants(0, 0).len();
        let mut forest = Forest::new(vec![t], ForestConfig { seed: Some(2) });
        if root_variants == 0 {
            return;
        }
        forest.compose(&[TreePlacement { type_index: 0, world_transform: Mat4::IDENTITY }]);
        assert!(forest.total_transform_count() >= 1);
    }

    #[test]
    fn recompose_clears_previous_batches() {
        let t = one_filled_type("again", 7, 1.0);
        let root_has_variants = !t.cache.variants(0, 0).is_empty();
        let mut forest = Forest::new(vec![t], ForestConfig { seed: Some(3) });
        if !root_has_variants {
            return;
        }
        forest.compose(&[TreePlacement { type_index: 0, world_transform: Mat4::IDENTITY }]);
        let first = forest.total_transform_count();
        forest.compose(&[]);
        assert_eq!(forest.total_transform_count(), 0);
        assert!(first >= 1);
    }

    #[test]
    fn compose_records_a_delta_entry_per_graft() {
        let t = one_filled_type("delta-compose", 7, 1.0);
        let root_has_variants = !t.cache.variants(0, 0).is_empty();
        let mut forest = Forest::new(vec![t], ForestConfig { seed: Some(4) });
        if !root_has_variants {
            return;
        }
        forest.compose(&[TreePlacement { type_index: 0, world_transform: Mat4::IDENTITY }]);
        let delta = forest.drain_delta_log();
        assert_eq!(delta.len(), forest.total_transform_count());
        assert!(!delta.is_empty());
        // draining again before the next compose/paint yields nothing new
        assert!(forest.drain_delta_log().is_empty());
    }

    #[test]
    fn paint_grafts_append_without_clearing_existing_batches() {
        let t = one_filled_type("delta-paint", 7, 1.0);
        let root_has_variants = !t.cache.variants(0, 0).is_empty();
        let mut forest = Forest::new(vec![t], ForestConfig { seed: Some(5) });
        if !root_has_variants {
            return;
        }
        forest.compose(&[TreePlacement { type_index: 0, world_transform: Mat4::IDENTITY }]);
        let after_compose = forest.total_transform_count();
        forest.drain_delta_log();

        forest.graft_paint(TreePlacement { type_index: 0, world_transform: Mat4::IDENTITY });
        assert!(forest.total_transform_count() > after_compose);

        let delta = forest.drain_delta_log();
        assert!(!delta.is_empty(), "painting a point should dirty at least one batch");
        assert!(forest.drain_delta_log().is_empty());
    }

    #[test]
    fn paint_grafts_to_out_of_range_type_are_logged_not_fatal() {
        let t = one_filled_type("delta-oob", 7, 1.0);
        let mut forest = Forest::new(vec![t], ForestConfig { seed: Some(6) });
        forest.graft_paint(TreePlacement { type_index: 9, world_transform: Mat4::IDENTITY });
        assert_eq!(forest.diagnostics.out_of_range_lookups, 1);
        assert!(forest.drain_delta_log().is_empty());
    }
}
