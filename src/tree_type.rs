//! A tree type owns a compiled grammar, its frozen hero geometry and the
//! instance cache filled from repeated ("hero tree") interpretations.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::diagnostics::Diagnostics;
use crate::grammar::Grammar;
use crate::instance::{variant_cap, Instance, NestedGrid};
use crate::rewriter::expand_with_rng;
use crate::turtle_interpreter::{interpret, HeroGeometry};
use crate::turtle_tokenizer::tokenize;

/// How many independent hero-tree interpretations to run and concatenate
/// while filling the cache; more hero trees means more variant diversity
/// per `(id, age)`, up to the age-decayed cap.
#[derive(Clone, Copy, Debug)]
pub struct FillConfig {
    pub hero_trees: usize,
    pub max_variants: usize,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self { hero_trees: 8, max_variants: 10 }
    }
}

/// A named tree species: its grammar, hero geometry and frozen instance
/// cache. Immutable once [`TreeType::fill`] has run.
pub struct TreeType {
    pub name: String,
    pub grammar: Grammar,
    pub geometry: HeroGeometry,
    pub cache: NestedGrid<Instance>,
    pub diagnostics: Diagnostics,
    filled: bool,
}

impl TreeType {
    pub fn new(grammar: Grammar) -> Self {
        let name = grammar.name.clone();
        Self {
            name,
            grammar,
            geometry: HeroGeometry::default(),
            cache: NestedGrid::new(),
            diagnostics: Diagnostics::default(),
            filled: false,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    /// Run `fill_cfg.hero_trees` independent rewrite+interpret passes, each
    /// with a distinct RNG stream derived from the grammar's seed, and
    /// concatenate their geometry into this tree type's hero buffers.
    ///
    /// After this call, `geometry` and `cache` are frozen: callers should
    /// not mutate them, mirroring how other frozen-after-build resources in
    /// this codebase are treated (read-only once published).
    pub fn fill(&mut self, fill_cfg: FillConfig) {
        let base_seed = self.grammar.config.seed.unwrap_or(0);
        let branch_count = self.grammar.branch_catalog.len();
        let generation = self.grammar.config.generation;

        self.geometry = HeroGeometry::default();
        self.cache = NestedGrid::new();
        self.cache.resize_shape(branch_count.max(1), generation.max(1));

        for hero_index in 0..fill_cfg.hero_trees.max(1) {
            let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(hero_index as u64 * 0x9E37_79B9));
            let expanded = expand_with_rng(&self.grammar, &mut rng);
            let tokens = tokenize(&expanded, &mut self.diagnostics);
            let out = interpret(
                &tokens,
                &self.grammar.config,
                branch_count,
                generation,
                fill_cfg.max_variants,
                &mut self.diagnostics,
            );
            merge_into(&mut self.geometry, &mut self.cache, out.geometry, out.cache, fill_cfg.max_variants);
        }

        self.filled = true;
        self.diagnostics.log_summary(&format!("tree type '{}' fill", self.name));
        bevy::log::info!(
            "tree type '{}': {} hero trees, {} hero vertices, {} branch ids",
            self.name,
            fill_cfg.hero_trees.max(1),
            self.geometry.vertices.len(),
            branch_count
        );
    }
}

/// Append `from_geometry`/`from_cache` (produced by one hero-tree
/// interpretation) onto the running totals, rebasing every index so the
/// instance ranges keep pointing at the right slice of the combined
/// buffers. Each hero tree's own `interpret` call only caps variants
/// against its own empty-initialized cache, so the cap is re-enforced here
/// against the running total across every hero tree merged so far —
/// otherwise `H` hero trees could each contribute a full cap's worth,
/// overshooting `⌊max_variants / (age+1)⌋` by a factor of `H`.
fn merge_into(
    geometry: &mut HeroGeometry,
    cache: &mut NestedGrid<Instance>,
    from_geometry: HeroGeometry,
    mut from_cache: NestedGrid<Instance>,
    max_variants: usize,
) {
    let vertex_base = geometry.vertices.len() as u32;
    let line_base = geometry.line_indices.len();
    let leaf_base = geometry.leaves.len();
    let polygon_vertex_base = geometry.polygon_vertices.len() as u32;
    let polygon_index_base = geometry.polygon_indices.len();

    geometry.vertices.extend(from_geometry.vertices);
    geometry.rights.extend(from_geometry.rights);
    geometry.thicknesses.extend(from_geometry.thicknesses);
    geometry
        .line_indices
        .extend(from_geometry.line_indices.iter().map(|i| i + vertex_base));
    geometry.leaves.extend(from_geometry.leaves.iter().map(|l| {
        let mut l = *l;
        l.vertex_index += vertex_base;
        l
    }));
    geometry.polygon_vertices.extend(from_geometry.polygon_vertices);
    geometry
        .polygon_indices
        .extend(from_geometry.polygon_indices.iter().map(|i| i + polygon_vertex_base));

    from_cache.for_each_mut(|id, age, _variant, instance| {
        instance.line_range.0 += line_base;
        instance.line_range.1 += line_base;
        instance.leaf_range.0 += leaf_base;
        instance.leaf_range.1 += leaf_base;
        instance.polygon_range.0 += polygon_index_base;
        instance.polygon_range.1 += polygon_index_base;
        let _ = (id, age);
    });

    for id in 0..from_cache.id_count() {
        for age in 0..from_cache.age_count() {
            let cap = variant_cap(max_variants, age);
            for instance in from_cache.variants(id, age) {
                if cache.variants(id, age).len() >= cap {
                    break;
                }
                cache.push(id, age, instance.clone());
            }
        }
    }
}
