//! Headless demo: compiles a bundled grammar, fills its instance cache from
//! a handful of hero trees, scatters placements over a procedural height
//! field, and composes the forest — logging summary counts at each stage.
//!
//! Rendering, windowing and input are out of scope for this crate; wiring
//! the result into a renderer is left to whatever application embeds it.

use bevy::app::App;
use bevy::log::LogPlugin;

use forest_generator::prelude::*;

fn main() {
    let mut app = App::new();
    LogPlugin::default().build(&mut app);

    run_demo();
}

fn run_demo() {
    let mut diagnostics = Diagnostics::default();

    let source = fir();
    // The bundled fir grammar targets production-quality density
    // (generation 20); a headless demo trades that for a quick run.
    let demo_config = GrammarConfig { generation: 5, seed: Some(2024), ..source.config };
    let grammar = compile(source.name, source.axiom, source.rules, demo_config, &mut diagnostics);

    let mut tree_type = TreeType::new(grammar);
    tree_type.fill(FillConfig { hero_trees: 6, max_variants: 12 });
    bevy::log::info!(
        "compiled '{}': {} hero vertices, {} branch ids",
        tree_type.name,
        tree_type.geometry.vertices.len(),
        tree_type.grammar.branch_catalog.len()
    );

    let height_field = HeightField::new(HeightFieldConfig::default());
    let placements = scatter(
        0,
        &ScatterConfig { width: 80.0, count: 40, seed: Some(99), ..Default::default() },
        &height_field,
    );

    let mut forest = Forest::new(vec![tree_type], ForestConfig { seed: Some(7) });
    forest.compose(&placements);

    bevy::log::info!(
        "forest demo complete: {} placements requested, {} total grafted transforms",
        placements.len(),
        forest.total_transform_count()
    );
}
