//! Walks a tokenized expansion, mutating turtle state and emitting hero
//! geometry, leaf markers, polygon fans and instance-cache records.

use bevy::math::{Mat3, Mat4, Vec3};

use crate::diagnostics::Diagnostics;
use crate::grammar::GrammarConfig;
use crate::instance::{variant_cap, ExitHandle, ExitPoint, Instance, NestedGrid};
use crate::turtle_tokenizer::{IdAge, RotateAxis, ScaleTarget, Token};

#[derive(Clone, Copy, Debug)]
pub struct TurtleState {
    pub position: Vec3,
    pub heading: Vec3,
    pub right: Vec3,
    pub step: f32,
    pub angle: f32,
    pub thickness: f32,
}

impl TurtleState {
    pub fn initial(cfg: &GrammarConfig) -> Self {
        Self {
            position: Vec3::ZERO,
            heading: Vec3::Y,
            right: Vec3::X,
            step: cfg.step,
            angle: cfg.angle,
            thickness: cfg.thickness,
        }
    }

    /// Rigid frame `[right | heading | right×heading | position]`, the
    /// convention used for every instance/exit-point transform.
    fn frame(&self) -> Mat4 {
        let up = self.right.cross(self.heading);
        Mat4::from_cols(
            self.right.extend(0.0),
            self.heading.extend(0.0),
            up.extend(0.0),
            self.position.extend(1.0),
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Leaf {
    pub position: Vec3,
    pub heading: Vec3,
    pub right: Vec3,
    pub vertex_index: u32,
}

/// Per-tree-type hero geometry: written once while filling the instance
/// cache, immutable afterward.
#[derive(Clone, Debug, Default)]
pub struct HeroGeometry {
    pub vertices: Vec<Vec3>,
    pub rights: Vec<Vec3>,
    pub thicknesses: Vec<f32>,
    /// Flat pairs: `line_indices[2k], line_indices[2k+1]` form one segment.
    pub line_indices: Vec<u32>,
    pub leaves: Vec<Leaf>,
    pub polygon_vertices: Vec<Vec3>,
    pub polygon_indices: Vec<u32>,
}

impl HeroGeometry {
    fn push_vertex(&mut self, turtle: &TurtleState) -> u32 {
        let idx = self.vertices.len() as u32;
        self.vertices.push(turtle.position);
        self.rights.push(turtle.right);
        self.thicknesses.push(turtle.thickness);
        idx
    }
}

/// Where an open `@`/`<` instance currently lives: either already pushed
/// into the shared cache (mutated in place as the walk continues), or
/// detached because the age's variant cap was already full.
enum ActiveRef {
    Committed { id: usize, age: usize, variant: usize },
    Detached { index: usize },
}

/// Tells a matching `>` whether its `<` opened a fresh instance (needs
/// closing like `$`) or skipped a non-empty cache entry (no-op).
enum ExitBlockState {
    Opened,
    Skipped,
}

pub struct InterpretOutput {
    pub geometry: HeroGeometry,
    pub cache: NestedGrid<Instance>,
}

/// Interpret `tokens` against a fresh turtle, filling hero geometry and the
/// instance cache. `max_variants` bounds `cache[id][age]` via
/// `⌊max_variants / (age+1)⌋`; `branch_count` sizes the cache's `id` axis.
pub fn interpret(
    tokens: &[Token],
    cfg: &GrammarConfig,
    branch_count: usize,
    generation: usize,
    max_variants: usize,
    diagnostics: &mut Diagnostics,
) -> InterpretOutput {
    let mut geometry = HeroGeometry::default();
    let mut cache: NestedGrid<Instance> = NestedGrid::new();
    cache.resize_shape(branch_count.max(1), generation.max(1));
    let mut detached: Vec<Instance> = Vec::new();

    let mut turtle = TurtleState::initial(cfg);
    // Seed the root vertex at the turtle's initial pose so the first `F`
    // connects an actual index pair instead of emitting an isolated point.
    let root_idx = geometry.push_vertex(&turtle);
    let mut last_vertex: Option<u32> = Some(root_idx);
    let mut bracket_stack: Vec<(TurtleState, Option<u32>, usize)> = Vec::new();
    let mut active_stack: Vec<ActiveRef> = Vec::new();
    let mut exit_block_stack: Vec<ExitBlockState> = Vec::new();
    let mut polygon_stack: Vec<Vec<Vec3>> = Vec::new();

    let mut i = 0usize;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Forward { visible, length } => {
                let len = length.unwrap_or(turtle.step);
                turtle.position += turtle.heading * len;
                let new_idx = geometry.push_vertex(&turtle);
                if *visible {
                    if let Some(prev) = last_vertex {
                        geometry.line_indices.push(prev);
                        geometry.line_indices.push(new_idx);
                    }
                }
                last_vertex = Some(new_idx);
            }
            Token::Rotate { axis, positive, angle } => {
                let deg = angle.unwrap_or(turtle.angle);
                let theta = (if *positive { deg } else { -deg }).to_radians();
                rotate_turtle(&mut turtle, *axis, theta);
            }
            Token::Scale { target, factor } => {
                apply_scale(&mut turtle, *target, *factor, cfg);
            }
            Token::Push => {
                bracket_stack.push((turtle, last_vertex, active_stack.len()));
            }
            Token::Pop => {
                if let Some((saved_turtle, saved_vertex, saved_active_len)) = bracket_stack.pop() {
                    turtle = saved_turtle;
                    last_vertex = saved_vertex;
                    // Any instance opened since this bracket was pushed (and never
                    // closed before the matching `]`) is abandoned here: it stays
                    // wherever it was pushed (cache or detached storage) as a
                    // never-finalized, effectively empty record.
                    active_stack.truncate(saved_active_len.min(active_stack.len()));
                } else {
                    diagnostics.stack_underflows += 1;
                }
            }
            Token::PolygonOpen { marker } => {
                polygon_stack.push(Vec::new());
                if let Some(id_age) = marker {
                    open_instance(
                        *id_age,
                        &turtle,
                        &mut cache,
                        &mut detached,
                        &mut active_stack,
                        &geometry,
                        max_variants,
                    );
                }
            }
            Token::PolygonVertex => {
                if let Some(poly) = polygon_stack.last_mut() {
                    poly.push(turtle.position);
                }
            }
            Token::PolygonClose { marker } => {
                if let Some(poly) = polygon_stack.pop() {
                    triangulate_fan(&poly, &mut geometry, diagnostics);
                }
                if marker.is_some() {
                    close_instance(&mut active_stack, &mut cache, &mut detached, &geometry, diagnostics);
                }
            }
            Token::Leaf => {
                let idx = geometry.push_vertex(&turtle);
                geometry.leaves.push(Leaf {
                    position: turtle.position,
                    heading: turtle.heading,
                    right: turtle.right,
                    vertex_index: idx,
                });
            }
            Token::OpenInstance(id_age) => {
                open_instance(*id_age, &turtle, &mut cache, &mut detached, &mut active_stack, &geometry, max_variants);
            }
            Token::CloseInstance => {
                close_instance(&mut active_stack, &mut cache, &mut detached, &geometry, diagnostics);
            }
            Token::OpenExit(id_age) => {
                let frame = turtle.frame();
                register_exit_points(*id_age, frame, &active_stack, &mut cache, &mut detached);

                let cache_empty = cache.variants(id_age.id, id_age.age).is_empty();
                if cache_empty {
                    open_instance(*id_age, &turtle, &mut cache, &mut detached, &mut active_stack, &geometry, max_variants);
                    exit_block_stack.push(ExitBlockState::Opened);
                } else {
                    exit_block_stack.push(ExitBlockState::Skipped);
                    i = skip_to_matching_close(tokens, i + 1);
                    continue;
                }
            }
            Token::CloseExit => match exit_block_stack.pop() {
                Some(ExitBlockState::Opened) => {
                    close_instance(&mut active_stack, &mut cache, &mut detached, &geometry, diagnostics);
                }
                Some(ExitBlockState::Skipped) => {}
                None => diagnostics.stack_underflows += 1,
            },
        }
        i += 1;
    }

    InterpretOutput { geometry, cache }
}

fn rotate_turtle(turtle: &mut TurtleState, axis: RotateAxis, theta: f32) {
    match axis {
        RotateAxis::Yaw => {
            let k = turtle.right.cross(turtle.heading).normalize_or_zero();
            let rot = Mat3::from_axis_angle(k, theta);
            turtle.heading = (rot * turtle.heading).normalize_or_zero();
            turtle.right = (rot * turtle.right).normalize_or_zero();
        }
        RotateAxis::Pitch => {
            let rot = Mat3::from_axis_angle(turtle.right, theta);
            turtle.heading = (rot * turtle.heading).normalize_or_zero();
        }
        RotateAxis::Roll => {
            let rot = Mat3::from_axis_angle(turtle.heading, theta);
            turtle.right = (rot * turtle.right).normalize_or_zero();
        }
    }
}

fn apply_scale(turtle: &mut TurtleState, target: ScaleTarget, factor: Option<f32>, cfg: &GrammarConfig) {
    match target {
        ScaleTarget::Step => turtle.step *= factor.unwrap_or(cfg.step_scale),
        ScaleTarget::Angle => turtle.angle *= factor.unwrap_or(cfg.angle_scale),
        ScaleTarget::Thickness => turtle.thickness *= factor.unwrap_or(cfg.thickness_scale),
    }
}

/// Zig-zag fan triangulation: `(0,1,n-1)` then alternating
/// `(n-i,i,i+1)`/`(n-i,i+1,n-i-1)` for `i = 1..n/2`.
fn triangulate_fan(poly: &[Vec3], geometry: &mut HeroGeometry, diagnostics: &mut Diagnostics) {
    let n = poly.len();
    if n < 3 {
        if n > 0 {
            diagnostics.degenerate_polygons += 1;
        }
        return;
    }
    let base = geometry.polygon_vertices.len() as u32;
    geometry.polygon_vertices.extend_from_slice(poly);

    let mut push_tri = |a: usize, b: usize, c: usize| {
        geometry.polygon_indices.push(base + a as u32);
        geometry.polygon_indices.push(base + b as u32);
        geometry.polygon_indices.push(base + c as u32);
    };

    push_tri(0, 1, n - 1);
    let mut i = 1;
    while i < 1 + n / 2 {
        push_tri(n - i, i, i + 1);
        push_tri(n - i, i + 1, n - i - 1);
        i += 1;
    }
}

fn open_instance(
    id_age: IdAge,
    turtle: &TurtleState,
    cache: &mut NestedGrid<Instance>,
    detached: &mut Vec<Instance>,
    active_stack: &mut Vec<ActiveRef>,
    geometry: &HeroGeometry,
    max_variants: usize,
) {
    let frame = turtle.frame();
    let instance = Instance::new(
        frame,
        geometry.line_indices.len(),
        geometry.leaves.len(),
        geometry.polygon_indices.len(),
    );
    let cap = variant_cap(max_variants, id_age.age);
    let current = cache.variants(id_age.id, id_age.age).len();
    if current < cap {
        cache.push(id_age.id, id_age.age, instance);
        active_stack.push(ActiveRef::Committed { id: id_age.id, age: id_age.age, variant: current });
    } else {
        let index = detached.len();
        detached.push(instance);
        active_stack.push(ActiveRef::Detached { index });
    }
}

fn close_instance(
    active_stack: &mut Vec<ActiveRef>,
    cache: &mut NestedGrid<Instance>,
    detached: &mut [Instance],
    geometry: &HeroGeometry,
    diagnostics: &mut Diagnostics,
) {
    let Some(active) = active_stack.pop() else {
        diagnostics.stack_underflows += 1;
        return;
    };
    let instance = resolve_instance_mut(&active, cache, detached);
    let Some(instance) = instance else { return };
    instance.line_range.1 = geometry.line_indices.len();
    instance.leaf_range.1 = geometry.leaves.len();
    instance.polygon_range.1 = geometry.polygon_indices.len();
}

fn resolve_instance_mut<'a>(
    active: &ActiveRef,
    cache: &'a mut NestedGrid<Instance>,
    detached: &'a mut [Instance],
) -> Option<&'a mut Instance> {
    match active {
        ActiveRef::Committed { id, age, variant } => cache.variants_mut(*id, *age).and_then(|v| v.get_mut(*variant)),
        ActiveRef::Detached { index } => detached.get_mut(*index),
    }
}

/// Register an exit point on *every* currently active instance, per the
/// interpreter's rule that a `<` reached under nested open instances marks
/// an exit on all of them, not just the innermost.
fn register_exit_points(
    id_age: IdAge,
    frame: Mat4,
    active_stack: &[ActiveRef],
    cache: &mut NestedGrid<Instance>,
    detached: &mut [Instance],
) {
    let exit = ExitHandle { id: id_age.id, age: id_age.age };
    for active in active_stack {
        if let Some(instance) = resolve_instance_mut(active, cache, detached) {
            let exit_transform = instance.local_transform.inverse() * frame;
            instance.exit_points.push(ExitPoint { exit, exit_transform });
        }
    }
}

/// Skip tokens from `start` up to (and including) the `>` matching the `<`
/// that preceded `start`, respecting `<`/`>` nesting.
fn skip_to_matching_close(tokens: &[Token], start: usize) -> usize {
    let mut depth = 1i32;
    let mut j = start;
    while j < tokens.len() {
        match tokens[j] {
            Token::OpenExit(_) => depth += 1,
            Token::CloseExit => {
                depth -= 1;
                if depth == 0 {
                    return j;
                }
            }
            _ => {}
        }
        j += 1;
    }
    tokens.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turtle_tokenizer::tokenize;

    fn cfg() -> GrammarConfig {
        GrammarConfig { step: 1.0, angle: 45.0, ..Default::default() }
    }

    #[test]
    fn axiom_only_tree() {
        let mut d = Diagnostics::default();
        let toks = tokenize("F", &mut d);
        let out = interpret(&toks, &cfg(), 0, 1, 10, &mut d);
        // root vertex at the origin plus the one F-emitted endpoint
        assert_eq!(out.geometry.vertices.len(), 2);
        assert_eq!(out.geometry.vertices[0], Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(out.geometry.vertices[1], Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(out.geometry.line_indices, vec![0, 1]);
        assert!(out.geometry.leaves.is_empty());
        assert!(out.geometry.polygon_indices.is_empty());
    }

    #[test]
    fn bracket_restores_state() {
        let mut d = Diagnostics::default();
        let toks = tokenize("F[+F]F", &mut d);
        let out = interpret(&toks, &cfg(), 0, 1, 10, &mut d);
        // root vertex plus three F moves => four vertices, no leaves
        assert_eq!(out.geometry.vertices.len(), 4);
        // last F (after pop) should have continued from the *first* F's position,
        // i.e. straight up rather than branching further.
        assert!((out.geometry.vertices[3].x).abs() < 1e-5);
        assert!((out.geometry.vertices[3].y - 2.0).abs() < 1e-5);
    }

    #[test]
    fn empty_bracket_pop_is_ignored_not_fatal() {
        let mut d = Diagnostics::default();
        let toks = tokenize("]F", &mut d);
        let out = interpret(&toks, &cfg(), 0, 1, 10, &mut d);
        assert_eq!(d.stack_underflows, 1);
        // root vertex plus the one F-emitted endpoint
        assert_eq!(out.geometry.vertices.len(), 2);
    }

    #[test]
    fn instance_open_close_zero_length_range() {
        let mut d = Diagnostics::default();
        let toks = tokenize("@(0,0)$", &mut d);
        let out = interpret(&toks, &cfg(), 1, 1, 10, &mut d);
        let variants = out.cache.variants(0, 0);
        assert_eq!(variants.len(), 1);
        assert!(variants[0].is_empty());
    }

    #[test]
    fn instance_captures_enclosed_geometry_range() {
        let mut d = Diagnostics::default();
        let toks = tokenize("@(0,0)FF$", &mut d);
        let out = interpret(&toks, &cfg(), 1, 1, 10, &mut d);
        let variants = out.cache.variants(0, 0);
        // the root vertex precedes the `@`, so the two F's inside it each
        // contribute one index pair: [root,1] then [1,2] => range (0,4).
        assert_eq!(variants[0].line_range, (0, 4));
    }

    #[test]
    fn variant_cap_limits_pushes() {
        let mut d = Diagnostics::default();
        // max_variants=1 at age 0 means cap=1: second @ open gets detached, never cached.
        let toks = tokenize("@(0,0)$@(0,0)$", &mut d);
        let out = interpret(&toks, &cfg(), 1, 1, 1, &mut d);
        assert_eq!(out.cache.variants(0, 0).len(), 1);
    }

    #[test]
    fn leaf_marker_records_pose() {
        let mut d = Diagnostics::default();
        let toks = tokenize("FJ", &mut d);
        let out = interpret(&toks, &cfg(), 0, 1, 10, &mut d);
        assert_eq!(out.geometry.leaves.len(), 1);
        assert_eq!(out.geometry.leaves[0].position, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn polygon_fan_triangulates_and_ignores_degenerate() {
        let mut d = Diagnostics::default();
        let toks = tokenize("{.-F.+F.+F.--F.}", &mut d);
        let out = interpret(&toks, &cfg(), 0, 1, 10, &mut d);
        assert!(!out.geometry.polygon_indices.is_empty());
        assert_eq!(out.geometry.polygon_indices.len() % 3, 0);

        let mut d2 = Diagnostics::default();
        let toks2 = tokenize("{.}", &mut d2);
        let out2 = interpret(&toks2, &cfg(), 0, 1, 10, &mut d2);
        assert!(out2.geometry.polygon_indices.is_empty());
        assert_eq!(d2.degenerate_polygons, 1);
    }

    #[test]
    fn exit_point_opens_instance_when_cache_empty() {
        let mut d = Diagnostics::default();
        let toks = tokenize("<(0,0)F>", &mut d);
        let out = interpret(&toks, &cfg(), 1, 1, 10, &mut d);
        assert_eq!(out.cache.variants(0, 0).len(), 1);
    }

    #[test]
    fn exit_point_skips_body_when_cache_nonempty() {
        let mut d = Diagnostics::default();
        // first fill cache[0][0] with a real instance, then a `<` for the same
        // handle should skip its bracketed-equivalent body instead of reopening.
        let toks = tokenize("@(0,0)F$<(0,0)FFFF>F", &mut d);
        let out = interpret(&toks, &cfg(), 1, 1, 10, &mut d);
        assert_eq!(out.cache.variants(0, 0).len(), 1);
        // the trailing F after `>` still executes: root + 1 (inside @) + 1 (after >) = 3 vertices
        assert_eq!(out.geometry.vertices.len(), 3);
    }

    #[test]
    fn close_instance_underflow_is_ignored() {
        let mut d = Diagnostics::default();
        let toks = tokenize("$F", &mut d);
        let out = interpret(&toks, &cfg(), 0, 1, 10, &mut d);
        assert_eq!(d.stack_underflows, 1);
        // root vertex plus the one F-emitted endpoint
        assert_eq!(out.geometry.vertices.len(), 2);
    }
}
