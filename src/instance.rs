//! Instance records and the triply-indexed cache that stores them.
//!
//! Replaces the macro-driven `vector<vector<vector<T>>>` of the original
//! generator with a small typed [`NestedGrid`], keeping the `(id, age,
//! variant)` indexing explicit instead of hidden behind preprocessor text.

use bevy::math::Mat4;

/// `(start, end)` half-open range into a hero index buffer.
pub type Range = (usize, usize);

/// A handle into the instance cache: which cached sub-tree to graft next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ExitHandle {
    pub id: usize,
    pub age: usize,
}

/// An exit point recorded inside an instance: at interpretation time this is
/// where a `<` was reached; at grafting time it is where recursion continues.
#[derive(Clone, Copy, Debug)]
pub struct ExitPoint {
    pub exit: ExitHandle,
    /// Transform from the owning instance's local frame to the exit's frame.
    pub exit_transform: Mat4,
}

/// A reusable sub-tree: its placement frame, the hero-buffer ranges it
/// covers, and the exit points from which grafting continues.
#[derive(Clone, Debug)]
pub struct Instance {
    /// Rigid transform from the tree root frame to this instance's local
    /// frame, as recorded at the `@`/`<` site. Stored raw (not pre-inverted);
    /// callers invert on demand at graft time.
    pub local_transform: Mat4,
    pub line_range: Range,
    pub leaf_range: Range,
    pub polygon_range: Range,
    pub exit_points: Vec<ExitPoint>,
}

impl Instance {
    pub fn new(local_transform: Mat4, line_start: usize, leaf_start: usize, polygon_start: usize) -> Self {
        Self {
            local_transform,
            line_range: (line_start, line_start),
            leaf_range: (leaf_start, leaf_start),
            polygon_range: (polygon_start, polygon_start),
            exit_points: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.line_range.0 == self.line_range.1
            && self.leaf_range.0 == self.leaf_range.1
            && self.polygon_range.0 == self.polygon_range.1
            && self.exit_points.is_empty()
    }
}

/// A small typed stand-in for the source's `vector<vector<vector<T>>>`
/// cache macros: indexed by `(id, age, variant)`, growable along any axis.
#[derive(Clone, Debug, Default)]
pub struct NestedGrid<T> {
    // id -> age -> variants
    rows: Vec<Vec<Vec<T>>>,
}

impl<T> NestedGrid<T> {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Resize the `id`/`age` shape to match `ids` branch ids and `ages`
    /// generations, leaving existing variant lists untouched where still in
    /// range and truncating/extending with empty `Vec`s elsewhere.
    pub fn resize_shape(&mut self, ids: usize, ages: usize) {
        self.rows.resize_with(ids, Vec::new);
        for row in &mut self.rows {
            row.resize_with(ages, Vec::new);
        }
    }

    /// Resize this grid's `(id, age)` shape and variant counts to mirror
    /// another grid of a possibly different element type. Used to build the
    /// forest's transform cache from a tree type's instance cache.
    pub fn resize_like<U>(&mut self, other: &NestedGrid<U>)
    where
        T: Default + Clone,
    {
        self.rows.clear();
        self.rows.reserve(other.rows.len());
        for other_row in &other.rows {
            let mut row = Vec::with_capacity(other_row.len());
            for _variants in other_row {
                row.push(Vec::new());
            }
            self.rows.push(row);
        }
    }

    pub fn id_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of age slots per id, assuming the rectangular shape
    /// established by [`NestedGrid::resize_shape`]. Zero if empty.
    pub fn age_count(&self) -> usize {
        self.rows.first().map(|row| row.len()).unwrap_or(0)
    }

    pub fn variants(&self, id: usize, age: usize) -> &[T] {
        self.rows
            .get(id)
            .and_then(|row| row.get(age))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn variants_mut(&mut self, id: usize, age: usize) -> Option<&mut Vec<T>> {
        self.rows.get_mut(id).and_then(|row| row.get_mut(age))
    }

    pub fn push(&mut self, id: usize, age: usize, value: T) {
        if id >= self.rows.len() {
            self.rows.resize_with(id + 1, Vec::new);
        }
        let row = &mut self.rows[id];
        if age >= row.len() {
            row.resize_with(age + 1, Vec::new);
        }
        row[age].push(value);
    }

    pub fn for_each_mut(&mut self, mut f: impl FnMut(usize, usize, usize, &mut T)) {
        for (id, row) in self.rows.iter_mut().enumerate() {
            for (age, variants) in row.iter_mut().enumerate() {
                for (variant, value) in variants.iter_mut().enumerate() {
                    f(id, age, variant, value);
                }
            }
        }
    }
}

/// `max_variants / (age + 1)`, floored. Older sub-trees are larger and
/// cheaper to share, so the variant budget decays with age.
pub fn variant_cap(max_variants: usize, age: usize) -> usize {
    max_variants / (age + 1)
}
