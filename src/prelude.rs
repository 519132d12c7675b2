//! Convenience re-exports for frequently used types.
//!
//! Grouped roughly by layer. Importing `prelude::*` in integration tests or
//! auxiliary binaries simplifies access to the core building blocks.
//!
//! Note: keep this lean; avoid dumping every internal type here — prefer
//! the most commonly used building blocks.

/// Grammar compilation & stochastic rewriting
pub use crate::grammar::{compile, Grammar, GrammarConfig, Rule, RhsOption};
pub use crate::grammars::{all as bundled_grammars, broadleaf, fir, palm, GrammarSource};
pub use crate::rewriter::{expand, expand_with_rng};

/// Turtle interpretation
pub use crate::turtle_interpreter::{interpret, HeroGeometry, InterpretOutput, Leaf, TurtleState};
pub use crate::turtle_tokenizer::{tokenize, IdAge, RotateAxis, ScaleTarget, Token};

/// Instance cache
pub use crate::instance::{variant_cap, ExitHandle, ExitPoint, Instance, NestedGrid, Range};

/// Tree type & forest composition
pub use crate::forest::{CacheIndex, Forest, ForestConfig, TreePlacement};
pub use crate::tree_type::{FillConfig, TreeType};

/// Placement
pub use crate::placement::{scatter, PaintConfig, PaintSession, ScatterConfig};

/// Terrain height field
pub use crate::height::{height_at, HeightField, HeightFieldConfig};

/// Diagnostics
pub use crate::diagnostics::Diagnostics;
