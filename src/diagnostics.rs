//! Recoverable-error bookkeeping shared by grammar compilation, the turtle
//! interpreter and the forest composer. Nothing here is fatal: every counter
//! just means "this kind of non-fatal condition fired N times", logged once
//! per build rather than threaded through every call as a `Result`.

use bevy::prelude::*;

#[derive(Resource, Clone, Debug, Default)]
pub struct Diagnostics {
    pub parse_warnings: u32,
    pub empty_cache_grafts: u32,
    pub degenerate_polygons: u32,
    pub stack_underflows: u32,
    pub out_of_range_lookups: u32,
}

impl Diagnostics {
    pub fn has_any(&self) -> bool {
        self.parse_warnings > 0
            || self.empty_cache_grafts > 0
            || self.degenerate_polygons > 0
            || self.stack_underflows > 0
            || self.out_of_range_lookups > 0
    }

    /// Emit a single `warn!` summarizing anything non-zero. Call once after
    /// a build/compose cycle rather than logging each occurrence inline.
    pub fn log_summary(&self, context: &str) {
        if !self.has_any() {
            return;
        }
        warn!(
            "{context}: parse_warnings={} empty_cache_grafts={} degenerate_polygons={} stack_underflows={} out_of_range_lookups={}",
            self.parse_warnings,
            self.empty_cache_grafts,
            self.degenerate_polygons,
            self.stack_underflows,
            self.out_of_range_lookups
        );
    }
}
