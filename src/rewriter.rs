//! Stochastic string rewriting: expands a grammar's axiom for `G`
//! generations, sampling each non-terminal's replacement proportional to its
//! normalized rule probabilities.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::grammar::Grammar;

/// Expand `grammar.axiom` for `grammar.config.generation` passes.
///
/// Deterministic for a fixed `grammar.config.seed`: two calls with the same
/// grammar and seed produce byte-identical output. An unset seed falls back
/// to a wall-clock-derived seed, matching this crate's "seeding never
/// fails" stance.
pub fn expand(grammar: &Grammar) -> String {
    let seed = grammar.config.seed.unwrap_or_else(wall_clock_seed);
    let mut rng = StdRng::seed_from_u64(seed);
    expand_with_rng(grammar, &mut rng)
}

/// Same as [`expand`] but with an explicit RNG, so tests (and repeated hero
/// tree interpretations needing distinct streams) can inject their own.
pub fn expand_with_rng(grammar: &Grammar, rng: &mut StdRng) -> String {
    let mut current = grammar.axiom.clone();
    for pass in 0..grammar.config.generation {
        current = rewrite_pass(grammar, &current, pass, rng);
    }
    current
}

fn rewrite_pass(grammar: &Grammar, input: &str, pass_index: usize, rng: &mut StdRng) -> String {
    let mut out = String::with_capacity(input.len() * 2);
    for symbol in input.chars() {
        match grammar.rule_for(symbol) {
            Some(rule) if !rule.options.is_empty() => {
                let chosen = sample_option(rule, rng);
                out.push_str(&substitute_age(chosen, pass_index));
            }
            _ => out.push(symbol),
        }
    }
    out
}

fn sample_option<'a>(rule: &'a crate::grammar::Rule, rng: &mut StdRng) -> &'a str {
    let roll: f64 = rng.gen_range(0.0..1.0);
    let mut acc = 0.0;
    for option in &rule.options {
        acc += option.prob;
        if roll < acc {
            return &option.text;
        }
    }
    // Floating point drift: fall back to the last option rather than panic.
    rule.options.last().map(|o| o.text.as_str()).unwrap_or("")
}

/// Replace every `#` placeholder with the current pass index (0-based),
/// i.e. the generation depth at which this substitution happened.
fn substitute_age(rhs: &str, pass_index: usize) -> String {
    if !rhs.contains('#') {
        return rhs.to_string();
    }
    rhs.replace('#', &pass_index.to_string())
}

fn wall_clock_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
