//! Grammar parsing, probability normalization and instancing injection.
//!
//! `compile` turns raw `LHS=RHS[:PROB]` lines into a [`Grammar`] whose rule
//! right-hand-sides already carry `@(id,#)`/`{(id,#)[..]}(id,#)` instancing
//! markers and a deduplicated branch catalog, per the grammar-compilation
//! algorithm this crate grew out of.

use std::collections::HashSet;

use crate::diagnostics::Diagnostics;

/// One weighted right-hand side of a rule.
#[derive(Clone, Debug)]
pub struct RhsOption {
    pub text: String,
    pub prob: f64,
}

/// All right-hand sides sharing a left-hand-side non-terminal symbol.
#[derive(Clone, Debug)]
pub struct Rule {
    pub lhs: char,
    pub options: Vec<RhsOption>,
}

/// Default turtle parameters and generation/seeding controls for a grammar.
#[derive(Clone, Debug)]
pub struct GrammarConfig {
    pub step: f32,
    pub step_scale: f32,
    pub angle: f32,
    pub angle_scale: f32,
    pub thickness: f32,
    pub thickness_scale: f32,
    pub generation: usize,
    pub seed: Option<u64>,
    pub instancing_prob: f32,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            step: 1.0,
            step_scale: 0.9,
            angle: 30.0,
            angle_scale: 0.9,
            thickness: 1.0,
            thickness_scale: 0.7,
            generation: 4,
            seed: None,
            instancing_prob: 0.6,
        }
    }
}

/// A compiled grammar: axiom, normalized-and-instanced rules, and the
/// branch catalog discovered while injecting instancing markers.
#[derive(Clone, Debug)]
pub struct Grammar {
    pub name: String,
    pub axiom: String,
    pub rules: Vec<Rule>,
    pub config: GrammarConfig,
    pub non_terminals: HashSet<char>,
    pub branch_catalog: Vec<String>,
}

impl Grammar {
    pub fn rule_for(&self, lhs: char) -> Option<&Rule> {
        self.rules.iter().find(|r| r.lhs == lhs)
    }
}

/// Parse, normalize and instance-inject a raw rule list into a [`Grammar`].
///
/// Malformed lines (no `=`, empty lhs, empty rhs) bump
/// `diagnostics.parse_warnings` and are skipped rather than aborting the
/// whole grammar.
pub fn compile(
    name: &str,
    axiom: &str,
    raw_rules: &[&str],
    config: GrammarConfig,
    diagnostics: &mut Diagnostics,
) -> Grammar {
    let grouped = parse_lines(raw_rules, diagnostics);
    let non_terminals: HashSet<char> = grouped.iter().map(|(lhs, _)| *lhs).collect();

    let mut branch_catalog: Vec<String> = Vec::new();
    let mut rules = Vec::with_capacity(grouped.len());

    for (lhs, raw_options) in grouped {
        let normalized = normalize_weights(&raw_options);
        let mut expanded: Vec<RhsOption> = Vec::new();
        for (text, base_prob) in normalized {
            inject_instancing(
                &text,
                base_prob,
                config.instancing_prob as f64,
                &non_terminals,
                &mut branch_catalog,
                &mut expanded,
            );
        }
        normalize_in_place(&mut expanded);
        rules.push(Rule { lhs, options: expanded });
    }

    Grammar {
        name: name.to_string(),
        axiom: axiom.to_string(),
        rules,
        config,
        non_terminals,
        branch_catalog,
    }
}

/// Parse `LHS=RHS[:PROB]` lines, grouping by `LHS` in first-seen order.
fn parse_lines(raw_rules: &[&str], diagnostics: &mut Diagnostics) -> Vec<(char, Vec<(String, Option<f64>)>)> {
    let mut order: Vec<char> = Vec::new();
    let mut groups: Vec<(char, Vec<(String, Option<f64>)>)> = Vec::new();

    for line in raw_rules {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(eq_idx) = line.find('=') else {
            diagnostics.parse_warnings += 1;
            continue;
        };
        let lhs_part = &line[..eq_idx];
        let rest = &line[eq_idx + 1..];
        let mut lhs_chars = lhs_part.chars();
        let (Some(lhs), None) = (lhs_chars.next(), lhs_chars.next()) else {
            diagnostics.parse_warnings += 1;
            continue;
        };

        let (rhs_text, prob) = match rest.rfind(':') {
            Some(colon_idx) => {
                let prob_str = &rest[colon_idx + 1..];
                match prob_str.parse::<f64>() {
                    Ok(p) => (&rest[..colon_idx], Some(p)),
                    Err(_) => {
                        diagnostics.parse_warnings += 1;
                        (rest, None)
                    }
                }
            }
            None => (rest, None),
        };
        if rhs_text.is_empty() {
            diagnostics.parse_warnings += 1;
            continue;
        }

        if let Some(pos) = order.iter().position(|c| *c == lhs) {
            groups[pos].1.push((rhs_text.to_string(), prob));
        } else {
            order.push(lhs);
            groups.push((lhs, vec![(rhs_text.to_string(), prob)]));
        }
    }
    groups
}

/// Missing `:PROB` gets uniform weight 1.0; then every option in the group
/// is normalized to sum to 1.
fn normalize_weights(options: &[(String, Option<f64>)]) -> Vec<(String, f64)> {
    let raw: Vec<(String, f64)> = options
        .iter()
        .map(|(text, prob)| (text.clone(), prob.unwrap_or(1.0)))
        .collect();
    let total: f64 = raw.iter().map(|(_, p)| p).sum();
    if total <= 0.0 {
        let n = raw.len().max(1) as f64;
        return raw.into_iter().map(|(t, _)| (t, 1.0 / n)).collect();
    }
    raw.into_iter().map(|(t, p)| (t, p / total)).collect()
}

fn normalize_in_place(options: &mut [RhsOption]) {
    let total: f64 = options.iter().map(|o| o.prob).sum();
    if total <= 0.0 {
        return;
    }
    for o in options.iter_mut() {
        o.prob /= total;
    }
}

/// A top-level bracketed branch found while scanning an rhs, depth-aware so
/// nested brackets inside a branch body don't terminate it early.
struct TopLevelBranch {
    /// Byte span of the full `[...]` group, brackets included.
    span: (usize, usize),
    body: String,
}

fn find_top_level_branches(rhs: &str, non_terminals: &HashSet<char>) -> Vec<TopLevelBranch> {
    let chars: Vec<char> = rhs.chars().collect();
    let mut branches = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '[' {
            let mut depth = 1;
            let mut j = i + 1;
            while j < chars.len() && depth > 0 {
                match chars[j] {
                    '[' => depth += 1,
                    ']' => depth -= 1,
                    _ => {}
                }
                if depth == 0 {
                    break;
                }
                j += 1;
            }
            if depth != 0 {
                // Unbalanced bracket: stop scanning, leave the rest verbatim.
                break;
            }
            let body: String = chars[i + 1..j].iter().collect();
            if body.chars().any(|c| non_terminals.contains(&c)) {
                branches.push(TopLevelBranch { span: (i, j + 1), body });
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }
    branches
}

fn catalog_id(catalog: &mut Vec<String>, body: &str) -> usize {
    if let Some(pos) = catalog.iter().position(|b| b == body) {
        pos
    } else {
        catalog.push(body.to_string());
        catalog.len() - 1
    }
}

/// Enumerate all `2^branch_count` instance/keep subsets of an rhs's
/// top-level non-terminal-bearing branches, appending each resulting
/// variant (with its reweighted probability) to `out`.
fn inject_instancing(
    rhs: &str,
    base_prob: f64,
    p_inst: f64,
    non_terminals: &HashSet<char>,
    catalog: &mut Vec<String>,
    out: &mut Vec<RhsOption>,
) {
    let branches = find_top_level_branches(rhs, non_terminals);
    if branches.is_empty() {
        out.push(RhsOption { text: rhs.to_string(), prob: base_prob });
        return;
    }

    let ids: Vec<usize> = branches.iter().map(|b| catalog_id(catalog, &b.body)).collect();
    let n = branches.len();
    let combos = 1usize << n;

    for subset in 0..combos {
        let mut text = String::new();
        let mut cursor = 0usize;
        let mut instance_count = 0u32;
        let mut keep_count = 0u32;
        let chars: Vec<char> = rhs.chars().collect();

        for (k, branch) in branches.iter().enumerate() {
            let (start, end) = branch.span;
            text.push_str(&chars[cursor..start].iter().collect::<String>());
            let id = ids[k];
            let is_instance = (subset >> k) & 1 == 0;
            if is_instance {
                text.push_str(&format!("@({id},#)"));
                instance_count += 1;
            } else {
                text.push_str(&format!("{{({id},#)[{}]}}({id},#)", branch.body));
                keep_count += 1;
            }
            cursor = end;
        }
        text.push_str(&chars[cursor..].iter().collect::<String>());

        let prob = base_prob * p_inst.powi(instance_count as i32) * (1.0 - p_inst).powi(keep_count as i32);
        out.push(RhsOption { text, prob });
    }
}
