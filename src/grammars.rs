//! Three bundled example grammars, ported from the tree species this
//! generator's grammar-compilation rules were originally modeled on.
//! Each constructor returns an uncompiled `(name, axiom, rules, config)`
//! tuple; callers pick a `generation` and `seed` appropriate to their use
//! (the source values below favor visual density over quick turnaround).

use crate::grammar::GrammarConfig;

pub struct GrammarSource {
    pub name: &'static str,
    pub axiom: &'static str,
    pub rules: &'static [&'static str],
    pub config: GrammarConfig,
}

/// A fir-like conifer: whorled branches around a dominant leader, with
/// needle clusters built from a polygon fan.
pub fn fir() -> GrammarSource {
    GrammarSource {
        name: "fir",
        axiom: "///FFFFFFFA",
        rules: &[
            "A=![&FL!A]//[&FL!A]/////[&FL!A]:0.5",
            "A=![&FL!A]//////[&FL!A]/////////[&FL!A]:0.5",
            "&F=&S/////F",
            "S=FL:0.6",
            "S=FFL:0.4",
            "L=[^\"\"\"\"\"\"{.-f.+f.+f.--(180)-f.+f.+f.}]",
        ],
        config: GrammarConfig {
            step: 1.2,
            step_scale: 0.9,
            angle: 30.0,
            angle_scale: 0.9,
            thickness: 1.2,
            thickness_scale: 0.7,
            generation: 20,
            seed: None,
            instancing_prob: 0.6,
        },
    }
}

/// A gnarled broadleaf: alternating yaw/pitch/roll branching with no
/// explicit leaf geometry, relying on terminal `F` density for silhouette.
pub fn broadleaf() -> GrammarSource {
    GrammarSource {
        name: "broadleaf",
        axiom: "///A",
        rules: &["A=F&[![A]^!A]^F^[!^FA]&!A", "F=FF"],
        config: GrammarConfig {
            step: 1.0,
            step_scale: 0.9,
            angle: 25.0,
            angle_scale: 0.9,
            thickness: 1.0,
            thickness_scale: 0.6,
            generation: 6,
            seed: None,
            instancing_prob: 0.6,
        },
    }
}

/// A palm-like tree: a single thickening trunk crowned by a whorl of
/// fronds, each frond tipped by a leaf marker.
pub fn palm() -> GrammarSource {
    GrammarSource {
        name: "palm",
        axiom: "FFFA",
        rules: &[
            "A=!\"[BJ]////[BJ]////BJ",
            "B=&FFFA:0.2",
            "B=&[!!C]FFFA:0.2",
            "B=&F[!!C]FFA:0.2",
            "B=&FF[!!C]FA:0.2",
            "B=&FFF[!!C]A:0.2",
            "C=/&F!FJ:0.3",
            "C=\\&FJ:0.3",
            "C=&FJ:0.3",
        ],
        config: GrammarConfig {
            step: 2.0,
            step_scale: 0.9,
            angle: 30.0,
            angle_scale: 0.9,
            thickness: 1.0,
            thickness_scale: 0.7,
            generation: 18,
            seed: None,
            instancing_prob: 0.6,
        },
    }
}

pub fn all() -> [GrammarSource; 3] {
    [fir(), broadleaf(), palm()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::grammar::compile;

    #[test]
    fn every_bundled_grammar_compiles_without_parse_warnings() {
        for source in all() {
            let mut diag = Diagnostics::default();
            let g = compile(source.name, source.axiom, source.rules, source.config.clone(), &mut diag);
            assert_eq!(diag.parse_warnings, 0, "{} had parse warnings", source.name);
            assert!(!g.rules.is_empty());
        }
    }
}
