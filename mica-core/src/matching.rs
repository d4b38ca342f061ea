//! Pattern-match compilation
//!
//! Compiles a clause matrix into nested `Match` statements, following
//! Jacobs' "How to compile pattern matching". Clause bodies are not
//! duplicated: each surface clause is compiled once into a join-point
//! label, and the compiled match jumps to it.

use crate::ir::{Arg, Block, BlockLit, Pure, Stmt};
use mica_types::{BlockSymbol, SymbolId, Symbols};
use std::collections::HashMap;

/// A preprocessed pattern. Literal patterns are resolved into guards
/// upstream, so only binders, wildcards and constructor tags reach the
/// compiler.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchPattern {
    Any,
    Ident(SymbolId),
    Tag { ctor: SymbolId, fields: Vec<MatchPattern> },
}

/// One row of the clause matrix
#[derive(Debug, Clone)]
pub struct Clause {
    /// Pending requirements: which pattern must hold at which variable.
    /// Insertion-ordered; doubles as the tie-breaker for the split
    /// heuristic.
    pub patterns: Vec<(SymbolId, MatchPattern)>,
    /// The join-point label to jump to when this clause matches
    pub target: SymbolId,
    /// Arguments of the jump: the binders of the original pattern, mapped
    /// through the substitution accumulated during normalization
    pub args: Vec<SymbolId>,
    /// Binder-to-scrutinee substitution filled in by normalization
    subst: HashMap<SymbolId, SymbolId>,
}

impl Clause {
    pub fn new(scrutinee: SymbolId, pattern: MatchPattern, target: SymbolId, args: Vec<SymbolId>) -> Self {
        Clause {
            patterns: vec![(scrutinee, pattern)],
            target,
            args,
            subst: HashMap::new(),
        }
    }

    /// Split identifier and wildcard patterns away: binders join the
    /// substitution, wildcards simply drop, tag patterns remain.
    fn normalize(mut self) -> Clause {
        let mut remaining = Vec::with_capacity(self.patterns.len());
        for (at, pattern) in self.patterns {
            match pattern {
                MatchPattern::Any => {}
                MatchPattern::Ident(binder) => {
                    self.subst.insert(binder, at);
                }
                tag @ MatchPattern::Tag { .. } => remaining.push((at, tag)),
            }
        }
        self.patterns = remaining;
        self
    }

    fn pattern_at(&self, var: SymbolId) -> Option<&MatchPattern> {
        self.patterns.iter().find(|(v, _)| *v == var).map(|(_, p)| p)
    }

    fn without(&self, var: SymbolId) -> Vec<(SymbolId, MatchPattern)> {
        self.patterns.iter().filter(|(v, _)| *v != var).cloned().collect()
    }

    /// The jump this clause compiles to once it is satisfied
    fn jump(&self) -> Stmt {
        let args = self
            .args
            .iter()
            .map(|a| Arg::Value(Pure::Var(*self.subst.get(a).unwrap_or(a))))
            .collect();
        Stmt::App { callee: Block::Var(self.target), targs: vec![], args }
    }
}

/// Compile a clause matrix. An empty input compiles to `Hole`: a match on
/// an uninhabited scrutinee is unreachable.
pub fn compile(clauses: Vec<Clause>, symbols: &mut Symbols) -> Stmt {
    let clauses: Vec<Clause> = clauses.into_iter().map(Clause::normalize).collect();

    let Some(first) = clauses.first() else {
        return Stmt::Hole;
    };

    // A clause with no remaining requirements is satisfied
    if first.patterns.is_empty() {
        return first.jump();
    }

    let split_var = choose_split_var(&clauses);

    // The constructors appearing at the split variable, in the declaration
    // order of the owning data type
    let mut appearing: Vec<SymbolId> = Vec::new();
    for clause in &clauses {
        if let Some(MatchPattern::Tag { ctor, .. }) = clause.pattern_at(split_var) {
            if !appearing.contains(ctor) {
                appearing.push(*ctor);
            }
        }
    }
    let datatype = datatype_of(symbols, appearing[0]);
    let ordered: Vec<SymbolId> = symbols
        .constructors_of(datatype)
        .iter()
        .copied()
        .filter(|c| appearing.contains(c))
        .collect();

    // Clauses that do not constrain the split variable participate in
    // every branch and also form the default
    let defaults: Vec<Clause> = clauses
        .iter()
        .filter(|c| c.pattern_at(split_var).is_none())
        .cloned()
        .map(|c| Clause { patterns: c.without(split_var), ..c })
        .collect();

    let mut branches = Vec::with_capacity(ordered.len());
    for ctor in ordered {
        let arity = arity_of(symbols, ctor);
        let field_vars: Vec<SymbolId> =
            (0..arity).map(|_| symbols.fresh_value("f")).collect();

        let mut child_clauses = Vec::new();
        for clause in &clauses {
            match clause.pattern_at(split_var) {
                Some(MatchPattern::Tag { ctor: c, fields }) if *c == ctor => {
                    let mut patterns = clause.without(split_var);
                    for (var, sub) in field_vars.iter().zip(fields.iter()) {
                        patterns.push((*var, sub.clone()));
                    }
                    child_clauses.push(Clause { patterns, ..clause.clone() });
                }
                Some(_) => {}
                None => child_clauses.push(Clause {
                    patterns: clause.without(split_var),
                    ..clause.clone()
                }),
            }
        }

        let body = compile(child_clauses, symbols);
        branches.push((ctor, BlockLit::values(field_vars, body)));
    }

    let default = if defaults.is_empty() {
        None
    } else {
        Some(Box::new(compile(defaults, symbols)))
    };

    Stmt::Match { scrutinee: Pure::Var(split_var), branches, default }
}

/// The heuristic: pick the variable mentioned by the most clauses, ties
/// broken by first appearance.
fn choose_split_var(clauses: &[Clause]) -> SymbolId {
    let mut order: Vec<SymbolId> = Vec::new();
    let mut counts: HashMap<SymbolId, usize> = HashMap::new();
    for clause in clauses {
        for (var, _) in &clause.patterns {
            if !order.contains(var) {
                order.push(*var);
            }
            *counts.entry(*var).or_insert(0) += 1;
        }
    }
    // Ties go to the first-inserted variable: only a strictly greater
    // count displaces the current best.
    order
        .iter()
        .copied()
        .fold(None, |best, v| match best {
            Some(b) if counts[&b] >= counts[&v] => Some(b),
            _ => Some(v),
        })
        .expect("internal compiler error: no pattern variable to split on")
}

fn datatype_of(symbols: &Symbols, ctor: SymbolId) -> SymbolId {
    match symbols.as_block(ctor) {
        Some(BlockSymbol::Constructor { datatype, .. }) => *datatype,
        _ => panic!(
            "internal compiler error: match pattern tag {} is not a constructor",
            symbols.name(ctor)
        ),
    }
}

fn arity_of(symbols: &Symbols, ctor: SymbolId) -> usize {
    match symbols.as_block(ctor) {
        Some(BlockSymbol::Constructor { arity, .. }) => *arity,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mica_types::symbol::{SymbolKind, TermSymbol, TypeSymbol};
    use mica_syntax::Name;

    struct Fixture {
        symbols: Symbols,
        tree: SymbolId,
        leaf: SymbolId,
        node: SymbolId,
    }

    /// type Tree { Leaf(Int); Node(Tree, Tree) }
    fn fixture() -> Fixture {
        let mut symbols = Symbols::new();
        let tree = symbols.insert(
            Name::from("Tree"),
            SymbolKind::Type(TypeSymbol::Data { constructors: vec![] }),
        );
        let leaf = symbols.insert(
            Name::from("Leaf"),
            SymbolKind::Term(TermSymbol::Block(BlockSymbol::Constructor {
                datatype: tree,
                arity: 1,
            })),
        );
        let node = symbols.insert(
            Name::from("Node"),
            SymbolKind::Term(TermSymbol::Block(BlockSymbol::Constructor {
                datatype: tree,
                arity: 2,
            })),
        );
        symbols.set_data_constructors(tree, vec![leaf, node]);
        Fixture { symbols, tree, leaf, node }
    }

    fn collect_targets(stmt: &Stmt, out: &mut Vec<SymbolId>) {
        match stmt {
            Stmt::App { callee: Block::Var(t), .. } => out.push(*t),
            Stmt::Match { branches, default, .. } => {
                for (_, lit) in branches {
                    collect_targets(&lit.body, out);
                }
                if let Some(d) = default {
                    collect_targets(d, out);
                }
            }
            _ => {}
        }
    }

    #[test]
    fn test_empty_input_compiles_to_hole() {
        let mut f = fixture();
        assert_eq!(compile(vec![], &mut f.symbols), Stmt::Hole);
    }

    #[test]
    fn test_irrefutable_first_clause_jumps_directly() {
        let mut f = fixture();
        let scrutinee = f.symbols.fresh_value("s");
        let binder = f.symbols.fresh_value("x");
        let label = f.symbols.fresh_call_target("k");
        let clause =
            Clause::new(scrutinee, MatchPattern::Ident(binder), label, vec![binder]);

        let out = compile(vec![clause], &mut f.symbols);
        // The binder is substituted by the scrutinee in the jump
        match out {
            Stmt::App { callee: Block::Var(t), args, .. } => {
                assert_eq!(t, label);
                assert_eq!(args, vec![Arg::Value(Pure::Var(scrutinee))]);
            }
            other => panic!("expected jump, got {:?}", other),
        }
    }

    #[test]
    fn test_full_coverage_has_no_default() {
        let mut f = fixture();
        let scrutinee = f.symbols.fresh_value("s");
        let n = f.symbols.fresh_value("n");
        let k1 = f.symbols.fresh_call_target("k");
        let k2 = f.symbols.fresh_call_target("k");

        let clauses = vec![
            Clause::new(
                scrutinee,
                MatchPattern::Tag { ctor: f.leaf, fields: vec![MatchPattern::Ident(n)] },
                k1,
                vec![n],
            ),
            Clause::new(
                scrutinee,
                MatchPattern::Tag { ctor: f.node, fields: vec![MatchPattern::Any, MatchPattern::Any] },
                k2,
                vec![],
            ),
        ];

        match compile(clauses, &mut f.symbols) {
            Stmt::Match { branches, default, .. } => {
                assert_eq!(branches.len(), 2);
                // Declaration order: Leaf before Node
                assert_eq!(branches[0].0, f.leaf);
                assert_eq!(branches[1].0, f.node);
                assert!(default.is_none());
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn test_split_heuristic_breaks_ties_by_insertion_order() {
        let mut f = fixture();
        let s1 = f.symbols.fresh_value("s");
        let s2 = f.symbols.fresh_value("s");
        let k1 = f.symbols.fresh_call_target("k");
        let k2 = f.symbols.fresh_call_target("k");

        // Both variables are mentioned exactly once; the first-seen one
        // must drive the split.
        let clauses = vec![
            Clause {
                patterns: vec![(
                    s1,
                    MatchPattern::Tag { ctor: f.leaf, fields: vec![MatchPattern::Any] },
                )],
                target: k1,
                args: vec![],
                subst: HashMap::new(),
            },
            Clause {
                patterns: vec![(
                    s2,
                    MatchPattern::Tag {
                        ctor: f.node,
                        fields: vec![MatchPattern::Any, MatchPattern::Any],
                    },
                )],
                target: k2,
                args: vec![],
                subst: HashMap::new(),
            },
        ];

        match compile(clauses, &mut f.symbols) {
            Stmt::Match { scrutinee: Pure::Var(v), .. } => assert_eq!(v, s1),
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_constructor_gets_default() {
        let mut f = fixture();
        let scrutinee = f.symbols.fresh_value("s");
        let k1 = f.symbols.fresh_call_target("k");
        let k2 = f.symbols.fresh_call_target("k");

        let clauses = vec![
            Clause::new(
                scrutinee,
                MatchPattern::Tag { ctor: f.leaf, fields: vec![MatchPattern::Any] },
                k1,
                vec![],
            ),
            // A catch-all clause that does not constrain the scrutinee
            Clause::new(scrutinee, MatchPattern::Any, k2, vec![]),
        ];

        match compile(clauses, &mut f.symbols) {
            Stmt::Match { branches, default, .. } => {
                assert_eq!(branches.len(), 1);
                let default = default.expect("catch-all must become the default");
                assert!(matches!(*default, Stmt::App { .. }));
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_patterns_and_label_reachability() {
        let mut f = fixture();
        let scrutinee = f.symbols.fresh_value("s");
        let n = f.symbols.fresh_value("n");
        let k1 = f.symbols.fresh_call_target("k");
        let k2 = f.symbols.fresh_call_target("k");
        let k3 = f.symbols.fresh_call_target("k");

        // case Leaf(n) => k1(n); case Node(Leaf(_), _) => k2(); case _ => k3()
        let clauses = vec![
            Clause::new(
                scrutinee,
                MatchPattern::Tag { ctor: f.leaf, fields: vec![MatchPattern::Ident(n)] },
                k1,
                vec![n],
            ),
            Clause::new(
                scrutinee,
                MatchPattern::Tag {
                    ctor: f.node,
                    fields: vec![
                        MatchPattern::Tag { ctor: f.leaf, fields: vec![MatchPattern::Any] },
                        MatchPattern::Any,
                    ],
                },
                k2,
                vec![],
            ),
            Clause::new(scrutinee, MatchPattern::Any, k3, vec![]),
        ];

        let out = compile(clauses, &mut f.symbols);
        let mut targets = Vec::new();
        collect_targets(&out, &mut targets);
        // Every clause's label appears at least once in the compiled output
        for label in [k1, k2, k3] {
            assert!(targets.contains(&label), "label {:?} unreachable", label);
        }
    }
}
