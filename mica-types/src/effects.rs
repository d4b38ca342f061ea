//! Effect rows
//!
//! An effect row is an unordered, duplicate-free set of effects with value
//! equality defined as mutual inclusion. The smart constructor is the only
//! way to build a row; it expands effect aliases on construction, so stored
//! rows never contain an alias.

use crate::symbol::{SymbolId, Symbols, TypeSymbol};
use crate::types::ValueType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// A named effect or interface. May name an alias when handed to the
    /// smart constructor; rows never store the alias form.
    Named(SymbolId),
    /// An effect applied to type arguments
    App { effect: SymbolId, args: Vec<ValueType> },
}

impl Effect {
    pub fn symbol(&self) -> SymbolId {
        match self {
            Effect::Named(s) => *s,
            Effect::App { effect, .. } => *effect,
        }
    }

    pub fn substitute(&self, subst: &HashMap<SymbolId, ValueType>) -> Effect {
        match self {
            Effect::Named(s) => Effect::Named(*s),
            Effect::App { effect, args } => Effect::App {
                effect: *effect,
                args: args.iter().map(|a| a.substitute(subst)).collect(),
            },
        }
    }

    fn dealias_args(&self, symbols: &Symbols) -> Effect {
        match self {
            Effect::Named(s) => Effect::Named(*s),
            Effect::App { effect, args } => Effect::App {
                effect: *effect,
                args: args.iter().map(|a| a.dealias(symbols)).collect(),
            },
        }
    }

    /// Whether the effect is one of the compiler-provided ones
    pub fn is_builtin(&self, symbols: &Symbols) -> bool {
        matches!(
            symbols.as_type(self.symbol()),
            Some(TypeSymbol::Effect { builtin: true, .. })
        )
    }

    pub fn display<'a>(&'a self, symbols: &'a Symbols) -> DisplayEffect<'a> {
        DisplayEffect { effect: self, symbols }
    }
}

pub struct DisplayEffect<'a> {
    effect: &'a Effect,
    symbols: &'a Symbols,
}

impl fmt::Display for DisplayEffect<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbols.name(self.effect.symbol()))
    }
}

/// An alias-free, duplicate-free effect row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Effects {
    effects: Vec<Effect>,
}

impl Effects {
    pub fn empty() -> Self {
        Effects::default()
    }

    /// The only way into a row: expands aliases and drops duplicates.
    pub fn of(effects: impl IntoIterator<Item = Effect>, symbols: &Symbols) -> Self {
        let mut row = Effects::empty();
        for e in effects {
            row.push_expanded(e, symbols);
        }
        row
    }

    fn push_expanded(&mut self, effect: Effect, symbols: &Symbols) {
        match symbols.as_type(effect.symbol()) {
            Some(TypeSymbol::EffectAlias { params, effects }) => {
                let subst: HashMap<SymbolId, ValueType> = match &effect {
                    Effect::App { args, .. } => {
                        params.iter().copied().zip(args.iter().cloned()).collect()
                    }
                    Effect::Named(_) => HashMap::new(),
                };
                for e in &effects.effects {
                    self.push_expanded(e.substitute(&subst), symbols);
                }
            }
            _ => {
                let canonical = effect.dealias_args(symbols);
                if !self.effects.contains(&canonical) {
                    self.effects.push(canonical);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter()
    }

    /// Membership modulo alias expansion on the probe side
    pub fn contains(&self, effect: &Effect, symbols: &Symbols) -> bool {
        let probe = Effects::of([effect.clone()], symbols);
        probe.effects.iter().all(|e| self.effects.contains(e))
    }

    /// Union, preserving canonical form
    pub fn union(&self, other: &Effects) -> Effects {
        let mut out = self.clone();
        for e in &other.effects {
            if !out.effects.contains(e) {
                out.effects.push(e.clone());
            }
        }
        out
    }

    /// Row difference
    pub fn difference(&self, other: &Effects) -> Effects {
        Effects {
            effects: self
                .effects
                .iter()
                .filter(|e| !other.effects.contains(e))
                .cloned()
                .collect(),
        }
    }

    pub fn filter(&self, pred: impl Fn(&Effect) -> bool) -> Effects {
        Effects { effects: self.effects.iter().filter(|e| pred(e)).cloned().collect() }
    }

    /// Split into (builtin, user-defined)
    pub fn partition_builtin(&self, symbols: &Symbols) -> (Effects, Effects) {
        let (builtin, user): (Vec<_>, Vec<_>) =
            self.effects.iter().cloned().partition(|e| e.is_builtin(symbols));
        (Effects { effects: builtin }, Effects { effects: user })
    }

    pub fn user_defined(&self, symbols: &Symbols) -> Effects {
        self.partition_builtin(symbols).1
    }

    /// Dealias the type arguments of every member
    pub fn dealias(&self, symbols: &Symbols) -> Effects {
        Effects { effects: self.effects.iter().map(|e| e.dealias_args(symbols)).collect() }
    }

    pub fn substitute(&self, subst: &HashMap<SymbolId, ValueType>) -> Effects {
        Effects { effects: self.effects.iter().map(|e| e.substitute(subst)).collect() }
    }

    pub fn display<'a>(&'a self, symbols: &'a Symbols) -> DisplayEffects<'a> {
        DisplayEffects { effects: self, symbols }
    }
}

/// Equality is mutual inclusion; rows are unordered.
impl PartialEq for Effects {
    fn eq(&self, other: &Self) -> bool {
        self.effects.iter().all(|e| other.effects.contains(e))
            && other.effects.iter().all(|e| self.effects.contains(e))
    }
}

impl Eq for Effects {}

pub struct DisplayEffects<'a> {
    effects: &'a Effects,
    symbols: &'a Symbols,
}

impl fmt::Display for DisplayEffects<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, e) in self.effects.effects.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", e.display(self.symbols))?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolKind;
    use mica_syntax::Name;

    fn effect(syms: &mut Symbols, name: &str) -> SymbolId {
        syms.insert(
            Name::from(name),
            SymbolKind::Type(TypeSymbol::Effect { operations: vec![], builtin: false }),
        )
    }

    #[test]
    fn test_rows_drop_duplicates() {
        let mut syms = Symbols::new();
        let exc = effect(&mut syms, "Exc");
        let row = Effects::of([Effect::Named(exc), Effect::Named(exc)], &syms);
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn test_equality_is_mutual_inclusion() {
        let mut syms = Symbols::new();
        let a = effect(&mut syms, "A");
        let b = effect(&mut syms, "B");
        let ab = Effects::of([Effect::Named(a), Effect::Named(b)], &syms);
        let ba = Effects::of([Effect::Named(b), Effect::Named(a)], &syms);
        assert_eq!(ab, ba);
        assert_ne!(ab, Effects::of([Effect::Named(a)], &syms));
    }

    #[test]
    fn test_aliases_expand_at_construction() {
        let mut syms = Symbols::new();
        let a = effect(&mut syms, "A");
        let b = effect(&mut syms, "B");
        let body = Effects::of([Effect::Named(a), Effect::Named(b)], &syms);
        let alias = syms.insert(
            Name::from("Both"),
            SymbolKind::Type(TypeSymbol::EffectAlias { params: vec![], effects: body.clone() }),
        );

        let row = Effects::of([Effect::Named(alias)], &syms);
        assert_eq!(row, body);
        assert!(row.contains(&Effect::Named(alias), &syms));
        assert!(row.contains(&Effect::Named(a), &syms));
    }

    #[test]
    fn test_equality_laws() {
        let mut syms = Symbols::new();
        let a = effect(&mut syms, "A");
        let b = effect(&mut syms, "B");
        let alias = syms.insert(
            Name::from("JustA"),
            SymbolKind::Type(TypeSymbol::EffectAlias {
                params: vec![],
                effects: Effects::of([Effect::Named(a)], &syms),
            }),
        );

        let x = Effects::of([Effect::Named(alias), Effect::Named(b)], &syms);
        let y = Effects::of([Effect::Named(a), Effect::Named(b)], &syms);
        let z = Effects::of([Effect::Named(b), Effect::Named(a)], &syms);

        // Reflexive, symmetric, transitive, invariant under alias expansion
        assert_eq!(x, x);
        assert_eq!(x, y);
        assert_eq!(y, x);
        assert_eq!(y, z);
        assert_eq!(x, z);
    }

    #[test]
    fn test_union_difference_partition() {
        let mut syms = Symbols::new();
        let io = syms.insert(
            Name::from("IO"),
            SymbolKind::Type(TypeSymbol::Effect { operations: vec![], builtin: true }),
        );
        let exc = effect(&mut syms, "Exc");

        let row = Effects::of([Effect::Named(io), Effect::Named(exc)], &syms);
        let (builtin, user) = row.partition_builtin(&syms);
        assert_eq!(builtin, Effects::of([Effect::Named(io)], &syms));
        assert_eq!(user, Effects::of([Effect::Named(exc)], &syms));

        let diff = row.difference(&Effects::of([Effect::Named(io)], &syms));
        assert_eq!(diff, user);
        assert_eq!(user.union(&builtin), row);
    }
}
