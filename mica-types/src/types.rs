//! Value and block types
//!
//! The type language mirrors the two symbol universes: value types classify
//! values, block types classify computations. Aliases are transparent:
//! equality always compares dealiased forms.

use crate::captures::CaptureSet;
use crate::effects::Effects;
use crate::symbol::{BuiltinType, SymbolId, Symbols, TypeSymbol};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Types of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueType {
    /// A type variable; rigidity lives on the symbol
    Var(SymbolId),
    /// Application of a data type, record, or alias to arguments.
    /// Zero-argument references use an empty argument list.
    App { constructor: SymbolId, args: Vec<ValueType> },
    /// A builtin atom
    Builtin(BuiltinType),
    /// A block boxed together with its capture, first-class as a value
    Boxed { block: Box<BlockType>, capture: CaptureSet },
    /// A first-class function allocated in a region
    Fun { block: Box<BlockType>, region: SymbolId },
}

impl ValueType {
    pub fn unit() -> Self {
        ValueType::Builtin(BuiltinType::Unit)
    }

    pub fn int() -> Self {
        ValueType::Builtin(BuiltinType::Int)
    }

    pub fn bool() -> Self {
        ValueType::Builtin(BuiltinType::Bool)
    }

    pub fn double() -> Self {
        ValueType::Builtin(BuiltinType::Double)
    }

    pub fn string() -> Self {
        ValueType::Builtin(BuiltinType::String)
    }

    pub fn reference(constructor: SymbolId) -> Self {
        ValueType::App { constructor, args: Vec::new() }
    }

    /// Expand aliases recursively. `App` of an alias substitutes the
    /// arguments into the alias body and dealiases the result; every other
    /// constructor dealiases its children.
    pub fn dealias(&self, symbols: &Symbols) -> ValueType {
        match self {
            ValueType::App { constructor, args } => {
                let args: Vec<_> = args.iter().map(|a| a.dealias(symbols)).collect();
                if let Some(TypeSymbol::Alias { params, body }) = symbols.as_type(*constructor) {
                    let subst: HashMap<SymbolId, ValueType> =
                        params.iter().copied().zip(args.iter().cloned()).collect();
                    body.substitute(&subst).dealias(symbols)
                } else {
                    ValueType::App { constructor: *constructor, args }
                }
            }
            ValueType::Boxed { block, capture } => ValueType::Boxed {
                block: Box::new(block.dealias(symbols)),
                capture: capture.clone(),
            },
            ValueType::Fun { block, region } => ValueType::Fun {
                block: Box::new(block.dealias(symbols)),
                region: *region,
            },
            other => other.clone(),
        }
    }

    /// Replace type variables according to `subst`
    pub fn substitute(&self, subst: &HashMap<SymbolId, ValueType>) -> ValueType {
        match self {
            ValueType::Var(v) => subst.get(v).cloned().unwrap_or_else(|| self.clone()),
            ValueType::App { constructor, args } => ValueType::App {
                constructor: *constructor,
                args: args.iter().map(|a| a.substitute(subst)).collect(),
            },
            ValueType::Boxed { block, capture } => ValueType::Boxed {
                block: Box::new(block.substitute(subst)),
                capture: capture.clone(),
            },
            ValueType::Fun { block, region } => ValueType::Fun {
                block: Box::new(block.substitute(subst)),
                region: *region,
            },
            other => other.clone(),
        }
    }

    /// Equality modulo alias expansion
    pub fn equals(&self, other: &ValueType, symbols: &Symbols) -> bool {
        self.dealias(symbols) == other.dealias(symbols)
    }
}

/// One group of parameters of a function block type. Groups keep value and
/// block parameters apart while preserving their surface order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamSection {
    Values(Vec<ValueType>),
    Blocks(Vec<BlockType>),
}

/// Types of blocks (computations)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockType {
    Interface { interface: SymbolId, targs: Vec<ValueType> },
    Capability { effect: crate::effects::Effect },
    Module { ops: Vec<SymbolId> },
    Function {
        tparams: Vec<SymbolId>,
        sections: Vec<ParamSection>,
        ret: ValueType,
        effects: Effects,
    },
}

impl BlockType {
    /// A function over value parameters only
    pub fn function(vparams: Vec<ValueType>, ret: ValueType, effects: Effects) -> Self {
        BlockType::Function {
            tparams: Vec::new(),
            sections: vec![ParamSection::Values(vparams)],
            ret,
            effects,
        }
    }

    pub fn dealias(&self, symbols: &Symbols) -> BlockType {
        match self {
            BlockType::Interface { interface, targs } => BlockType::Interface {
                interface: *interface,
                targs: targs.iter().map(|t| t.dealias(symbols)).collect(),
            },
            BlockType::Capability { effect } => {
                BlockType::Capability { effect: effect.clone() }
            }
            BlockType::Module { ops } => BlockType::Module { ops: ops.clone() },
            BlockType::Function { tparams, sections, ret, effects } => BlockType::Function {
                tparams: tparams.clone(),
                sections: sections
                    .iter()
                    .map(|s| match s {
                        ParamSection::Values(ts) => {
                            ParamSection::Values(ts.iter().map(|t| t.dealias(symbols)).collect())
                        }
                        ParamSection::Blocks(ts) => {
                            ParamSection::Blocks(ts.iter().map(|t| t.dealias(symbols)).collect())
                        }
                    })
                    .collect(),
                ret: ret.dealias(symbols),
                effects: effects.dealias(symbols),
            },
        }
    }

    pub fn substitute(&self, subst: &HashMap<SymbolId, ValueType>) -> BlockType {
        match self {
            BlockType::Interface { interface, targs } => BlockType::Interface {
                interface: *interface,
                targs: targs.iter().map(|t| t.substitute(subst)).collect(),
            },
            BlockType::Capability { effect } => {
                BlockType::Capability { effect: effect.substitute(subst) }
            }
            BlockType::Module { ops } => BlockType::Module { ops: ops.clone() },
            BlockType::Function { tparams, sections, ret, effects } => {
                // Bound type parameters shadow the substitution
                let mut subst = subst.clone();
                for p in tparams {
                    subst.remove(p);
                }
                BlockType::Function {
                    tparams: tparams.clone(),
                    sections: sections
                        .iter()
                        .map(|s| match s {
                            ParamSection::Values(ts) => ParamSection::Values(
                                ts.iter().map(|t| t.substitute(&subst)).collect(),
                            ),
                            ParamSection::Blocks(ts) => ParamSection::Blocks(
                                ts.iter().map(|t| t.substitute(&subst)).collect(),
                            ),
                        })
                        .collect(),
                    ret: ret.substitute(&subst),
                    effects: effects.substitute(&subst),
                }
            }
        }
    }

    pub fn equals(&self, other: &BlockType, symbols: &Symbols) -> bool {
        self.dealias(symbols) == other.dealias(symbols)
    }

    /// All value parameter types, flattened across sections
    pub fn value_params(&self) -> Vec<&ValueType> {
        match self {
            BlockType::Function { sections, .. } => sections
                .iter()
                .filter_map(|s| match s {
                    ParamSection::Values(ts) => Some(ts.iter()),
                    ParamSection::Blocks(_) => None,
                })
                .flatten()
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Rendering used by diagnostics and hover
pub struct DisplayType<'a, T> {
    pub ty: &'a T,
    pub symbols: &'a Symbols,
}

impl fmt::Display for DisplayType<'_, ValueType> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            ValueType::Var(v) => write!(f, "{}", self.symbols.name(*v)),
            ValueType::Builtin(b) => write!(f, "{}", b.name()),
            ValueType::App { constructor, args } => {
                write!(f, "{}", self.symbols.name(*constructor))?;
                if !args.is_empty() {
                    write!(f, "[")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", DisplayType { ty: a, symbols: self.symbols })?;
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
            ValueType::Boxed { block, capture } => {
                write!(
                    f,
                    "{} at {}",
                    DisplayType { ty: block.as_ref(), symbols: self.symbols },
                    capture
                )
            }
            ValueType::Fun { block, region } => {
                write!(
                    f,
                    "{} in {}",
                    DisplayType { ty: block.as_ref(), symbols: self.symbols },
                    self.symbols.name(*region)
                )
            }
        }
    }
}

impl fmt::Display for DisplayType<'_, BlockType> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            BlockType::Interface { interface, targs } => {
                write!(f, "{}", self.symbols.name(*interface))?;
                if !targs.is_empty() {
                    write!(f, "[")?;
                    for (i, a) in targs.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", DisplayType { ty: a, symbols: self.symbols })?;
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
            BlockType::Capability { effect } => {
                write!(f, "capability {}", effect.display(self.symbols))
            }
            BlockType::Module { ops } => write!(f, "module with {} operations", ops.len()),
            BlockType::Function { tparams, sections, ret, effects } => {
                if !tparams.is_empty() {
                    write!(f, "[")?;
                    for (i, p) in tparams.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", self.symbols.name(*p))?;
                    }
                    write!(f, "]")?;
                }
                for section in sections {
                    write!(f, "(")?;
                    match section {
                        ParamSection::Values(ts) => {
                            for (i, t) in ts.iter().enumerate() {
                                if i > 0 {
                                    write!(f, ", ")?;
                                }
                                write!(f, "{}", DisplayType { ty: t, symbols: self.symbols })?;
                            }
                        }
                        ParamSection::Blocks(ts) => {
                            for (i, t) in ts.iter().enumerate() {
                                if i > 0 {
                                    write!(f, ", ")?;
                                }
                                write!(f, "{}", DisplayType { ty: t, symbols: self.symbols })?;
                            }
                        }
                    }
                    write!(f, ")")?;
                }
                write!(f, " => {}", DisplayType { ty: ret, symbols: self.symbols })?;
                write!(f, " / {}", effects.display(self.symbols))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolKind;
    use mica_syntax::Name;

    #[test]
    fn test_dealias_simple_alias() {
        let mut syms = Symbols::new();
        let alias = syms.insert(
            Name::from("MyInt"),
            SymbolKind::Type(TypeSymbol::Alias { params: vec![], body: ValueType::int() }),
        );
        let t = ValueType::reference(alias);
        assert_eq!(t.dealias(&syms), ValueType::int());
        assert!(t.equals(&ValueType::int(), &syms));
    }

    #[test]
    fn test_dealias_parameterized_alias() {
        let mut syms = Symbols::new();
        let param = syms.fresh_type_var(false);
        let pair = syms.insert(
            Name::from("Pair"),
            SymbolKind::Type(TypeSymbol::Data { constructors: vec![] }),
        );
        // type Same[A] = Pair[A, A]
        let alias = syms.insert(
            Name::from("Same"),
            SymbolKind::Type(TypeSymbol::Alias {
                params: vec![param],
                body: ValueType::App {
                    constructor: pair,
                    args: vec![ValueType::Var(param), ValueType::Var(param)],
                },
            }),
        );
        let t = ValueType::App { constructor: alias, args: vec![ValueType::int()] };
        assert_eq!(
            t.dealias(&syms),
            ValueType::App { constructor: pair, args: vec![ValueType::int(), ValueType::int()] }
        );
    }

    #[test]
    fn test_nested_alias_expansion() {
        let mut syms = Symbols::new();
        let inner = syms.insert(
            Name::from("A"),
            SymbolKind::Type(TypeSymbol::Alias { params: vec![], body: ValueType::bool() }),
        );
        let outer = syms.insert(
            Name::from("B"),
            SymbolKind::Type(TypeSymbol::Alias {
                params: vec![],
                body: ValueType::reference(inner),
            }),
        );
        assert_eq!(ValueType::reference(outer).dealias(&syms), ValueType::bool());
    }

    #[test]
    fn test_function_type_equality_modulo_aliases() {
        let mut syms = Symbols::new();
        let alias = syms.insert(
            Name::from("N"),
            SymbolKind::Type(TypeSymbol::Alias { params: vec![], body: ValueType::int() }),
        );
        let through_alias = BlockType::function(
            vec![ValueType::reference(alias)],
            ValueType::reference(alias),
            Effects::empty(),
        );
        let direct =
            BlockType::function(vec![ValueType::int()], ValueType::int(), Effects::empty());
        assert!(through_alias.equals(&direct, &syms));
    }
}
