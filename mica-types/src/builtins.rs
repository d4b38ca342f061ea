//! Compiler-provided symbols
//!
//! The prelude module carries the builtin type atoms, the IO effect and its
//! ambient capability, the distinguished control capability, and the cell
//! interface that mutable variables lower onto.

use crate::captures::CaptureRole;
use crate::modules::{ModuleGraph, ModuleId};
use crate::symbol::{
    BlockSymbol, BuiltinType, SymbolId, SymbolKind, Symbols, TermSymbol, TypeSymbol,
};
use mica_syntax::{words, Name};

/// Handles to everything the compiler itself needs to reference
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub prelude: ModuleId,
    pub unit: SymbolId,
    pub bool_: SymbolId,
    pub int: SymbolId,
    pub double: SymbolId,
    pub string: SymbolId,
    /// The builtin IO effect
    pub io_effect: SymbolId,
    /// The ambient IO capability
    pub io: SymbolId,
    /// The delimited-control capability
    pub control: SymbolId,
    /// The cell interface backing mutable variables
    pub cell: SymbolId,
    pub cell_get: SymbolId,
    pub cell_put: SymbolId,
}

impl Builtins {
    /// Install the prelude into fresh symbol and module tables
    pub fn install(symbols: &mut Symbols, modules: &mut ModuleGraph) -> Builtins {
        let prelude = modules.add_source(Name::Word(words::PRELUDE()));

        let mut atom = |symbols: &mut Symbols, modules: &mut ModuleGraph, b: BuiltinType| {
            let name = Name::from(b.name());
            let sym = symbols.insert(name, SymbolKind::Type(TypeSymbol::Builtin(b)));
            modules.define_type(prelude, b.name().into(), sym);
            sym
        };

        let unit = atom(symbols, modules, BuiltinType::Unit);
        let bool_ = atom(symbols, modules, BuiltinType::Bool);
        let int = atom(symbols, modules, BuiltinType::Int);
        let double = atom(symbols, modules, BuiltinType::Double);
        let string = atom(symbols, modules, BuiltinType::String);

        let io_effect = symbols.insert(
            Name::from("IO"),
            SymbolKind::Type(TypeSymbol::Effect { operations: vec![], builtin: true }),
        );
        modules.define_type(prelude, "IO".into(), io_effect);

        let io = symbols.insert(
            Name::Word(words::IO()),
            SymbolKind::Term(TermSymbol::Block(BlockSymbol::Capability {
                effect: Some(io_effect),
                role: CaptureRole::Io,
            })),
        );
        modules.define_term(prelude, words::IO(), io);

        let control = symbols.insert(
            Name::Word(words::CONTROL()),
            SymbolKind::Term(TermSymbol::Block(BlockSymbol::Capability {
                effect: None,
                role: CaptureRole::Control,
            })),
        );

        let cell = symbols.insert(
            Name::Word(words::CELL()),
            SymbolKind::Type(TypeSymbol::Interface { operations: vec![] }),
        );
        modules.define_type(prelude, words::CELL(), cell);
        let cell_get = symbols.insert(
            Name::Word(words::GET()),
            SymbolKind::Term(TermSymbol::Block(BlockSymbol::Method { owner: cell })),
        );
        let cell_put = symbols.insert(
            Name::Word(words::PUT()),
            SymbolKind::Term(TermSymbol::Block(BlockSymbol::Method { owner: cell })),
        );
        symbols.set_operations(cell, vec![cell_get, cell_put]);

        Builtins {
            prelude,
            unit,
            bool_,
            int,
            double,
            string,
            io_effect,
            io,
            control,
            cell,
            cell_get,
            cell_put,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_installation() {
        let mut symbols = Symbols::new();
        let mut modules = ModuleGraph::new();
        let builtins = Builtins::install(&mut symbols, &mut modules);

        assert_eq!(modules.typ(builtins.prelude, "Int".into()), Some(builtins.int));
        assert!(symbols.is_block(builtins.io));
        assert!(symbols.is_type(builtins.cell));
        assert_eq!(
            symbols.operations_of(builtins.cell),
            &[builtins.cell_get, builtins.cell_put]
        );
    }
}
