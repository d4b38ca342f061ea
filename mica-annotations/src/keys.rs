//! Well-known annotations and universe-checked helpers

use crate::store::{Annotation, AnnotationStore};
use mica_syntax::NodeId;
use mica_types::{BlockType, CaptureSet, Effects, ModuleId, SymbolId, Symbols, ValueType};

/// The annotation table threaded between phases
pub mod anns {
    use super::*;

    /// Value type inferred for a term tree
    pub const INFERRED_VALUE_TYPE: Annotation<ValueType> =
        Annotation::new(1, "inferred value type");
    /// Block type inferred for a term tree
    pub const INFERRED_BLOCK_TYPE: Annotation<BlockType> =
        Annotation::new(2, "inferred block type");
    /// Capture set inferred for a term tree
    pub const INFERRED_CAPTURE: Annotation<CaptureSet> = Annotation::new(3, "inferred capture");
    /// Effect row inferred for a term tree
    pub const INFERRED_EFFECTS: Annotation<Effects> = Annotation::new(4, "inferred effects");

    /// The symbol a defining or referencing identifier resolved to
    pub const SYMBOL: Annotation<SymbolId> = Annotation::new(5, "symbol");
    /// The defining identifier node of a symbol
    pub const DEFINITION_TREE: Annotation<NodeId> = Annotation::new(6, "definition tree");
    /// The module a symbol was declared in
    pub const SOURCE_MODULE: Annotation<ModuleId> = Annotation::new(7, "source module");
    /// All referencing identifier nodes of a symbol
    pub const REFERENCES: Annotation<Vec<NodeId>> = Annotation::new(8, "references");

    /// The resolved meaning of a surface type node
    pub const RESOLVED_TYPE: Annotation<ValueType> = Annotation::new(9, "resolved type");
    /// The resolved meaning of a surface capture node
    pub const RESOLVED_CAPTURE: Annotation<CaptureSet> = Annotation::new(10, "resolved capture");

    /// Value type of a value symbol
    pub const VALUE_TYPE: Annotation<ValueType> = Annotation::new(11, "value type");
    /// Block type of a block symbol
    pub const BLOCK_TYPE: Annotation<BlockType> = Annotation::new(12, "block type");
    /// Capture of a block symbol
    pub const CAPTURE: Annotation<CaptureSet> = Annotation::new(13, "capture");

    /// From a record or data type symbol to its constructor term symbol
    pub const CONSTRUCTOR_OF: Annotation<SymbolId> = Annotation::new(14, "constructor of");
    /// From a constructor term symbol back to its type symbol
    pub const TYPE_OF_CONSTRUCTOR: Annotation<SymbolId> =
        Annotation::new(15, "type of constructor");

    /// Overload candidates of a reference the namer could not decide;
    /// the typer resolves them and writes `SYMBOL`
    pub const CANDIDATES: Annotation<Vec<SymbolId>> = Annotation::new(16, "overload candidates");
    /// The resolved meaning of a surface type node in block position
    pub const RESOLVED_BLOCK_TYPE: Annotation<BlockType> =
        Annotation::new(17, "resolved block type");
}

/// Record the value type of a value symbol. Writing a value type on a block
/// symbol, or onto a symbol that already carries a block type, is a
/// universe violation and therefore a compiler bug.
pub fn annotate_value_type(
    store: &mut impl AnnotationStore,
    symbols: &Symbols,
    sym: SymbolId,
    tpe: ValueType,
) {
    if symbols.is_block(sym) {
        panic!(
            "internal compiler error: value type annotated on block symbol {}",
            symbols.name(sym)
        );
    }
    if store.has(anns::BLOCK_TYPE, sym) {
        panic!(
            "internal compiler error: symbol {} already carries a block type",
            symbols.name(sym)
        );
    }
    store.annotate(anns::VALUE_TYPE, sym, tpe);
}

/// Record the block type of a block symbol, with the dual universe check
pub fn annotate_block_type(
    store: &mut impl AnnotationStore,
    symbols: &Symbols,
    sym: SymbolId,
    tpe: BlockType,
) {
    if symbols.is_value(sym) {
        panic!(
            "internal compiler error: block type annotated on value symbol {}",
            symbols.name(sym)
        );
    }
    if store.has(anns::VALUE_TYPE, sym) {
        panic!(
            "internal compiler error: symbol {} already carries a value type",
            symbols.name(sym)
        );
    }
    store.annotate(anns::BLOCK_TYPE, sym, tpe);
}

/// Append a referring identifier node to a symbol's reference list
pub fn add_reference(store: &mut impl AnnotationStore, sym: SymbolId, node: NodeId) {
    let mut refs = store.get(anns::REFERENCES, sym).cloned().unwrap_or_default();
    if !refs.contains(&node) {
        refs.push(node);
    }
    store.annotate(anns::REFERENCES, sym, refs);
}
