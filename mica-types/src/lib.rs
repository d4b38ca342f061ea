//! Mica types and symbols
//!
//! The two-universe symbol model, value and block types with transparent
//! aliases, alias-free effect rows, identity-compared capture sets, the
//! module graph, and the compiler-provided prelude symbols.

pub mod builtins;
pub mod captures;
pub mod effects;
pub mod modules;
pub mod symbol;
pub mod types;

pub use builtins::Builtins;
pub use captures::{Capture, CaptureRole, CaptureSet};
pub use effects::{Effect, Effects};
pub use modules::{ModuleData, ModuleGraph, ModuleId, ModuleKind};
pub use symbol::{
    BlockSymbol, BuiltinType, SymbolId, SymbolInfo, SymbolKind, Symbols, TermSymbol, TypeSymbol,
    ValueSymbol,
};
pub use types::{BlockType, DisplayType, ParamSection, ValueType};
