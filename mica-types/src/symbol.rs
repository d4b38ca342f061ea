//! The symbol model
//!
//! Every named entity has an identity distinct from its name. Symbols split
//! disjointly into the type universe and the term universe; term symbols
//! further split into value symbols and block symbols. The split is an
//! invariant the annotation helpers enforce: no symbol ever carries both a
//! value type and a block type.

use crate::captures::CaptureRole;
use crate::effects::Effects;
use crate::modules::ModuleId;
use crate::types::ValueType;
use mica_syntax::{Name, Word};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Builtin value type atoms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinType {
    Unit,
    Bool,
    Int,
    Double,
    String,
}

impl BuiltinType {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinType::Unit => "Unit",
            BuiltinType::Bool => "Bool",
            BuiltinType::Int => "Int",
            BuiltinType::Double => "Double",
            BuiltinType::String => "String",
        }
    }
}

/// Type-universe symbols
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeSymbol {
    /// A builtin atom registered in the prelude
    Builtin(BuiltinType),
    /// An inference or quantified type variable
    TypeVar { rigid: bool },
    /// A type alias with parameters and a body to substitute into
    Alias { params: Vec<SymbolId>, body: ValueType },
    /// A data type; constructors in declaration order
    Data { constructors: Vec<SymbolId> },
    /// A record type; the constructor facet and fields are term symbols
    /// cross-linked by id, never owned
    Record { constructor: SymbolId, fields: Vec<SymbolId> },
    /// A user effect; operations in declaration order
    Effect { operations: Vec<SymbolId>, builtin: bool },
    /// An effect alias expanding to a row
    EffectAlias { params: Vec<SymbolId>, effects: Effects },
    /// An interface; operations in declaration order
    Interface { operations: Vec<SymbolId> },
}

/// Value-universe term symbols
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueSymbol {
    Param,
    ValBinder,
    /// A mutable binder; the cell lives in `region` when one was named
    VarBinder { region: Option<SymbolId> },
    Temporary,
    Wildcard,
}

/// Block-universe term symbols
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockSymbol {
    Function,
    /// A function whose body lives in the target language; the declared
    /// capture decides pure vs direct-style lowering
    ExternFunction,
    BlockParam,
    /// A capability introduced by a handler, region, or the environment.
    /// Its role decides how it counts in capture sets.
    Capability { effect: Option<SymbolId>, role: CaptureRole },
    ResumeParam,
    /// An effect or interface operation; `owner` is the declaring type symbol
    Method { owner: SymbolId },
    /// The constructor facet of a data type or record; arity is the number
    /// of fields it packs
    Constructor { datatype: SymbolId, arity: usize },
    /// A record field accessor; the owning record is a back-reference by id
    Field { owner: SymbolId },
    Module { module: ModuleId },
    /// A synthetic jump target (loop headers, match join points)
    CallTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TermSymbol {
    Value(ValueSymbol),
    Block(BlockSymbol),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SymbolKind {
    Type(TypeSymbol),
    Term(TermSymbol),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub id: SymbolId,
    pub name: Name,
    pub kind: SymbolKind,
}

/// Arena of all symbols of a compilation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Symbols {
    infos: Vec<SymbolInfo>,
    fresh_counter: u32,
}

impl Symbols {
    pub fn new() -> Self {
        Symbols::default()
    }

    pub fn insert(&mut self, name: Name, kind: SymbolKind) -> SymbolId {
        let id = SymbolId(self.infos.len() as u32);
        self.infos.push(SymbolInfo { id, name, kind });
        id
    }

    pub fn get(&self, id: SymbolId) -> &SymbolInfo {
        &self.infos[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut SymbolInfo {
        &mut self.infos[id.0 as usize]
    }

    pub fn name(&self, id: SymbolId) -> &Name {
        &self.get(id).name
    }

    pub fn kind(&self, id: SymbolId) -> &SymbolKind {
        &self.get(id).kind
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolInfo> {
        self.infos.iter()
    }

    // -- universe predicates ------------------------------------------------

    pub fn is_type(&self, id: SymbolId) -> bool {
        matches!(self.kind(id), SymbolKind::Type(_))
    }

    pub fn is_term(&self, id: SymbolId) -> bool {
        matches!(self.kind(id), SymbolKind::Term(_))
    }

    pub fn is_value(&self, id: SymbolId) -> bool {
        matches!(self.kind(id), SymbolKind::Term(TermSymbol::Value(_)))
    }

    pub fn is_block(&self, id: SymbolId) -> bool {
        matches!(self.kind(id), SymbolKind::Term(TermSymbol::Block(_)))
    }

    pub fn as_type(&self, id: SymbolId) -> Option<&TypeSymbol> {
        match self.kind(id) {
            SymbolKind::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_block(&self, id: SymbolId) -> Option<&BlockSymbol> {
        match self.kind(id) {
            SymbolKind::Term(TermSymbol::Block(b)) => Some(b),
            _ => None,
        }
    }

    // -- synthetic symbols --------------------------------------------------

    fn fresh_name(&mut self, hint: &str) -> Name {
        self.fresh_counter += 1;
        Name::Word(Word::intern(&format!("{}{}", hint, self.fresh_counter)))
    }

    /// A fresh value temporary, used by binding reification
    pub fn fresh_value(&mut self, hint: &str) -> SymbolId {
        let name = self.fresh_name(hint);
        self.insert(name, SymbolKind::Term(TermSymbol::Value(ValueSymbol::Temporary)))
    }

    /// A fresh wildcard binder
    pub fn fresh_wildcard(&mut self) -> SymbolId {
        let name = self.fresh_name("_");
        self.insert(name, SymbolKind::Term(TermSymbol::Value(ValueSymbol::Wildcard)))
    }

    /// A fresh jump target (loop header or match join point)
    pub fn fresh_call_target(&mut self, hint: &str) -> SymbolId {
        let name = self.fresh_name(hint);
        self.insert(name, SymbolKind::Term(TermSymbol::Block(BlockSymbol::CallTarget)))
    }

    /// A fresh continuation parameter
    pub fn fresh_resume(&mut self) -> SymbolId {
        let name = Name::Word(mica_syntax::words::RESUME());
        self.insert(name, SymbolKind::Term(TermSymbol::Block(BlockSymbol::ResumeParam)))
    }

    /// A fresh type variable
    pub fn fresh_type_var(&mut self, rigid: bool) -> SymbolId {
        let name = self.fresh_name(if rigid { "R" } else { "T" });
        self.insert(name, SymbolKind::Type(TypeSymbol::TypeVar { rigid }))
    }

    // -- declaration wiring -------------------------------------------------

    /// Wire a data type to its constructor symbols, preserving declaration
    /// order. Called by the namer once all constructor symbols exist.
    pub fn set_data_constructors(&mut self, data: SymbolId, ctors: Vec<SymbolId>) {
        match &mut self.get_mut(data).kind {
            SymbolKind::Type(TypeSymbol::Data { constructors }) => *constructors = ctors,
            other => panic!(
                "internal compiler error: cannot attach constructors to {:?}",
                other
            ),
        }
    }

    /// Wire an effect or interface to its operation symbols
    pub fn set_operations(&mut self, owner: SymbolId, ops: Vec<SymbolId>) {
        match &mut self.get_mut(owner).kind {
            SymbolKind::Type(TypeSymbol::Effect { operations, .. })
            | SymbolKind::Type(TypeSymbol::Interface { operations }) => *operations = ops,
            other => panic!(
                "internal compiler error: cannot attach operations to {:?}",
                other
            ),
        }
    }

    /// Wire a record to its constructor facet and field accessors
    pub fn set_record_parts(&mut self, rec: SymbolId, ctor: SymbolId, fields: Vec<SymbolId>) {
        match &mut self.get_mut(rec).kind {
            SymbolKind::Type(TypeSymbol::Record { constructor, fields: fs }) => {
                *constructor = ctor;
                *fs = fields;
            }
            other => panic!(
                "internal compiler error: cannot attach a constructor to {:?}",
                other
            ),
        }
    }

    /// Fill in the body of a type alias once it has been resolved
    pub fn set_alias_body(&mut self, alias: SymbolId, body: ValueType) {
        match &mut self.get_mut(alias).kind {
            SymbolKind::Type(TypeSymbol::Alias { body: b, .. }) => *b = body,
            other => panic!("internal compiler error: not a type alias: {:?}", other),
        }
    }

    /// Fill in the parameters of a type alias
    pub fn set_alias_params(&mut self, alias: SymbolId, params: Vec<SymbolId>) {
        match &mut self.get_mut(alias).kind {
            SymbolKind::Type(TypeSymbol::Alias { params: p, .. }) => *p = params,
            other => panic!("internal compiler error: not a type alias: {:?}", other),
        }
    }

    /// Fill in the row of an effect alias once it has been resolved
    pub fn set_effect_alias_row(&mut self, alias: SymbolId, effects: Effects) {
        match &mut self.get_mut(alias).kind {
            SymbolKind::Type(TypeSymbol::EffectAlias { effects: e, .. }) => *e = effects,
            other => panic!("internal compiler error: not an effect alias: {:?}", other),
        }
    }

    /// The constructors of a data type, in declaration order
    pub fn constructors_of(&self, data: SymbolId) -> &[SymbolId] {
        match self.kind(data) {
            SymbolKind::Type(TypeSymbol::Data { constructors }) => constructors,
            _ => &[],
        }
    }

    /// The operations of an effect or interface, in declaration order
    pub fn operations_of(&self, owner: SymbolId) -> &[SymbolId] {
        match self.kind(owner) {
            SymbolKind::Type(TypeSymbol::Effect { operations, .. })
            | SymbolKind::Type(TypeSymbol::Interface { operations }) => operations,
            _ => &[],
        }
    }
}
