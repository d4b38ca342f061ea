//! Mica surface syntax
//!
//! This crate provides spans and source files, interned identifier words,
//! hierarchical names, and the surface tree the frontend phases annotate
//! and the transformer lowers. Parsing itself lives outside the core; the
//! tree (de)serializes through serde so frontends can hand it over as data.

pub mod name;
pub mod span;
pub mod tree;
pub mod word;

pub use name::Name;
pub use span::{ByteOffset, FileId, HasSpan, Position, SourceFile, Span};
pub use tree::{
    BlockParamDef, Callee, CaptureTree, CtorDef, Definition, FieldDef, HandlerTree, IdDef, IdRef,
    Literal, MatchClause, ModuleTree, NodeId, OpClauseTree, OperationDef, ParamDef, Pattern,
    PatternKind, Stmt, Stmts, Term, TermKind, TypeTree, TypeTreeKind,
};
pub use word::{words, Word};
