//! Surface tree definitions
//!
//! The tree produced by the parser and consumed by the frontend phases.
//! Every node owns a `NodeId`: annotation facts are keyed by this identity,
//! never by structure, so two syntactically equal subtrees at different
//! positions stay distinguishable.

use crate::name::Name;
use crate::span::{HasSpan, Span};
use crate::word::Word;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a surface tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    /// Allocate a fresh node identity. The parser calls this once per node;
    /// synthesized trees call it too so identities never collide.
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A defining occurrence of an identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdDef {
    pub id: NodeId,
    pub span: Span,
    pub name: Name,
}

impl IdDef {
    pub fn new(name: impl Into<Name>) -> Self {
        IdDef { id: NodeId::fresh(), span: Span::synthetic(), name: name.into() }
    }

    pub fn with_span(name: impl Into<Name>, span: Span) -> Self {
        IdDef { id: NodeId::fresh(), span, name: name.into() }
    }
}

/// A referencing occurrence of an identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: NodeId,
    pub span: Span,
    pub name: Name,
}

impl IdRef {
    pub fn new(name: impl Into<Name>) -> Self {
        IdRef { id: NodeId::fresh(), span: Span::synthetic(), name: name.into() }
    }

    pub fn with_span(name: impl Into<Name>, span: Span) -> Self {
        IdRef { id: NodeId::fresh(), span, name: name.into() }
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Unit,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

/// Surface type expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeTree {
    pub id: NodeId,
    pub span: Span,
    pub kind: TypeTreeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeTreeKind {
    /// A named type (`Int`, `Option`, a type variable, an alias)
    Ref(IdRef),
    /// A type application (`Option[Int]`)
    App(IdRef, Vec<TypeTree>),
    /// A block (computation) type `(Int) => String / {Exc}`
    Fun {
        vparams: Vec<TypeTree>,
        bparams: Vec<TypeTree>,
        ret: Box<TypeTree>,
        effects: Vec<IdRef>,
    },
    /// A boxed block type `(Int) => String at {io}`
    Boxed { block: Box<TypeTree>, capture: CaptureTree },
}

impl TypeTree {
    pub fn reference(name: impl Into<Name>) -> Self {
        TypeTree {
            id: NodeId::fresh(),
            span: Span::synthetic(),
            kind: TypeTreeKind::Ref(IdRef::new(name)),
        }
    }
}

/// Surface capture set annotation (`{io, pool}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureTree {
    pub id: NodeId,
    pub span: Span,
    pub refs: Vec<IdRef>,
}

impl CaptureTree {
    pub fn empty() -> Self {
        CaptureTree { id: NodeId::fresh(), span: Span::synthetic(), refs: Vec::new() }
    }
}

/// A sequence of statements forming a block body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmts {
    pub id: NodeId,
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

impl Stmts {
    pub fn of(stmts: Vec<Stmt>) -> Self {
        Stmts { id: NodeId::fresh(), span: Span::synthetic(), stmts }
    }

    /// A body that just evaluates one expression
    pub fn expr(term: Term) -> Self {
        Stmts::of(vec![Stmt::Expr(term)])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// A local definition in statement position
    Def(Definition),
    /// An expression evaluated for its value (the last one is the result)
    Expr(Term),
    /// An explicit early return
    Return(Term),
}

/// What a call syntactically targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Callee {
    /// A named function, constructor, extern or first-class value
    Id(IdRef),
    /// A method selected on a receiver
    Method { receiver: Box<Term>, method: IdRef },
    /// An arbitrary expression in call position (an unboxed closure)
    Expr(Box<Term>),
}

/// Terms (expressions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub id: NodeId,
    pub span: Span,
    pub kind: TermKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TermKind {
    Var(IdRef),
    Literal(Literal),
    Call {
        callee: Callee,
        targs: Vec<TypeTree>,
        vargs: Vec<Term>,
        bargs: Vec<Term>,
    },
    If {
        cond: Box<Term>,
        thn: Stmts,
        els: Stmts,
    },
    While {
        cond: Box<Term>,
        body: Stmts,
    },
    Match {
        scrutinee: Box<Term>,
        clauses: Vec<MatchClause>,
    },
    TryHandle {
        body: Stmts,
        handlers: Vec<HandlerTree>,
    },
    Region {
        binder: IdDef,
        body: Stmts,
    },
    /// An unresolved effect operation call; capability passing must have
    /// replaced these before lowering
    Do {
        effect: Option<IdRef>,
        op: IdRef,
        vargs: Vec<Term>,
    },
    Assign {
        target: IdRef,
        value: Box<Term>,
    },
    /// An anonymous block literal `{ (x) => ... }`
    BlockLiteral {
        vparams: Vec<ParamDef>,
        bparams: Vec<BlockParamDef>,
        body: Stmts,
    },
    /// Box a block into a first-class value
    Box { body: Box<Term> },
    /// Unbox a first-class value back into a block
    Unbox { body: Box<Term> },
    Hole,
}

impl Term {
    pub fn new(kind: TermKind) -> Self {
        Term { id: NodeId::fresh(), span: Span::synthetic(), kind }
    }

    pub fn var(name: impl Into<Name>) -> Self {
        Term::new(TermKind::Var(IdRef::new(name)))
    }

    pub fn literal(lit: Literal) -> Self {
        Term::new(TermKind::Literal(lit))
    }

    pub fn int(v: i64) -> Self {
        Term::literal(Literal::Int(v))
    }

    pub fn unit() -> Self {
        Term::literal(Literal::Unit)
    }

    pub fn call(callee: impl Into<Name>, vargs: Vec<Term>) -> Self {
        Term::new(TermKind::Call {
            callee: Callee::Id(IdRef::new(callee)),
            targs: Vec::new(),
            vargs,
            bargs: Vec::new(),
        })
    }
}

/// One `case pattern => body` clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchClause {
    pub id: NodeId,
    pub span: Span,
    pub pattern: Pattern,
    pub body: Stmts,
}

impl MatchClause {
    pub fn new(pattern: Pattern, body: Stmts) -> Self {
        MatchClause { id: NodeId::fresh(), span: Span::synthetic(), pattern, body }
    }
}

/// Patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: NodeId,
    pub span: Span,
    pub kind: PatternKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternKind {
    /// Wildcard `_`
    Any,
    /// A binding identifier
    Ident(IdDef),
    /// A constructor pattern with sub-patterns
    Tag { ctor: IdRef, patterns: Vec<Pattern> },
    /// A literal pattern; the typer rewrites these into guards before
    /// lowering, so the match compiler never sees one
    Literal(Literal),
}

impl Pattern {
    pub fn any() -> Self {
        Pattern { id: NodeId::fresh(), span: Span::synthetic(), kind: PatternKind::Any }
    }

    pub fn ident(name: impl Into<Name>) -> Self {
        Pattern {
            id: NodeId::fresh(),
            span: Span::synthetic(),
            kind: PatternKind::Ident(IdDef::new(name)),
        }
    }

    pub fn tag(ctor: impl Into<Name>, patterns: Vec<Pattern>) -> Self {
        Pattern {
            id: NodeId::fresh(),
            span: Span::synthetic(),
            kind: PatternKind::Tag { ctor: IdRef::new(ctor), patterns },
        }
    }
}

/// One `with Effect { def op(...) ... }` handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerTree {
    pub id: NodeId,
    pub span: Span,
    /// The effect or interface being handled
    pub effect: IdRef,
    /// An explicit capability binder, when the source names one
    pub capability: Option<IdDef>,
    pub clauses: Vec<OpClauseTree>,
}

/// One operation clause inside a handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpClauseTree {
    pub id: NodeId,
    pub span: Span,
    pub op: IdRef,
    pub vparams: Vec<ParamDef>,
    /// The continuation binder (`resume`)
    pub resume: IdDef,
    pub body: Stmts,
}

/// A value parameter with an optional declared type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub binder: IdDef,
    pub tpe: Option<TypeTree>,
}

impl ParamDef {
    pub fn untyped(name: impl Into<Name>) -> Self {
        ParamDef { binder: IdDef::new(name), tpe: None }
    }

    pub fn typed(name: impl Into<Name>, tpe: TypeTree) -> Self {
        ParamDef { binder: IdDef::new(name), tpe: Some(tpe) }
    }
}

/// A block parameter with its declared block type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockParamDef {
    pub binder: IdDef,
    pub tpe: TypeTree,
}

/// Definitions, both top-level and in statement position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Definition {
    Val {
        id: NodeId,
        span: Span,
        binder: IdDef,
        binding: Term,
    },
    Var {
        id: NodeId,
        span: Span,
        binder: IdDef,
        /// The region the cell is allocated into, when the source names one
        region: Option<IdRef>,
        init: Term,
    },
    Fun {
        id: NodeId,
        span: Span,
        binder: IdDef,
        tparams: Vec<IdDef>,
        vparams: Vec<ParamDef>,
        bparams: Vec<BlockParamDef>,
        ret: Option<TypeTree>,
        effects: Vec<IdRef>,
        body: Stmts,
    },
    /// A block alias, `def f = expr`
    DefBlock {
        id: NodeId,
        span: Span,
        binder: IdDef,
        rhs: Term,
    },
    Data {
        id: NodeId,
        span: Span,
        binder: IdDef,
        tparams: Vec<IdDef>,
        ctors: Vec<CtorDef>,
    },
    Record {
        id: NodeId,
        span: Span,
        binder: IdDef,
        tparams: Vec<IdDef>,
        fields: Vec<FieldDef>,
    },
    Effect {
        id: NodeId,
        span: Span,
        binder: IdDef,
        tparams: Vec<IdDef>,
        ops: Vec<OperationDef>,
    },
    Interface {
        id: NodeId,
        span: Span,
        binder: IdDef,
        tparams: Vec<IdDef>,
        ops: Vec<OperationDef>,
    },
    TypeAlias {
        id: NodeId,
        span: Span,
        binder: IdDef,
        tparams: Vec<IdDef>,
        body: TypeTree,
    },
    EffectAlias {
        id: NodeId,
        span: Span,
        binder: IdDef,
        effects: Vec<IdRef>,
    },
    ExternDef {
        id: NodeId,
        span: Span,
        binder: IdDef,
        /// Declared capture, deciding pure vs direct-style lowering
        capture: CaptureTree,
        tparams: Vec<IdDef>,
        vparams: Vec<ParamDef>,
        bparams: Vec<BlockParamDef>,
        ret: Option<TypeTree>,
        /// Target-language body, spliced by the backend
        body: String,
    },
    ExternInclude {
        id: NodeId,
        span: Span,
        path: String,
    },
}

impl Definition {
    pub fn node_id(&self) -> NodeId {
        match self {
            Definition::Val { id, .. }
            | Definition::Var { id, .. }
            | Definition::Fun { id, .. }
            | Definition::DefBlock { id, .. }
            | Definition::Data { id, .. }
            | Definition::Record { id, .. }
            | Definition::Effect { id, .. }
            | Definition::Interface { id, .. }
            | Definition::TypeAlias { id, .. }
            | Definition::EffectAlias { id, .. }
            | Definition::ExternDef { id, .. }
            | Definition::ExternInclude { id, .. } => *id,
        }
    }

    pub fn binder(&self) -> Option<&IdDef> {
        match self {
            Definition::Val { binder, .. }
            | Definition::Var { binder, .. }
            | Definition::Fun { binder, .. }
            | Definition::DefBlock { binder, .. }
            | Definition::Data { binder, .. }
            | Definition::Record { binder, .. }
            | Definition::Effect { binder, .. }
            | Definition::Interface { binder, .. }
            | Definition::TypeAlias { binder, .. }
            | Definition::EffectAlias { binder, .. }
            | Definition::ExternDef { binder, .. } => Some(binder),
            Definition::ExternInclude { .. } => None,
        }
    }
}

/// A constructor of a data declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtorDef {
    pub binder: IdDef,
    pub fields: Vec<TypeTree>,
}

/// A field of a record declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub binder: IdDef,
    pub tpe: TypeTree,
}

/// An effect or interface operation signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDef {
    pub binder: IdDef,
    pub tparams: Vec<IdDef>,
    pub vparams: Vec<ParamDef>,
    pub ret: Option<TypeTree>,
}

/// A whole module of source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleTree {
    pub id: NodeId,
    pub span: Span,
    pub name: Name,
    pub imports: Vec<Name>,
    pub defs: Vec<Definition>,
}

impl ModuleTree {
    pub fn new(name: impl Into<Name>, defs: Vec<Definition>) -> Self {
        ModuleTree {
            id: NodeId::fresh(),
            span: Span::synthetic(),
            name: name.into(),
            imports: Vec::new(),
            defs,
        }
    }
}

impl HasSpan for Term {
    fn span(&self) -> Span {
        self.span
    }
}

impl HasSpan for Pattern {
    fn span(&self) -> Span {
        self.span
    }
}

impl HasSpan for IdDef {
    fn span(&self) -> Span {
        self.span
    }
}

impl HasSpan for IdRef {
    fn span(&self) -> Span {
        self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_ids_are_unique() {
        let a = Term::int(0);
        let b = Term::int(0);
        // Structurally equal apart from identity
        assert_eq!(a.kind, b.kind);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_definition_accessors() {
        let def = Definition::Val {
            id: NodeId::fresh(),
            span: Span::synthetic(),
            binder: IdDef::new("x"),
            binding: Term::int(1),
        };
        assert_eq!(def.binder().unwrap().name, Name::from("x"));
    }

    #[test]
    fn test_tree_roundtrips_through_json() {
        let module = ModuleTree::new(
            "demo",
            vec![Definition::Val {
                id: NodeId::fresh(),
                span: Span::synthetic(),
                binder: IdDef::new("x"),
                binding: Term::int(42),
            }],
        );
        let json = serde_json::to_string(&module).unwrap();
        let back: ModuleTree = serde_json::from_str(&json).unwrap();
        assert_eq!(module, back);
    }
}
