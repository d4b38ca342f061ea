//! The core intermediate representation
//!
//! Core is what the transformer produces and the backends consume. It is
//! fully explicit: evaluation order is a chain of `Val`/`Let`/`Def`
//! bindings, pure expressions are separated from side-effecting ones, and
//! every call site records whether it may suspend.

use mica_syntax::{Literal, Name};
use mica_types::{CaptureSet, SymbolId, ValueType};
use serde::{Deserialize, Serialize};

/// Statements: computations that may suspend, allocate, or branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// Sequence a possibly suspending binding: `val x = { binding }; body`
    Val { id: SymbolId, binding: Box<Stmt>, body: Box<Stmt> },
    /// Bind a non-suspending expression: `let x = expr; body`
    Let { id: SymbolId, expr: Expr, body: Box<Stmt> },
    /// Bind a block: `def f = block; body`
    Def { id: SymbolId, block: Block, body: Box<Stmt> },
    /// Finish with a pure value
    Return(Pure),
    /// Call a block in tail position
    App { callee: Block, targs: Vec<ValueType>, args: Vec<Arg> },
    If {
        cond: Pure,
        thn: Box<Stmt>,
        els: Box<Stmt>,
    },
    /// Branch on the constructor of a scrutinee. Branches are in the
    /// declaration order of the data type; a missing default means the
    /// match is exhaustive.
    Match {
        scrutinee: Pure,
        branches: Vec<(SymbolId, BlockLit)>,
        default: Option<Box<Stmt>>,
    },
    /// Install handlers around a body that receives their capabilities
    Try { body: Block, handlers: Vec<Implementation> },
    /// Open a region for scoped cell allocation
    Region { body: Block },
    /// Allocate a mutable cell: `var x in r = init; body`
    State {
        id: SymbolId,
        init: Pure,
        region: Option<SymbolId>,
        body: Box<Stmt>,
    },
    /// An unreachable or not-yet-written program point
    Hole,
}

impl Stmt {
    pub fn ret(p: Pure) -> Stmt {
        Stmt::Return(p)
    }

    pub fn ret_unit() -> Stmt {
        Stmt::Return(Pure::Literal(Literal::Unit))
    }

    pub fn ret_var(id: SymbolId) -> Stmt {
        Stmt::Return(Pure::Var(id))
    }
}

/// Expressions that run without suspending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Pure(Pure),
    /// A call that is pure-or-IO and therefore need not suspend
    DirectApp { callee: Block, targs: Vec<ValueType>, args: Vec<Arg> },
    /// Embed a pure-or-IO sub-computation as an expression
    Run(Box<Stmt>),
}

/// Pure expressions: no observable effects at all
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pure {
    Var(SymbolId),
    Literal(Literal),
    /// Application of a pure function (an extern marked pure, or a
    /// constructor)
    PureApp { callee: Box<Block>, targs: Vec<ValueType>, args: Vec<Pure> },
    /// Field selection on a record value
    Select { receiver: Box<Pure>, field: SymbolId },
    /// A block closed into a first-class value
    Box(Box<Block>),
}

impl Pure {
    pub fn unit() -> Pure {
        Pure::Literal(Literal::Unit)
    }

    pub fn int(v: i64) -> Pure {
        Pure::Literal(Literal::Int(v))
    }
}

/// Blocks: callable computations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Block {
    Var(SymbolId),
    Lit(BlockLit),
    /// Select an operation or field accessor on a receiver block
    Member { receiver: Box<Block>, selector: SymbolId },
    /// Reopen a boxed value as a block
    Unbox(Box<Pure>),
    /// An anonymous handler implementation
    New(Implementation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockLit {
    pub tparams: Vec<SymbolId>,
    pub params: Vec<Param>,
    pub body: Box<Stmt>,
}

impl BlockLit {
    pub fn new(params: Vec<Param>, body: Stmt) -> Self {
        BlockLit { tparams: Vec::new(), params, body: Box::new(body) }
    }

    /// A literal over value parameters only
    pub fn values(params: Vec<SymbolId>, body: Stmt) -> Self {
        BlockLit::new(params.into_iter().map(Param::Value).collect(), body)
    }

    /// A thunk taking nothing
    pub fn thunk(body: Stmt) -> Self {
        BlockLit::new(Vec::new(), body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Param {
    Value(SymbolId),
    Block(SymbolId),
}

impl Param {
    pub fn id(&self) -> SymbolId {
        match self {
            Param::Value(s) | Param::Block(s) => *s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Value(Pure),
    Block(Block),
}

/// One handler: an interface or effect together with its operation bodies,
/// in the declaration order of the handled type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub interface: SymbolId,
    pub operations: Vec<OpImpl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpImpl {
    pub op: SymbolId,
    pub params: Vec<Param>,
    /// The continuation parameter; absent for operations that never resume
    pub resume: Option<SymbolId>,
    pub body: Box<Stmt>,
}

/// Type-level declarations carried alongside the code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Declaration {
    Data { id: SymbolId, constructors: Vec<Constructor> },
    Record { id: SymbolId, constructor: SymbolId, fields: Vec<SymbolId> },
    Interface { id: SymbolId, operations: Vec<SymbolId> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constructor {
    pub id: SymbolId,
    pub arity: usize,
}

/// Externs: definitions whose bodies live in the target language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Extern {
    Def {
        id: SymbolId,
        params: Vec<Param>,
        capture: CaptureSet,
        body: String,
    },
    Include { path: String },
}

/// Top-level definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Toplevel {
    Def { id: SymbolId, block: Block },
    /// A top-level value; the binding is pure-or-IO by construction
    Val { id: SymbolId, binding: Box<Stmt> },
}

/// A lowered module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDecl {
    pub name: Name,
    pub declarations: Vec<Declaration>,
    pub externs: Vec<Extern>,
    pub definitions: Vec<Toplevel>,
    pub exports: Vec<SymbolId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mica_types::Symbols;

    #[test]
    fn test_core_roundtrips_through_json() {
        let mut syms = Symbols::new();
        let x = syms.fresh_value("x");
        let stmt = Stmt::Let {
            id: x,
            expr: Expr::Pure(Pure::int(1)),
            body: Box::new(Stmt::ret_var(x)),
        };
        let json = serde_json::to_string(&stmt).unwrap();
        let back: Stmt = serde_json::from_str(&json).unwrap();
        assert_eq!(stmt, back);
    }
}
