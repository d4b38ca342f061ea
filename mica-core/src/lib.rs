//! Mica core: the typed intermediate representation and the transformer
//!
//! Lowering consumes the committed annotations of a typed surface tree and
//! produces core in a single pass: ANF binding reification through a scoped
//! binding buffer, handler and interface lowering, pattern-match
//! compilation, and purity-driven direct-style optimization.

pub mod binder;
pub mod ir;
pub mod matching;
pub mod transform;

pub use binder::{Binding, BindingBuffer};
pub use ir::{
    Arg, Block, BlockLit, Constructor, Declaration, Expr, Extern, Implementation, ModuleDecl,
    OpImpl, Param, Pure, Stmt, Toplevel,
};
pub use matching::{Clause, MatchPattern};
pub use transform::{transform, TransformError, TransformResult, TransformWarning};
