//! The binding buffer
//!
//! Expression-level lowering appends pending `val`/`let`/`def` bindings
//! here; each statement boundary reifies the buffer around the computed
//! statement. The buffer is a stack of scopes: entering a nested statement
//! saves the outer buffer, installs a fresh one, and restores the outer one
//! afterwards, with exactly one reification per scope.

use crate::ir::{Block, Expr, Pure, Stmt};
use mica_types::SymbolId;

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// A possibly suspending computation to sequence
    Val { id: SymbolId, binding: Stmt },
    /// A non-suspending expression
    Let { id: SymbolId, expr: Expr },
    /// A block introduction
    Def { id: SymbolId, block: Block },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingBuffer {
    bindings: Vec<Binding>,
}

impl BindingBuffer {
    pub fn new() -> Self {
        BindingBuffer::default()
    }

    pub fn push_val(&mut self, id: SymbolId, binding: Stmt) {
        self.bindings.push(Binding::Val { id, binding });
    }

    pub fn push_let(&mut self, id: SymbolId, expr: Expr) {
        self.bindings.push(Binding::Let { id, expr });
    }

    pub fn push_def(&mut self, id: SymbolId, block: Block) {
        self.bindings.push(Binding::Def { id, block });
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Fold the pending bindings around `body`. The first binding pushed
    /// ends up outermost, so insertion order is evaluation order. Wrapping
    /// applies these reductions:
    ///
    /// - `val x = s; return x`         becomes `s`
    /// - `let x = run { s }; return x` becomes `s`
    /// - `let x = p; return x`         becomes `return p` for pure `p`
    pub fn reify(self, body: Stmt) -> Stmt {
        self.bindings.into_iter().rev().fold(body, |acc, binding| match binding {
            Binding::Val { id, binding } => {
                if let Stmt::Return(Pure::Var(v)) = &acc {
                    if *v == id {
                        return binding;
                    }
                }
                Stmt::Val { id, binding: Box::new(binding), body: Box::new(acc) }
            }
            Binding::Let { id, expr } => {
                if let Stmt::Return(Pure::Var(v)) = &acc {
                    if *v == id {
                        return match expr {
                            Expr::Run(stmt) => *stmt,
                            Expr::Pure(p) => Stmt::Return(p),
                            other => Stmt::Let {
                                id,
                                expr: other,
                                body: Box::new(acc),
                            },
                        };
                    }
                }
                Stmt::Let { id, expr, body: Box::new(acc) }
            }
            Binding::Def { id, block } => {
                Stmt::Def { id, block, body: Box::new(acc) }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BlockLit;
    use mica_types::Symbols;

    #[test]
    fn test_reify_on_empty_buffer_is_identity() {
        let body = Stmt::ret_unit();
        assert_eq!(BindingBuffer::new().reify(body.clone()), body);
    }

    #[test]
    fn test_insertion_order_is_evaluation_order() {
        let mut syms = Symbols::new();
        let a = syms.fresh_value("a");
        let b = syms.fresh_value("b");
        let mut buffer = BindingBuffer::new();
        buffer.push_let(a, Expr::Pure(Pure::int(1)));
        buffer.push_let(b, Expr::Pure(Pure::int(2)));

        let out = buffer.reify(Stmt::ret_var(a));
        // `a` is bound outermost, `b` inside it
        match out {
            Stmt::Let { id, body, .. } => {
                assert_eq!(id, a);
                assert!(matches!(*body, Stmt::Let { id, .. } if id == b));
            }
            other => panic!("expected let chain, got {:?}", other),
        }
    }

    #[test]
    fn test_val_return_reduction() {
        let mut syms = Symbols::new();
        let x = syms.fresh_value("x");
        let inner = Stmt::App {
            callee: Block::Lit(BlockLit::thunk(Stmt::ret_unit())),
            targs: vec![],
            args: vec![],
        };
        let mut buffer = BindingBuffer::new();
        buffer.push_val(x, inner.clone());
        assert_eq!(buffer.reify(Stmt::ret_var(x)), inner);
    }

    #[test]
    fn test_let_run_reduction() {
        let mut syms = Symbols::new();
        let x = syms.fresh_value("x");
        let stmt = Stmt::ret_unit();
        let mut buffer = BindingBuffer::new();
        buffer.push_let(x, Expr::Run(Box::new(stmt.clone())));
        assert_eq!(buffer.reify(Stmt::ret_var(x)), stmt);
    }

    #[test]
    fn test_let_pure_reduction() {
        let mut syms = Symbols::new();
        let x = syms.fresh_value("x");
        let mut buffer = BindingBuffer::new();
        buffer.push_let(x, Expr::Pure(Pure::int(3)));
        assert_eq!(buffer.reify(Stmt::ret_var(x)), Stmt::Return(Pure::int(3)));
    }

    #[test]
    fn test_scope_push_pop_restores_outer_buffer() {
        let mut syms = Symbols::new();
        let a = syms.fresh_value("a");
        let b = syms.fresh_value("b");
        let mut buffer = BindingBuffer::new();
        buffer.push_let(a, Expr::Pure(Pure::int(1)));

        // Enter a nested scope the way a statement boundary does
        let outer = std::mem::take(&mut buffer);
        buffer.push_let(b, Expr::Pure(Pure::int(2)));
        let inner = std::mem::replace(&mut buffer, outer);

        // The inner scope took only its own binding; the outer buffer is
        // back in place untouched
        assert_eq!(inner.len(), 1);
        assert_eq!(buffer.len(), 1);
        let reified = buffer.reify(Stmt::ret_var(a));
        assert_eq!(reified, Stmt::Return(Pure::int(1)));
    }

    #[test]
    fn test_no_reduction_for_unrelated_result() {
        let mut syms = Symbols::new();
        let x = syms.fresh_value("x");
        let y = syms.fresh_value("y");
        let mut buffer = BindingBuffer::new();
        buffer.push_let(x, Expr::Pure(Pure::int(3)));
        let out = buffer.reify(Stmt::ret_var(y));
        assert!(matches!(out, Stmt::Let { .. }));
    }
}
