//! Lowering from the typed surface tree into core
//!
//! The transformer reads the committed annotations (types, captures,
//! resolved symbols) and produces core in one pass. Expression lowering is
//! in ANF discipline: sub-computations are bound through the binding
//! buffer and statement boundaries reify. Capture information decides
//! whether calls stay direct-style (`PureApp`, `DirectApp`, `Run`) or must
//! be sequenced as suspendable applications.

use crate::binder::BindingBuffer;
use crate::ir::{
    Arg, Block, BlockLit, Constructor, Declaration, Expr, Extern, Implementation, ModuleDecl,
    OpImpl, Param, Pure, Stmt, Toplevel,
};
use crate::matching::{self, Clause, MatchPattern};
use mica_annotations::{anns, AnnotationStore, AnnotationsDb};
use mica_syntax::tree as surface;
use mica_syntax::{
    Callee, Definition, HandlerTree, IdDef, IdRef, ModuleTree, NodeId, Pattern, PatternKind, Span,
    Stmts, Term, TermKind,
};
use mica_types::{
    BlockSymbol, Builtins, CaptureSet, SymbolId, Symbols, TypeSymbol, ValueType,
};
use thiserror::Error;
use tracing::debug;

/// Fatal lowering errors: the surface program is wrong in a way the typer
/// does not reject
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("the top-level binding '{name}' is effectful; only pure or IO bindings may appear at the top level")]
    EffectfulToplevel { name: String, span: Span },

    #[error("mutable variables cannot be declared at the top level")]
    MutableToplevel { span: Span },

    #[error("constructors cannot take block arguments")]
    ConstructorBlockArguments { span: Span },

    #[error("the extern function '{name}' is marked pure and cannot take block arguments")]
    PureExternBlockArguments { name: String, span: Span },

    #[error("a block definition requires a block on the right-hand side")]
    BlockRequired { span: Span },

    #[error("declarations are not supported in statement position")]
    LocalDeclaration { span: Span },
}

/// Non-fatal findings surfaced to the driver's message buffer
#[derive(Debug, Clone, PartialEq)]
pub struct TransformWarning {
    pub span: Span,
    pub message: String,
}

#[derive(Debug)]
pub struct TransformResult {
    pub module: ModuleDecl,
    pub warnings: Vec<TransformWarning>,
}

/// Lower a typed module into core
pub fn transform(
    tree: &ModuleTree,
    db: &AnnotationsDb,
    symbols: &mut Symbols,
    builtins: &Builtins,
) -> Result<TransformResult, TransformError> {
    debug!(module = %tree.name, "lowering module to core");
    let mut t = Transformer { db, symbols, builtins, buffer: BindingBuffer::new(), warnings: Vec::new() };
    let module = t.transform_module(tree)?;
    Ok(TransformResult { module, warnings: t.warnings })
}

struct Transformer<'a> {
    db: &'a AnnotationsDb,
    symbols: &'a mut Symbols,
    builtins: &'a Builtins,
    buffer: BindingBuffer,
    warnings: Vec<TransformWarning>,
}

impl<'a> Transformer<'a> {
    // -- annotation access --------------------------------------------------

    fn symbol_of_def(&self, id: &IdDef) -> SymbolId {
        *self.db.require(anns::SYMBOL, id.id)
    }

    fn symbol_of_ref(&self, id: &IdRef) -> SymbolId {
        *self.db.require(anns::SYMBOL, id.id)
    }

    fn capture_of(&self, node: NodeId) -> &CaptureSet {
        self.db.require(anns::INFERRED_CAPTURE, node)
    }

    fn is_pure(&self, t: &Term) -> bool {
        self.capture_of(t.id).is_pure()
    }

    fn pure_or_io(&self, t: &Term) -> bool {
        self.capture_of(t.id).pure_or_io()
    }

    fn pure_or_io_symbol(&self, sym: SymbolId) -> bool {
        self.db.get(anns::CAPTURE, sym).map(CaptureSet::pure_or_io).unwrap_or(false)
    }

    fn symbol_capture(&self, sym: SymbolId) -> CaptureSet {
        self.db.get(anns::CAPTURE, sym).cloned().unwrap_or_default()
    }

    fn resolved_type(&self, t: &surface::TypeTree) -> ValueType {
        self.db.require(anns::RESOLVED_TYPE, t.id).clone()
    }

    // -- binding buffer -----------------------------------------------------

    /// Run `f` against a fresh buffer and reify its bindings around the
    /// statement it produces, restoring the outer buffer afterwards.
    fn with_bindings(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<Stmt, TransformError>,
    ) -> Result<Stmt, TransformError> {
        let outer = std::mem::take(&mut self.buffer);
        let result = f(self);
        let inner = std::mem::replace(&mut self.buffer, outer);
        result.map(|stmt| inner.reify(stmt))
    }

    /// Like `with_bindings` for non-statement results, handing the pending
    /// bindings back to the caller
    fn scoped<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, TransformError>,
    ) -> Result<(R, BindingBuffer), TransformError> {
        let outer = std::mem::take(&mut self.buffer);
        let result = f(self);
        let inner = std::mem::replace(&mut self.buffer, outer);
        result.map(|r| (r, inner))
    }

    /// Sequence a suspendable statement and refer to its result
    fn bind(&mut self, stmt: Stmt) -> Pure {
        let tmp = self.symbols.fresh_value("tmp");
        self.buffer.push_val(tmp, stmt);
        Pure::Var(tmp)
    }

    /// Name a non-suspending expression and refer to its result
    fn bind_expr(&mut self, expr: Expr) -> Pure {
        let tmp = self.symbols.fresh_value("tmp");
        self.buffer.push_let(tmp, expr);
        Pure::Var(tmp)
    }

    // -- modules ------------------------------------------------------------

    fn transform_module(&mut self, tree: &ModuleTree) -> Result<ModuleDecl, TransformError> {
        let mut declarations = Vec::new();
        let mut externs = Vec::new();
        let mut definitions = Vec::new();
        let mut exports = Vec::new();

        for def in &tree.defs {
            match def {
                Definition::Data { binder, ctors, .. } => {
                    let id = self.symbol_of_def(binder);
                    let constructors = ctors
                        .iter()
                        .map(|c| Constructor {
                            id: self.symbol_of_def(&c.binder),
                            arity: c.fields.len(),
                        })
                        .collect();
                    declarations.push(Declaration::Data { id, constructors });
                }
                Definition::Record { binder, fields, .. } => {
                    let id = self.symbol_of_def(binder);
                    let (constructor, field_syms) = match self.symbols.as_type(id) {
                        Some(TypeSymbol::Record { constructor, fields }) => {
                            (*constructor, fields.clone())
                        }
                        _ => panic!(
                            "internal compiler error: record symbol expected for {}",
                            binder.name
                        ),
                    };
                    debug_assert_eq!(field_syms.len(), fields.len());
                    declarations.push(Declaration::Record { id, constructor, fields: field_syms });
                }
                Definition::Effect { binder, .. } | Definition::Interface { binder, .. } => {
                    let id = self.symbol_of_def(binder);
                    let operations = self.symbols.operations_of(id).to_vec();
                    declarations.push(Declaration::Interface { id, operations });
                }
                Definition::TypeAlias { .. } | Definition::EffectAlias { .. } => {
                    // Aliases are fully expanded during typing; nothing
                    // survives into core
                }
                Definition::ExternDef { binder, capture, vparams, bparams, body, .. } => {
                    let id = self.symbol_of_def(binder);
                    let mut params: Vec<Param> = vparams
                        .iter()
                        .map(|p| Param::Value(self.symbol_of_def(&p.binder)))
                        .collect();
                    params.extend(
                        bparams.iter().map(|p| Param::Block(self.symbol_of_def(&p.binder))),
                    );
                    let capture =
                        self.db.get(anns::RESOLVED_CAPTURE, capture.id).cloned().unwrap_or_default();
                    externs.push(Extern::Def { id, params, capture, body: body.clone() });
                }
                Definition::ExternInclude { path, .. } => {
                    externs.push(Extern::Include { path: path.clone() });
                }
                Definition::Fun { binder, tparams, vparams, bparams, body, .. } => {
                    let id = self.symbol_of_def(binder);
                    let block = self.function_literal(tparams, vparams, bparams, body)?;
                    definitions.push(Toplevel::Def { id, block });
                    exports.push(id);
                }
                Definition::DefBlock { binder, rhs, span, .. } => {
                    let id = self.symbol_of_def(binder);
                    let (block, pending) = self.scoped(|me| me.transform_as_block(rhs))?;
                    if !pending.is_empty() {
                        return Err(TransformError::BlockRequired { span: *span });
                    }
                    definitions.push(Toplevel::Def { id, block });
                    exports.push(id);
                }
                Definition::Val { binder, binding, span, .. } => {
                    let id = self.symbol_of_def(binder);
                    if !self.pure_or_io(binding) {
                        return Err(TransformError::EffectfulToplevel {
                            name: binder.name.qualified(),
                            span: *span,
                        });
                    }
                    let stmt = self.statement(binding)?;
                    definitions.push(Toplevel::Val { id, binding: Box::new(stmt) });
                    exports.push(id);
                }
                Definition::Var { span, .. } => {
                    return Err(TransformError::MutableToplevel { span: *span });
                }
            }
        }

        Ok(ModuleDecl {
            name: tree.name.clone(),
            declarations,
            externs,
            definitions,
            exports,
        })
    }

    fn function_literal(
        &mut self,
        tparams: &[IdDef],
        vparams: &[surface::ParamDef],
        bparams: &[surface::BlockParamDef],
        body: &Stmts,
    ) -> Result<Block, TransformError> {
        let tparams = tparams.iter().map(|p| self.symbol_of_def(p)).collect();
        let mut params: Vec<Param> =
            vparams.iter().map(|p| Param::Value(self.symbol_of_def(&p.binder))).collect();
        params.extend(bparams.iter().map(|p| Param::Block(self.symbol_of_def(&p.binder))));
        let body = self.transform_stmts(body)?;
        Ok(Block::Lit(BlockLit { tparams, params, body: Box::new(body) }))
    }

    // -- statements ---------------------------------------------------------

    fn transform_stmts(&mut self, stmts: &Stmts) -> Result<Stmt, TransformError> {
        self.transform_stmt_list(&stmts.stmts)
    }

    fn transform_stmt_list(
        &mut self,
        stmts: &[surface::Stmt],
    ) -> Result<Stmt, TransformError> {
        use surface::Stmt as S;
        match stmts {
            [] => Ok(Stmt::ret_unit()),
            [S::Expr(t)] | [S::Return(t)] => self.statement(t),
            // Anything after an early return is unreachable and dropped
            [S::Return(t), ..] => self.statement(t),
            [S::Expr(t), rest @ ..] => {
                let binding = self.statement(t)?;
                let body = self.transform_stmt_list(rest)?;
                let wild = self.symbols.fresh_wildcard();
                Ok(Stmt::Val { id: wild, binding: Box::new(binding), body: Box::new(body) })
            }
            [S::Def(d), rest @ ..] => self.transform_definition(d, rest),
        }
    }

    /// A statement boundary: lower a term and reify pending bindings
    fn statement(&mut self, t: &Term) -> Result<Stmt, TransformError> {
        self.with_bindings(|me| Ok(Stmt::Return(me.transform_as_pure(t)?)))
    }

    fn transform_definition(
        &mut self,
        def: &Definition,
        rest: &[surface::Stmt],
    ) -> Result<Stmt, TransformError> {
        match def {
            Definition::Val { binder, binding, .. } => {
                let id = self.symbol_of_def(binder);
                let stmt = self.statement(binding)?;
                let body = self.transform_stmt_list(rest)?;
                if self.pure_or_io(binding) {
                    Ok(Stmt::Let {
                        id,
                        expr: Expr::Run(Box::new(stmt)),
                        body: Box::new(body),
                    })
                } else {
                    Ok(Stmt::Val { id, binding: Box::new(stmt), body: Box::new(body) })
                }
            }
            Definition::Var { binder, region, init, .. } => {
                let id = self.symbol_of_def(binder);
                let region = region.as_ref().map(|r| self.symbol_of_ref(r));
                self.with_bindings(|me| {
                    let init = me.transform_as_pure(init)?;
                    let body = me.transform_stmt_list(rest)?;
                    Ok(Stmt::State { id, init, region, body: Box::new(body) })
                })
            }
            Definition::Fun { binder, tparams, vparams, bparams, body, .. } => {
                let id = self.symbol_of_def(binder);
                let block = self.function_literal(tparams, vparams, bparams, body)?;
                let rest = self.transform_stmt_list(rest)?;
                Ok(Stmt::Def { id, block, body: Box::new(rest) })
            }
            Definition::DefBlock { binder, rhs, .. } => {
                let id = self.symbol_of_def(binder);
                let (block, pending) = self.scoped(|me| me.transform_as_block(rhs))?;
                let rest = self.transform_stmt_list(rest)?;
                Ok(pending.reify(Stmt::Def { id, block, body: Box::new(rest) }))
            }
            other => Err(TransformError::LocalDeclaration {
                span: other.binder().map(|b| b.span).unwrap_or_else(Span::synthetic),
            }),
        }
    }

    // -- expressions --------------------------------------------------------

    fn transform_as_pure(&mut self, t: &Term) -> Result<Pure, TransformError> {
        match &t.kind {
            TermKind::Literal(lit) => Ok(Pure::Literal(lit.clone())),

            TermKind::Var(id) => {
                let sym = self.symbol_of_ref(id);
                let is_mutable = matches!(
                    self.term_kind(sym),
                    Some(mica_types::TermSymbol::Value(
                        mica_types::ValueSymbol::VarBinder { .. }
                    ))
                );
                if is_mutable {
                    // Reading a mutable variable goes through the cell
                    let expr = Expr::DirectApp {
                        callee: Block::Member {
                            receiver: Box::new(Block::Var(sym)),
                            selector: self.builtins.cell_get,
                        },
                        targs: vec![],
                        args: vec![],
                    };
                    return Ok(self.bind_expr(expr));
                }
                if self.symbols.is_value(sym) {
                    return Ok(Pure::Var(sym));
                }
                // A block symbol in expression position is boxed
                Ok(Pure::Box(Box::new(Block::Var(sym))))
            }

            TermKind::Call { callee, targs, vargs, bargs } => {
                self.transform_call(t, callee, targs, vargs, bargs)
            }

            TermKind::If { cond, thn, els } => {
                let cond = self.transform_as_pure(cond)?;
                let thn = self.transform_stmts(thn)?;
                let els = self.transform_stmts(els)?;
                Ok(self.bind(Stmt::If { cond, thn: Box::new(thn), els: Box::new(els) }))
            }

            TermKind::While { cond, body } => self.transform_while(cond, body),

            TermKind::Match { scrutinee, clauses } => {
                self.transform_match(scrutinee, clauses)
            }

            TermKind::TryHandle { body, handlers } => {
                self.transform_try(body, handlers)
            }

            TermKind::Region { binder, body } => {
                let cap = self.symbol_of_def(binder);
                let prog = self.transform_stmts(body)?;
                let region = Stmt::Region {
                    body: Block::Lit(BlockLit::new(vec![Param::Block(cap)], prog)),
                };
                Ok(self.bind(region))
            }

            TermKind::Do { op, .. } => panic!(
                "internal compiler error: unresolved effect call to '{}' reached lowering; \
                 capability passing must have replaced it",
                op.name
            ),

            TermKind::Assign { target, value } => {
                let sym = self.symbol_of_ref(target);
                let value = self.transform_as_pure(value)?;
                let expr = Expr::DirectApp {
                    callee: Block::Member {
                        receiver: Box::new(Block::Var(sym)),
                        selector: self.builtins.cell_put,
                    },
                    targs: vec![],
                    args: vec![Arg::Value(value)],
                };
                Ok(self.bind_expr(expr))
            }

            TermKind::BlockLiteral { .. } => {
                let block = self.transform_as_block(t)?;
                Ok(Pure::Box(Box::new(block)))
            }

            TermKind::Box { body } => {
                let block = self.transform_as_block(body)?;
                Ok(Pure::Box(Box::new(block)))
            }

            // Unboxing and immediately reboxing cancels out
            TermKind::Unbox { body } => self.transform_as_pure(body),

            TermKind::Hole => Ok(self.bind(Stmt::Hole)),
        }
    }

    fn term_kind(&self, sym: SymbolId) -> Option<&mica_types::TermSymbol> {
        match self.symbols.kind(sym) {
            mica_types::SymbolKind::Term(t) => Some(t),
            _ => None,
        }
    }

    fn transform_call(
        &mut self,
        whole: &Term,
        callee: &Callee,
        targs: &[surface::TypeTree],
        vargs: &[Term],
        bargs: &[Term],
    ) -> Result<Pure, TransformError> {
        let targs: Vec<ValueType> = targs.iter().map(|t| self.resolved_type(t)).collect();
        let bargs_direct = bargs.iter().all(|b| self.pure_or_io(b));

        match callee {
            Callee::Id(id) => {
                let sym = self.symbol_of_ref(id);
                match self.symbols.as_block(sym).cloned() {
                    Some(BlockSymbol::ExternFunction) => {
                        let capture = self.symbol_capture(sym);
                        if capture.is_pure() {
                            if !bargs.is_empty() {
                                return Err(TransformError::PureExternBlockArguments {
                                    name: id.name.qualified(),
                                    span: whole.span,
                                });
                            }
                            let args = self.pure_args(vargs)?;
                            Ok(Pure::PureApp { callee: Box::new(Block::Var(sym)), targs, args })
                        } else {
                            // Pure-or-IO externs run direct style; anything
                            // beyond that suspends like an ordinary call
                            let args = self.mixed_args(vargs, bargs)?;
                            if capture.pure_or_io() {
                                Ok(self.bind_expr(Expr::DirectApp {
                                    callee: Block::Var(sym),
                                    targs,
                                    args,
                                }))
                            } else {
                                Ok(self.bind(Stmt::App { callee: Block::Var(sym), targs, args }))
                            }
                        }
                    }
                    Some(BlockSymbol::Constructor { .. }) => {
                        if !bargs.is_empty() {
                            return Err(TransformError::ConstructorBlockArguments {
                                span: whole.span,
                            });
                        }
                        let args = self.pure_args(vargs)?;
                        Ok(Pure::PureApp { callee: Box::new(Block::Var(sym)), targs, args })
                    }
                    Some(_) => {
                        // An ordinary block: run it without suspending when
                        // neither it nor its block arguments can capture the
                        // continuation
                        let args = self.mixed_args(vargs, bargs)?;
                        let app = Stmt::App { callee: Block::Var(sym), targs, args };
                        if self.pure_or_io_symbol(sym) && bargs_direct {
                            Ok(self.bind_expr(Expr::Run(Box::new(app))))
                        } else {
                            Ok(self.bind(app))
                        }
                    }
                    None => {
                        // A value symbol in call position: unbox it first
                        let args = self.mixed_args(vargs, bargs)?;
                        let app = Stmt::App {
                            callee: Block::Unbox(Box::new(Pure::Var(sym))),
                            targs,
                            args,
                        };
                        Ok(self.bind(app))
                    }
                }
            }

            Callee::Method { receiver, method } => {
                let msym = self.symbol_of_ref(method);
                // Field selection on records is a pure projection
                if matches!(self.symbols.as_block(msym), Some(BlockSymbol::Field { .. })) {
                    let receiver = self.transform_as_pure(receiver)?;
                    return Ok(Pure::Select { receiver: Box::new(receiver), field: msym });
                }
                let receiver = self.transform_as_block(receiver)?;
                let member = Block::Member { receiver: Box::new(receiver), selector: msym };
                let args = self.mixed_args(vargs, bargs)?;
                if msym == self.builtins.cell_get || msym == self.builtins.cell_put {
                    Ok(self.bind_expr(Expr::DirectApp { callee: member, targs, args }))
                } else {
                    Ok(self.bind(Stmt::App { callee: member, targs, args }))
                }
            }

            Callee::Expr(expr) => {
                let args = self.mixed_args(vargs, bargs)?;
                let block = self.transform_as_block(expr)?;
                let app = Stmt::App { callee: block, targs, args };
                // Calling through a box whose capture is pure-or-IO stays
                // direct style, provided the block arguments are too
                if self.pure_or_io(expr) && bargs_direct {
                    Ok(self.bind_expr(Expr::Run(Box::new(app))))
                } else {
                    Ok(self.bind(app))
                }
            }
        }
    }

    fn pure_args(&mut self, vargs: &[Term]) -> Result<Vec<Pure>, TransformError> {
        vargs.iter().map(|a| self.transform_as_pure(a)).collect()
    }

    fn mixed_args(&mut self, vargs: &[Term], bargs: &[Term]) -> Result<Vec<Arg>, TransformError> {
        let mut args = Vec::with_capacity(vargs.len() + bargs.len());
        for a in vargs {
            args.push(Arg::Value(self.transform_as_pure(a)?));
        }
        for b in bargs {
            args.push(Arg::Block(self.transform_as_block(b)?));
        }
        Ok(args)
    }

    fn transform_while(&mut self, cond: &Term, body: &Stmts) -> Result<Pure, TransformError> {
        if self.capture_of(cond.id).is_pure() {
            self.warnings.push(TransformWarning {
                span: cond.span,
                message: "Condition to while loop is pure, which might not be intended".into(),
            });
        }

        let loop_sym = self.symbols.fresh_call_target("loop");
        let lit = self.with_bindings(|me| {
            let cond = me.transform_as_pure(cond)?;
            let body_stmt = me.transform_stmts(body)?;
            let wild = me.symbols.fresh_wildcard();
            let again = Stmt::App { callee: Block::Var(loop_sym), targs: vec![], args: vec![] };
            Ok(Stmt::If {
                cond,
                thn: Box::new(Stmt::Val {
                    id: wild,
                    binding: Box::new(body_stmt),
                    body: Box::new(again),
                }),
                els: Box::new(Stmt::ret_unit()),
            })
        })?;

        self.buffer.push_def(loop_sym, Block::Lit(BlockLit::thunk(lit)));
        Ok(self.bind(Stmt::App { callee: Block::Var(loop_sym), targs: vec![], args: vec![] }))
    }

    fn transform_match(
        &mut self,
        scrutinee: &Term,
        clauses: &[surface::MatchClause],
    ) -> Result<Pure, TransformError> {
        let scrutinee = self.transform_as_pure(scrutinee)?;
        let scrutinee_var = match scrutinee {
            Pure::Var(v) => v,
            other => {
                let tmp = self.symbols.fresh_value("sc");
                self.buffer.push_let(tmp, Expr::Pure(other));
                tmp
            }
        };

        let mut matrix = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let binders = pattern_binders(self.db, &clause.pattern);
            let body = self.with_bindings(|me| me.transform_stmts(&clause.body))?;
            let label = self.symbols.fresh_call_target("clause");
            self.buffer.push_def(label, Block::Lit(BlockLit::values(binders.clone(), body)));
            let pattern = self.lower_pattern(&clause.pattern);
            matrix.push(Clause::new(scrutinee_var, pattern, label, binders));
        }

        let compiled = matching::compile(matrix, self.symbols);
        Ok(self.bind(compiled))
    }

    fn lower_pattern(&self, pattern: &Pattern) -> MatchPattern {
        match &pattern.kind {
            PatternKind::Any => MatchPattern::Any,
            PatternKind::Ident(binder) => MatchPattern::Ident(self.symbol_of_def(binder)),
            PatternKind::Tag { ctor, patterns } => MatchPattern::Tag {
                ctor: self.symbol_of_ref(ctor),
                fields: patterns.iter().map(|p| self.lower_pattern(p)).collect(),
            },
            PatternKind::Literal(_) => panic!(
                "internal compiler error: literal pattern survived typing"
            ),
        }
    }

    fn transform_try(
        &mut self,
        body: &Stmts,
        handlers: &[HandlerTree],
    ) -> Result<Pure, TransformError> {
        let mut caps = Vec::with_capacity(handlers.len());
        let mut impls = Vec::with_capacity(handlers.len());

        for handler in handlers {
            let effect = self.symbol_of_ref(&handler.effect);
            let cap = match &handler.capability {
                Some(binder) => self.symbol_of_def(binder),
                // The namer records the implicit capability on the handler
                None => *self.db.require(anns::SYMBOL, handler.id),
            };
            caps.push(Param::Block(cap));

            // Clauses are emitted in the declaration order of the handled
            // effect's operations, not in surface order
            let mut operations = Vec::new();
            for op in self.symbols.operations_of(effect).to_vec() {
                let clause = handler
                    .clauses
                    .iter()
                    .find(|c| self.symbol_of_ref(&c.op) == op)
                    .unwrap_or_else(|| {
                        panic!(
                            "internal compiler error: handler for {} lacks operation {}",
                            self.symbols.name(effect),
                            self.symbols.name(op)
                        )
                    });
                let params: Vec<Param> = clause
                    .vparams
                    .iter()
                    .map(|p| Param::Value(self.symbol_of_def(&p.binder)))
                    .collect();
                let resume = Some(self.symbol_of_def(&clause.resume));
                let body = self.with_bindings(|me| me.transform_stmts(&clause.body))?;
                operations.push(OpImpl { op, params, resume, body: Box::new(body) });
            }
            impls.push(Implementation { interface: effect, operations });
        }

        let prog = self.transform_stmts(body)?;
        let stmt = Stmt::Try { body: Block::Lit(BlockLit::new(caps, prog)), handlers: impls };
        Ok(self.bind(stmt))
    }

    // -- blocks -------------------------------------------------------------

    fn transform_as_block(&mut self, t: &Term) -> Result<Block, TransformError> {
        match &t.kind {
            TermKind::Var(id) => {
                let sym = self.symbol_of_ref(id);
                if self.symbols.is_block(sym) {
                    Ok(Block::Var(sym))
                } else {
                    Ok(Block::Unbox(Box::new(Pure::Var(sym))))
                }
            }
            TermKind::BlockLiteral { vparams, bparams, body } => {
                let mut params: Vec<Param> =
                    vparams.iter().map(|p| Param::Value(self.symbol_of_def(&p.binder))).collect();
                params.extend(
                    bparams.iter().map(|p| Param::Block(self.symbol_of_def(&p.binder))),
                );
                let body = self.transform_stmts(body)?;
                Ok(Block::Lit(BlockLit::new(params, body)))
            }
            TermKind::Unbox { body } => {
                let p = self.transform_as_pure(body)?;
                Ok(Block::Unbox(Box::new(p)))
            }
            // Anything else evaluates to a boxed value and reopens it
            _ => {
                let p = self.transform_as_pure(t)?;
                Ok(Block::Unbox(Box::new(p)))
            }
        }
    }
}

fn pattern_binders(db: &AnnotationsDb, pattern: &Pattern) -> Vec<SymbolId> {
    fn walk(db: &AnnotationsDb, pattern: &Pattern, out: &mut Vec<SymbolId>) {
        match &pattern.kind {
            PatternKind::Ident(binder) => {
                out.push(*db.require(anns::SYMBOL, binder.id));
            }
            PatternKind::Tag { patterns, .. } => {
                for p in patterns {
                    walk(db, p, out);
                }
            }
            PatternKind::Any | PatternKind::Literal(_) => {}
        }
    }
    let mut out = Vec::new();
    walk(db, pattern, &mut out);
    out
}
